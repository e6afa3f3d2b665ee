use std::collections::HashMap;
use std::sync::Arc;

use bstr::ByteSlice;
use bytes::Bytes;
use parking_lot::RwLock;
use tonic::async_trait;
use tracing::instrument;

use super::{ConditionalGet, StorageRpc};
use crate::digests::{md5, Md5Digest};
use crate::proto::ObjectMeta;
use crate::utils::unix_now;
use crate::Error;

/// In-memory stand-in for the storage cluster, used by tests and the
/// `memory://` address scheme.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    db: Arc<RwLock<HashMap<Vec<u8>, (ObjectMeta, Bytes)>>>,
}

#[async_trait]
impl StorageRpc for MemoryStorage {
    #[instrument(skip_all, err, fields(object.key=%key.as_bstr()))]
    async fn get(&self, key: &[u8]) -> Result<(ObjectMeta, Bytes), Error> {
        let db = self.db.read();
        let (meta, body) = db.get(key).ok_or(Error::NotFound)?;
        Ok((meta.clone(), body.clone()))
    }

    #[instrument(skip_all, err, fields(object.key=%key.as_bstr()))]
    async fn get_with_etag(
        &self,
        key: &[u8],
        etag_hint: &Md5Digest,
    ) -> Result<ConditionalGet, Error> {
        let db = self.db.read();
        let (meta, body) = db.get(key).ok_or(Error::NotFound)?;

        if meta.checksum == etag_hint.as_slice() {
            Ok(ConditionalGet::NotModified)
        } else {
            Ok(ConditionalGet::Modified {
                meta: meta.clone(),
                body: body.clone(),
            })
        }
    }

    #[instrument(skip_all, err, fields(object.key=%key.as_bstr(), range.start=start, range.end=end))]
    async fn get_range(
        &self,
        key: &[u8],
        start: u64,
        end: u64,
    ) -> Result<(ObjectMeta, Bytes), Error> {
        let db = self.db.read();
        let (meta, body) = db.get(key).ok_or(Error::NotFound)?;

        let body = if start as usize >= body.len() {
            Bytes::new()
        } else {
            let end = std::cmp::min(end as usize, body.len() - 1);
            body.slice(start as usize..end + 1)
        };

        Ok((meta.clone(), body))
    }

    #[instrument(skip_all, err, fields(object.key=%key.as_bstr()))]
    async fn head(&self, key: &[u8]) -> Result<ObjectMeta, Error> {
        let db = self.db.read();
        let (meta, _) = db.get(key).ok_or(Error::NotFound)?;
        Ok(meta.clone())
    }

    #[instrument(skip_all, err, fields(object.key=%key.as_bstr(), chunk.index=chunk_index))]
    async fn put(
        &self,
        key: &[u8],
        body: Bytes,
        size: u64,
        chunk_index: u64,
    ) -> Result<Md5Digest, Error> {
        let _ = chunk_index;
        let etag = md5(&body);
        let meta = ObjectMeta {
            checksum: etag.clone().into(),
            timestamp: unix_now(),
            dsize: size,
            cnumber: 0,
            del: 0,
        };

        self.db.write().insert(key.to_vec(), (meta, body));
        Ok(etag)
    }

    #[instrument(skip_all, err, fields(object.key=%key.as_bstr(), chunk.total=total_chunks))]
    async fn put_manifest(
        &self,
        key: &[u8],
        total_size: u64,
        chunk_size: u64,
        total_chunks: u64,
        digest: &Md5Digest,
    ) -> Result<Md5Digest, Error> {
        let _ = chunk_size;
        let meta = ObjectMeta {
            checksum: digest.clone().into(),
            timestamp: unix_now(),
            dsize: total_size,
            cnumber: total_chunks,
            del: 0,
        };

        self.db.write().insert(key.to_vec(), (meta, Bytes::new()));
        Ok(digest.clone())
    }

    #[instrument(skip_all, err, fields(object.key=%key.as_bstr()))]
    async fn delete(&self, key: &[u8]) -> Result<(), Error> {
        self.db
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or(Error::NotFound)
    }
}
