use std::sync::Arc;

use bstr::ByteSlice;
use bytes::Bytes;
use tracing::{instrument, warn};

use coral_store::cachestore::CacheStore;
use coral_store::proto::CachedEntry;
use coral_store::storagerpc::StorageRpc;
use coral_store::{chunk_key, unix_now, Error, Md5Digest, RollingDigest};

use crate::edge_cache;
use crate::object::OCTET_STREAM;

/// Per-object coordinator of a streaming PUT above the large-object
/// threshold.
///
/// Owned by the handler task of a single upload. Chunk `i+1` is only
/// put after chunk `i` settled, and the rolling digest advances only on
/// success, so the etag of a committed upload is the MD5 of the
/// committed chunk bodies in ascending index order.
///
/// A session that stored chunks but never reached [Self::finish] rolls
/// them back from a background task when dropped, covering handler
/// paths that bail out early.
pub struct LargeUploadSession {
    storage: Arc<dyn StorageRpc>,
    cache: Arc<dyn CacheStore>,
    parent_key: Bytes,
    digest: RollingDigest,
    chunks_put: u64,
    errors: Vec<(u64, Error)>,
    finished: bool,
}

impl LargeUploadSession {
    pub fn open(
        storage: Arc<dyn StorageRpc>,
        cache: Arc<dyn CacheStore>,
        parent_key: Bytes,
    ) -> Self {
        Self {
            storage,
            cache,
            parent_key,
            digest: RollingDigest::new(),
            chunks_put: 0,
            errors: Vec::new(),
            finished: false,
        }
    }

    /// Stores chunk `index` and advances the digest. A failure is
    /// recorded in the error ledger and returned; the digest stays
    /// untouched so it keeps describing the committed bytes only.
    #[instrument(
        skip(self, body),
        fields(object.key=%self.parent_key.as_bstr(), chunk.index=index),
        err
    )]
    pub async fn put_chunk(&mut self, index: u64, body: Bytes) -> Result<(), Error> {
        let ck = chunk_key(&self.parent_key, index);

        match self
            .storage
            .put(&ck, body.clone(), body.len() as u64, index)
            .await
        {
            Ok(_) => {
                self.digest.update(&body);
                self.chunks_put = self.chunks_put.max(index);

                let entry = CachedEntry {
                    mtime: unix_now(),
                    etag: self.digest.snapshot().into(),
                    content_type: OCTET_STREAM.to_string(),
                    size: body.len() as u64,
                    body,
                    file_path: String::new(),
                };
                edge_cache::put_quiet(&*self.cache, &ck, entry).await;

                Ok(())
            }
            Err(e) => {
                self.errors.push((index, e.clone()));
                Err(e)
            }
        }
    }

    /// Yields the digest of the assembled object, or the accumulated
    /// chunk failures. Writing the manifest stays with the caller.
    pub fn commit(&mut self) -> Result<Md5Digest, Vec<(u64, Error)>> {
        if self.errors.is_empty() {
            Ok(std::mem::take(&mut self.digest).finalize())
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    /// Deletes chunks `total` down to `1` from cache and storage,
    /// best-effort, and clears the error ledger.
    #[instrument(skip(self), fields(object.key=%self.parent_key.as_bstr(), chunk.total=total))]
    pub async fn rollback(&mut self, total: u64) {
        rollback_chunks(&*self.storage, &*self.cache, &self.parent_key, total).await;
        self.errors.clear();
        self.finished = true;
    }

    /// Marks the upload complete; the drop guard stands down.
    pub fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for LargeUploadSession {
    fn drop(&mut self) {
        if self.finished || self.chunks_put == 0 {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let storage = self.storage.clone();
        let cache = self.cache.clone();
        let parent_key = self.parent_key.clone();
        let total = self.chunks_put;

        handle.spawn(async move {
            warn!(
                object.key=%parent_key.as_bstr(),
                "upload abandoned, rolling back stored chunks"
            );
            rollback_chunks(&*storage, &*cache, &parent_key, total).await;
        });
    }
}

/// Best-effort removal of chunk records in descending index order;
/// individual failures are logged and skipped.
async fn rollback_chunks(
    storage: &dyn StorageRpc,
    cache: &dyn CacheStore,
    parent_key: &[u8],
    total: u64,
) {
    for index in (1..=total).rev() {
        let ck = chunk_key(parent_key, index);
        edge_cache::delete_quiet(cache, &ck).await;
        match storage.delete(&ck).await {
            Ok(()) | Err(Error::NotFound) => {}
            Err(e) => {
                warn!(chunk.key=%ck.as_bstr(), err=%e, "failed to delete chunk during rollback")
            }
        }
    }
}
