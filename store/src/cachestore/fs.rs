use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use data_encoding::HEXLOWER;
use prost::Message;
use tonic::async_trait;
use tracing::instrument;

use super::CacheStore;
use crate::digests::md5;
use crate::proto::CachedEntry;
use crate::Error;

/// Cache store backed by a directory of plain files.
///
/// The body of an entry is written to `data/PREFIX/NAME` and the
/// prost-encoded record (body cleared, `file_path` pointing at the data
/// file) to `meta/PREFIX/NAME`, both named after the hex MD5 of the
/// cache key in a sharding style, e.g. `abcdef` turns into `ab/abcdef`.
/// Readers hand the recorded data path to the response layer, which
/// streams the file instead of copying it through the cache.
#[derive(Clone)]
pub struct FsCacheStore {
    path: PathBuf,
}

impl FsCacheStore {
    pub async fn new(path: PathBuf) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(path.join("data")).await?;
        tokio::fs::create_dir_all(path.join("meta")).await?;

        Ok(Self { path })
    }
}

fn derive_paths(root: &Path, key: &[u8]) -> (PathBuf, PathBuf) {
    let digest = md5(key);
    let prefix = HEXLOWER.encode(&digest.as_slice()[..1]);
    let name = HEXLOWER.encode(digest.as_slice());

    (
        root.join("data").join(&prefix).join(&name),
        root.join("meta").join(&prefix).join(name),
    )
}

#[async_trait]
impl CacheStore for FsCacheStore {
    #[instrument(skip_all, fields(cache.key=%key.as_bstr()))]
    async fn get(&self, key: &[u8]) -> Result<Option<CachedEntry>, Error> {
        let (_, meta_path) = derive_paths(&self.path, key);

        match tokio::fs::read(&meta_path).await {
            Ok(encoded) => {
                let entry = CachedEntry::decode(&encoded[..])
                    .map_err(|e| Error::storage(key, format_args!("corrupt cache record: {}", e)))?;
                Ok(Some(entry))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(key, e)),
        }
    }

    #[instrument(skip_all, fields(cache.key=%key.as_bstr()))]
    async fn put(&self, key: &[u8], entry: CachedEntry) -> Result<(), Error> {
        let (data_path, meta_path) = derive_paths(&self.path, key);
        for path in [&data_path, &meta_path] {
            let parent = path.parent().expect("derived paths have a parent");
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(key, e))?;
        }

        let mut record = entry;
        let body = std::mem::take(&mut record.body);
        record.size = body.len() as u64;
        record.file_path = data_path.to_string_lossy().into_owned();

        tokio::fs::write(&data_path, &body)
            .await
            .map_err(|e| Error::storage(key, e))?;
        tokio::fs::write(&meta_path, record.encode_to_vec())
            .await
            .map_err(|e| Error::storage(key, e))?;
        Ok(())
    }

    #[instrument(skip_all, fields(cache.key=%key.as_bstr()))]
    async fn delete(&self, key: &[u8]) -> Result<(), Error> {
        let (data_path, meta_path) = derive_paths(&self.path, key);

        // the record goes first so a concurrent reader can't observe a
        // dangling file_path
        for path in [meta_path, data_path] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::storage(key, e)),
            }
        }
        Ok(())
    }
}
