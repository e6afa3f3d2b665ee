use std::num::NonZeroUsize;
use std::sync::Arc;
use url::Url;

use super::{CacheStore, FsCacheStore, MemoryCacheStore};
use crate::Error;

/// Constructs a new instance of a [CacheStore] from an URI.
///
/// The following schemes are supported by the following services:
/// - `memory://` ([MemoryCacheStore]), optionally with `?capacity=N`
/// - `fs://<path>` ([FsCacheStore])
pub async fn from_addr(uri: &str) -> Result<Arc<dyn CacheStore>, Error> {
    let url = Url::parse(uri)
        .map_err(|e| Error::StorageError(format!("unable to parse url: {}", e)))?;

    Ok(if url.scheme() == "memory" {
        // memory doesn't support host or path in the URL.
        if url.has_host() || !url.path().is_empty() {
            return Err(Error::StorageError("invalid url".to_string()));
        }

        match url.query_pairs().find(|(k, _)| k == "capacity") {
            None => Arc::new(MemoryCacheStore::default()),
            Some((_, v)) => {
                let capacity: NonZeroUsize = v
                    .parse()
                    .map_err(|e| Error::StorageError(format!("invalid capacity: {}", e)))?;
                Arc::new(MemoryCacheStore::with_capacity(capacity))
            }
        }
    } else if url.scheme() == "fs" {
        if url.path().is_empty() {
            return Err(Error::StorageError("invalid filesystem path".to_string()));
        }

        Arc::new(
            FsCacheStore::new(url.path().into())
                .await
                .map_err(|e| Error::StorageError(e.to_string()))?,
        )
    } else {
        Err(Error::StorageError(format!(
            "unknown scheme: {}",
            url.scheme()
        )))?
    })
}
