use std::num::NonZeroUsize;
use std::sync::Arc;

use bstr::ByteSlice;
use lru::LruCache;
use parking_lot::Mutex;
use tonic::async_trait;
use tracing::instrument;

use super::CacheStore;
use crate::proto::CachedEntry;
use crate::Error;

/// Number of entries kept before eviction, unless configured otherwise.
const DEFAULT_CAPACITY: usize = 1 << 16;

/// Bounded in-memory cache store.
#[derive(Clone)]
pub struct MemoryCacheStore {
    db: Arc<Mutex<LruCache<Vec<u8>, CachedEntry>>>,
}

impl MemoryCacheStore {
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            db: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::with_capacity(NonZeroUsize::new(DEFAULT_CAPACITY).expect("capacity is non-zero"))
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    #[instrument(skip_all, fields(cache.key=%key.as_bstr()))]
    async fn get(&self, key: &[u8]) -> Result<Option<CachedEntry>, Error> {
        Ok(self.db.lock().get(key).cloned())
    }

    #[instrument(skip_all, fields(cache.key=%key.as_bstr()))]
    async fn put(&self, key: &[u8], entry: CachedEntry) -> Result<(), Error> {
        self.db.lock().put(key.to_vec(), entry);
        Ok(())
    }

    #[instrument(skip_all, fields(cache.key=%key.as_bstr()))]
    async fn delete(&self, key: &[u8]) -> Result<(), Error> {
        self.db.lock().pop(key);
        Ok(())
    }
}
