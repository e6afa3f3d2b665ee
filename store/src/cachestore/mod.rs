use tonic::async_trait;

use crate::proto::CachedEntry;
use crate::Error;

mod from_addr;
mod fs;
mod memory;

pub use self::from_addr::from_addr;
pub use self::fs::FsCacheStore;
pub use self::memory::MemoryCacheStore;

/// Gateway-local response cache over opaque keys.
///
/// The store enforces no TTL itself; freshness is judged by the edge
/// cache from [CachedEntry::mtime]. A miss is `Ok(None)`, never an
/// error, and callers treat every error as best-effort: it is logged
/// and must not change the outcome of the user request.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up the entry cached under `key`.
    async fn get(&self, key: &[u8]) -> Result<Option<CachedEntry>, Error>;

    /// Cache `entry` under `key`, replacing any previous record.
    async fn put(&self, key: &[u8], entry: CachedEntry) -> Result<(), Error>;

    /// Drop the entry cached under `key`, if any.
    async fn delete(&self, key: &[u8]) -> Result<(), Error>;
}
