use bytes::Bytes;
use tonic::async_trait;

use crate::digests::Md5Digest;
use crate::proto::ObjectMeta;
use crate::Error;

mod from_addr;
mod grpc;
mod memory;

pub use self::from_addr::from_addr;
pub use self::grpc::GRPCStorageRpc;
pub use self::memory::MemoryStorage;

/// Outcome of a conditional get carrying the caller's cached etag.
#[derive(Debug, PartialEq)]
pub enum ConditionalGet {
    /// The caller's copy is still valid.
    NotModified,
    /// Storage has a newer version.
    Modified { meta: ObjectMeta, body: Bytes },
}

/// The request/response interface of the storage cluster.
///
/// One record per key. A chunked object is a manifest record at the
/// parent key (cnumber = N) plus N child records at the chunk keys
/// `1..=N`; children may themselves be manifests.
#[async_trait]
pub trait StorageRpc: Send + Sync {
    /// Fetch metadata and body of the record at `key`.
    async fn get(&self, key: &[u8]) -> Result<(ObjectMeta, Bytes), Error>;

    /// Like [Self::get], but short-circuits to
    /// [ConditionalGet::NotModified] when the stored checksum still
    /// equals `etag_hint`.
    async fn get_with_etag(
        &self,
        key: &[u8],
        etag_hint: &Md5Digest,
    ) -> Result<ConditionalGet, Error>;

    /// Fetch an inclusive byte range of a leaf record. May return an
    /// empty body when the range lies past the stored data.
    async fn get_range(&self, key: &[u8], start: u64, end: u64)
        -> Result<(ObjectMeta, Bytes), Error>;

    /// Fetch only the metadata of the record at `key`.
    async fn head(&self, key: &[u8]) -> Result<ObjectMeta, Error>;

    /// Store a leaf record and return the etag of the stored bytes.
    /// `chunk_index` is the 1-based position below a parent for chunked
    /// children, 0 for a standalone small object.
    async fn put(
        &self,
        key: &[u8],
        body: Bytes,
        size: u64,
        chunk_index: u64,
    ) -> Result<Md5Digest, Error>;

    /// Store the manifest of a chunked object: an empty-bodied header
    /// record referencing `total_chunks` children of `chunk_size` bytes
    /// each (the last may be shorter), carrying the digest of the
    /// assembled body.
    async fn put_manifest(
        &self,
        key: &[u8],
        total_size: u64,
        chunk_size: u64,
        total_chunks: u64,
        digest: &Md5Digest,
    ) -> Result<Md5Digest, Error>;

    /// Delete the record at `key`.
    async fn delete(&self, key: &[u8]) -> Result<(), Error>;
}
