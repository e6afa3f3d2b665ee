#![allow(clippy::derive_partial_eq_without_eq)]

mod grpc_storagerpc_wrapper;

pub use grpc_storagerpc_wrapper::GRPCStorageWrapper;

tonic::include_proto!("coral.storage.v1");

use crate::digests::{Md5Digest, MD5_LEN};

/// Errors that can occur during the validation of [CachedEntry] records.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidateCachedEntryError {
    /// Invalid etag length encountered
    #[error("invalid etag length: {0}")]
    InvalidEtagLen(usize),
    /// Inline body length doesn't match the recorded size
    #[error("size {0} does not match inline body length {1}")]
    SizeMismatch(u64, u64),
}

impl ObjectMeta {
    /// Whether this record is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.del != 0
    }

    /// Whether this record is a manifest with children.
    pub fn is_chunked(&self) -> bool {
        self.cnumber > 0
    }

    /// The checksum as a typed digest, if it has the right width.
    pub fn etag(&self) -> Option<Md5Digest> {
        Md5Digest::try_from(self.checksum.clone()).ok()
    }
}

impl CachedEntry {
    /// Whether the body lives on disk rather than inline.
    pub fn is_on_disk(&self) -> bool {
        !self.file_path.is_empty()
    }

    /// Checks the structural invariants of a cache record: a 16-byte
    /// etag, and `size == len(body)` for inline entries.
    pub fn validate(&self) -> Result<(), ValidateCachedEntryError> {
        if self.etag.len() != MD5_LEN {
            return Err(ValidateCachedEntryError::InvalidEtagLen(self.etag.len()));
        }
        if !self.is_on_disk() && self.size != self.body.len() as u64 {
            return Err(ValidateCachedEntryError::SizeMismatch(
                self.size,
                self.body.len() as u64,
            ));
        }
        Ok(())
    }
}
