use bytes::Bytes;
use data_encoding::HEXLOWER;
use md5::{Digest as _, Md5};
use thiserror::Error;

/// MD5 digest of an object body, the unit of content integrity across
/// the gateway: object checksums, cache record etags and the ETag
/// response header are all this digest.
#[derive(PartialEq, Eq, Hash)]
pub struct Md5Digest(Bytes);

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid digest length: {0}")]
    InvalidDigestLen(usize),
}

pub const MD5_LEN: usize = 16;

impl Md5Digest {
    pub fn as_slice(&self) -> &[u8] {
        &self.0[..]
    }

    /// The digest as a big-endian unsigned integer, the form checksums
    /// take in cluster metadata.
    pub fn to_u128(&self) -> u128 {
        u128::from_be_bytes(self.0[..].try_into().expect("digest is 16 bytes"))
    }
}

impl From<Md5Digest> for Bytes {
    fn from(val: Md5Digest) -> Self {
        val.0
    }
}

impl From<u128> for Md5Digest {
    fn from(value: u128) -> Self {
        Self(Bytes::copy_from_slice(&value.to_be_bytes()))
    }
}

impl From<&[u8; MD5_LEN]> for Md5Digest {
    fn from(value: &[u8; MD5_LEN]) -> Self {
        Self(Bytes::copy_from_slice(value))
    }
}

impl TryFrom<Vec<u8>> for Md5Digest {
    type Error = Error;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        if value.len() != MD5_LEN {
            Err(Error::InvalidDigestLen(value.len()))
        } else {
            Ok(Self(value.into()))
        }
    }
}

impl TryFrom<Bytes> for Md5Digest {
    type Error = Error;

    fn try_from(value: Bytes) -> Result<Self, Self::Error> {
        if value.len() != MD5_LEN {
            Err(Error::InvalidDigestLen(value.len()))
        } else {
            Ok(Self(value))
        }
    }
}

impl Clone for Md5Digest {
    fn clone(&self) -> Self {
        Self(self.0.to_owned())
    }
}

/// Renders the 32 lowercase hex characters clients see in ETag headers.
impl std::fmt::Display for Md5Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", HEXLOWER.encode(&self.0))
    }
}

impl std::fmt::Debug for Md5Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "md5:{}", HEXLOWER.encode(&self.0))
    }
}

/// Incremental MD5 over the bytes of an object, fed one chunk at a time.
///
/// Callers must only feed bytes that were durably stored; the digest of
/// a committed upload is defined as the MD5 of the committed chunk
/// bodies in ascending index order.
#[derive(Clone, Default)]
pub struct RollingDigest(Md5);

impl RollingDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finalize(self) -> Md5Digest {
        Md5Digest(Bytes::copy_from_slice(&self.0.finalize()))
    }

    /// Digest of everything fed so far, without consuming the state.
    pub fn snapshot(&self) -> Md5Digest {
        self.clone().finalize()
    }
}

/// One-shot MD5 of a byte slice.
pub fn md5(data: &[u8]) -> Md5Digest {
    let mut digest = RollingDigest::new();
    digest.update(data);
    digest.finalize()
}
