use bstr::ByteSlice;
use thiserror::Error;
use tonic::Status;

/// Errors surfaced by the storage cluster and the cache backends.
///
/// A cache miss is not an error; [crate::cachestore::CacheStore::get]
/// returns `Ok(None)` for it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("object not found")]
    NotFound,

    #[error("request to the storage cluster timed out")]
    Timeout,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal storage error: {0}")]
    StorageError(String),

    #[error("requested range not satisfiable")]
    BadRange,

    #[error("upload rolled back, {0} chunk(s) failed")]
    RolledBackUpload(usize),
}

impl Error {
    /// A storage error scoped to the key it occurred on.
    pub fn storage(key: &[u8], msg: impl std::fmt::Display) -> Self {
        Error::StorageError(format!("{}: {}", key.as_bstr(), msg))
    }
}

impl From<Error> for Status {
    fn from(value: Error) -> Self {
        match value {
            Error::NotFound => Status::not_found("object not found"),
            Error::Timeout => Status::deadline_exceeded("storage request timed out"),
            Error::InvalidRequest(msg) => Status::invalid_argument(msg),
            Error::StorageError(msg) => Status::internal(format!("storage error: {}", msg)),
            Error::BadRange => Status::out_of_range("requested range not satisfiable"),
            Error::RolledBackUpload(n) => {
                Status::internal(format!("upload rolled back, {} chunk(s) failed", n))
            }
        }
    }
}

impl From<Status> for Error {
    fn from(value: Status) -> Self {
        match value.code() {
            tonic::Code::NotFound => Error::NotFound,
            tonic::Code::DeadlineExceeded => Error::Timeout,
            tonic::Code::InvalidArgument => Error::InvalidRequest(value.message().to_string()),
            tonic::Code::OutOfRange => Error::BadRange,
            _ => Error::StorageError(value.message().to_string()),
        }
    }
}

impl From<crate::tonic::Error> for Error {
    fn from(value: crate::tonic::Error) -> Self {
        Self::StorageError(value.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        match value.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound,
            std::io::ErrorKind::InvalidInput => Error::InvalidRequest(value.to_string()),
            std::io::ErrorKind::TimedOut => Error::Timeout,
            _ => Error::StorageError(value.to_string()),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::NotFound => Self::new(std::io::ErrorKind::NotFound, "object not found"),
            Error::Timeout => Self::new(std::io::ErrorKind::TimedOut, "storage request timed out"),
            Error::InvalidRequest(msg) => Self::new(std::io::ErrorKind::InvalidInput, msg),
            e => Self::new(std::io::ErrorKind::Other, e.to_string()),
        }
    }
}
