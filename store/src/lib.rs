mod chunk_key;
mod digests;
mod errors;
mod utils;

pub mod cachestore;
pub mod fixtures;
pub mod proto;
pub mod storagerpc;
pub mod tonic;

pub use chunk_key::{chunk_key, contains_separator, parse_chunk_key, SEPARATOR};
pub use digests::{md5, Md5Digest, RollingDigest, MD5_LEN};
pub use errors::Error;
pub use utils::unix_now;
