//! Shared test data for the store and gateway test suites.

use bytes::Bytes;
use lazy_static::lazy_static;

pub const OBJECT_KEY: &[u8] = b"bucket/object";

lazy_static! {
    pub static ref BODY_A: Bytes = Bytes::from_static(b"smallobjectbody");
    pub static ref BODY_B: Bytes = Bytes::from_static(b"anotherobjectbody");
}
