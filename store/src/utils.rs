use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, the timestamp granularity shared by
/// object metadata and cache records.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs()
}
