use bytes::{BufMut, Bytes, BytesMut};

/// Separator between a parent key and the ASCII-decimal chunk index.
pub const SEPARATOR: u8 = 0x0a;

/// Derives the storage key of the `index`-th chunk (1-based) below
/// `parent`: `parent || 0x0A || ascii(index)`, no leading zeros.
pub fn chunk_key(parent: &[u8], index: u64) -> Bytes {
    debug_assert!(index >= 1, "chunk indices are 1-based");

    let suffix = index.to_string();
    let mut key = BytesMut::with_capacity(parent.len() + 1 + suffix.len());
    key.put_slice(parent);
    key.put_u8(SEPARATOR);
    key.put_slice(suffix.as_bytes());
    key.freeze()
}

/// Whether `key` already contains the separator byte. Such keys collide
/// with the chunk key namespace and must never be cached, though they
/// may still be stored.
pub fn contains_separator(key: &[u8]) -> bool {
    key.contains(&SEPARATOR)
}

/// Splits a chunk key back into its parent key and index.
///
/// Returns None when there is no separator, or when the suffix is not a
/// decimal integer without leading zeros.
pub fn parse_chunk_key(key: &[u8]) -> Option<(&[u8], u64)> {
    let pos = key.iter().rposition(|b| *b == SEPARATOR)?;
    let (parent, suffix) = (&key[..pos], &key[pos + 1..]);

    if suffix.is_empty() || suffix[0] == b'0' || !suffix.iter().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let index = std::str::from_utf8(suffix).ok()?.parse().ok()?;
    Some((parent, index))
}
