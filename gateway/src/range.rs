use coral_store::Error;

/// A single range as written by the client, before it is resolved
/// against the object size: `end == 0` means "to the end of the
/// object", a negative `end` a suffix of that many bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawRange {
    pub start: u64,
    pub end: i64,
}

impl RawRange {
    /// Resolves against an object of `size` bytes into an inclusive
    /// `(start, end)` pair, clamping `end` to the last byte. A range
    /// starting past the object is unsatisfiable.
    pub fn resolve(self, size: u64) -> Result<(u64, u64), Error> {
        if size == 0 {
            return Err(Error::BadRange);
        }

        if self.end < 0 {
            let suffix = self.end.unsigned_abs();
            return Ok((size.saturating_sub(suffix), size - 1));
        }

        if self.start >= size {
            return Err(Error::BadRange);
        }

        let end = if self.end == 0 {
            size - 1
        } else {
            std::cmp::min(self.end as u64, size - 1)
        };

        if self.start > end {
            return Err(Error::BadRange);
        }
        Ok((self.start, end))
    }
}

/// Parses a `Range` header value. Returns None when it isn't a
/// well-formed `bytes=` specifier; callers then serve the full object.
pub(crate) fn parse_range_header(value: &str) -> Option<Vec<RawRange>> {
    let spec = value.strip_prefix("bytes=")?;
    let mut ranges = Vec::new();

    for part in spec.split(',') {
        let part = part.trim();

        if let Some(suffix) = part.strip_prefix('-') {
            // suffix form, "-N"
            let len: i64 = suffix.parse().ok()?;
            if len <= 0 {
                return None;
            }
            ranges.push(RawRange { start: 0, end: -len });
            continue;
        }

        let (start, end) = part.split_once('-')?;
        let start: u64 = start.parse().ok()?;
        let end: i64 = if end.is_empty() { 0 } else { end.parse().ok()? };
        if end < 0 {
            return None;
        }
        ranges.push(RawRange { start, end });
    }

    if ranges.is_empty() {
        None
    } else {
        Some(ranges)
    }
}
