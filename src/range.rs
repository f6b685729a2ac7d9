use thiserror::Error;

/// A single byte window with an inclusive `end`, as written in
/// `Range` and `Content-Range` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Create a new byte range covering `start..=end`.
    pub fn new(start: u64, end: u64) -> Self {
        ByteRange { start, end }
    }

    /// Number of bytes in the window.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Reasons a `Range` header could not be turned into a [`ByteRange`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseRangeError {
    /// The header is not a single `bytes=<start>-<end>` spec.
    #[error("malformed range header {0:?}")]
    Malformed(String),

    /// The header is well formed but selects no bytes of the resource.
    #[error("range {header:?} not satisfiable for {total_size} bytes")]
    Unsatisfiable { header: String, total_size: u64 },
}

/// Parse a `Range` header against a resource of `total_size` bytes.
///
/// Only a single `bytes=` range is accepted. Suffix ranges (`bytes=-N`)
/// select the last `N` bytes, or the whole resource when `N` exceeds its
/// size. An explicit end must lie inside the resource; it is not clamped.
pub fn parse_range_header(header: &str, total_size: u64) -> Result<ByteRange, ParseRangeError> {
    let malformed = || ParseRangeError::Malformed(header.to_owned());
    let unsatisfiable = || ParseRangeError::Unsatisfiable {
        header: header.to_owned(),
        total_size,
    };

    let spec = header.trim().strip_prefix("bytes=").ok_or_else(malformed)?;
    let (start, end) = spec.split_once('-').ok_or_else(malformed)?;
    let start = parse_position(start.trim()).ok_or_else(malformed)?;
    let end = parse_position(end.trim()).ok_or_else(malformed)?;

    // every branch below needs a last byte to exist
    let last = total_size.checked_sub(1).ok_or_else(unsatisfiable)?;

    let range = match (start, end) {
        (None, None) => return Err(malformed()),
        (None, Some(0)) => return Err(unsatisfiable()),
        (None, Some(suffix)) => ByteRange::new(total_size.saturating_sub(suffix), last),
        (Some(start), None) => ByteRange::new(start, last),
        (Some(start), Some(end)) => ByteRange::new(start, end),
    };

    if range.start > range.end || range.end > last {
        return Err(unsatisfiable());
    }

    Ok(range)
}

/// `Some(None)` for an omitted position, `None` if it is not a plain
/// decimal number that fits in a `u64`.
fn parse_position(s: &str) -> Option<Option<u64>> {
    if s.is_empty() {
        return Some(None);
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok().map(Some)
}
