//! `Range` header parsing.
//!
//! Only single `bytes` ranges are supported. Ranges whose end lies beyond the
//! resource are rejected rather than clamped.

use crate::error::RangeError;

/// An inclusive byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Range` request header value, e.g. `bytes=0-99`.
    pub fn to_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// `Content-Range` response header value, e.g. `bytes 0-99/1000`.
    pub fn content_range(&self, length: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, length)
    }
}

/// Whether a `Range` header asks for the whole resource.
///
/// True for no header and for `bytes=0-`.
pub fn is_whole_resource(header: Option<&str>) -> bool {
    match header {
        None => true,
        Some(value) => value.trim() == "bytes=0-",
    }
}

/// Parse a `Range` header against a resource of `length` bytes.
pub fn parse_range(header: &str, length: u64) -> Result<ByteRange, RangeError> {
    let header = header.trim();
    let spec = header
        .strip_prefix("bytes=")
        .ok_or_else(|| RangeError::MissingUnit(header.to_string()))?;

    if spec.contains(',') {
        return Err(RangeError::MultipleRanges(header.to_string()));
    }

    let parts: Vec<&str> = spec.split('-').map(str::trim).collect();
    let [raw_start, raw_end] = parts.as_slice() else {
        return Err(RangeError::Malformed(header.to_string()));
    };
    if raw_start.is_empty() && raw_end.is_empty() {
        return Err(RangeError::Malformed(header.to_string()));
    }

    let start = parse_bound(raw_start)?;
    let end = parse_bound(raw_end)?;

    let unsatisfiable = || RangeError::Unsatisfiable {
        range: header.to_string(),
        length,
    };
    if length == 0 {
        return Err(unsatisfiable());
    }
    let last = length - 1;

    let range = match (start, end) {
        // Suffix range: the last N bytes
        (None, Some(suffix)) => {
            if suffix == 0 {
                return Err(unsatisfiable());
            }
            ByteRange {
                start: length.saturating_sub(suffix),
                end: last,
            }
        }
        (Some(start), None) => {
            if start > last {
                return Err(unsatisfiable());
            }
            ByteRange { start, end: last }
        }
        (Some(start), Some(end)) => {
            if start > end {
                return Err(RangeError::StartAfterEnd { start, end });
            }
            if end > last {
                return Err(RangeError::EndOutOfBounds { end, length });
            }
            ByteRange { start, end }
        }
        (None, None) => return Err(RangeError::Malformed(header.to_string())),
    };

    Ok(range)
}

fn parse_bound(raw: &str) -> Result<Option<u64>, RangeError> {
    if raw.is_empty() {
        return Ok(None);
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::NotANumber(raw.to_string()));
    }
    raw.parse()
        .map(Some)
        .map_err(|_| RangeError::NotANumber(raw.to_string()))
}
