//! Range header parsing and resolution
//!
//! Only a single range per request is supported, in one of three shapes:
//! `bytes=A-B`, `bytes=A-` and the suffix form `bytes=-N`. A header that is
//! present but does not match any of them is an error, which callers turn
//! into `416 Range Not Satisfiable`. An absent header means "no range".

use crate::error::{MediaError, Result};
use crate::models::ByteRange;
use http::HeaderMap;
use tracing::debug;

/// A range as requested by the client, before the object size is known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeSpec {
    /// `bytes=start-end` or `bytes=start-`
    Bytes { start: u64, end: Option<u64> },
    /// `bytes=-length`: the last `length` bytes
    Suffix { length: u64 },
}

impl RangeSpec {
    /// Resolve against a known total size into absolute inclusive bounds
    ///
    /// An open or overlong `end` is clamped to the last byte, and a suffix
    /// longer than the object covers the whole object. A `start` at or
    /// beyond the end of the object, or any range over an empty object,
    /// yields [`MediaError::RangeUnsatisfiable`].
    pub fn resolve(&self, total_size: u64) -> Result<ByteRange> {
        if total_size == 0 {
            return Err(MediaError::RangeUnsatisfiable {
                size: Some(total_size),
            });
        }
        let last = total_size - 1;

        match *self {
            RangeSpec::Bytes { start, end } => {
                if start >= total_size {
                    debug!(
                        "Unsatisfiable range: start={} beyond total_size={}",
                        start, total_size
                    );
                    return Err(MediaError::RangeUnsatisfiable {
                        size: Some(total_size),
                    });
                }
                let end = end.map_or(last, |end| end.min(last));
                ByteRange::new(start, end)
            }
            RangeSpec::Suffix { length } => {
                let length = length.min(total_size);
                ByteRange::new(total_size - length, last)
            }
        }
    }

    /// Render back into a `Range` header value
    pub fn to_header(&self) -> String {
        match *self {
            RangeSpec::Bytes { start, end: Some(end) } => format!("bytes={}-{}", start, end),
            RangeSpec::Bytes { start, end: None } => format!("bytes={}-", start),
            RangeSpec::Suffix { length } => format!("bytes=-{}", length),
        }
    }
}

/// Parse an optional `Range` header value
///
/// # Returns
/// * `Ok(None)` if no header was sent
/// * `Ok(Some(RangeSpec))` for a supported single range
/// * `Err(MediaError::InvalidRange)` for anything else
pub fn parse_range_header(value: Option<&str>) -> Result<Option<RangeSpec>> {
    let Some(raw) = value else {
        return Ok(None);
    };

    let header = raw.trim();
    let invalid = || MediaError::InvalidRange(raw.to_string());

    let spec = header.strip_prefix("bytes=").ok_or_else(invalid)?;
    if spec.contains(',') {
        debug!("Multi-range requests are not supported: {}", raw);
        return Err(invalid());
    }

    let (first, second) = spec.split_once('-').ok_or_else(invalid)?;

    let range = if first.is_empty() {
        let length = parse_position(second).ok_or_else(invalid)?;
        if length == 0 {
            return Err(invalid());
        }
        RangeSpec::Suffix { length }
    } else {
        let start = parse_position(first).ok_or_else(invalid)?;
        let end = if second.is_empty() {
            None
        } else {
            let end = parse_position(second).ok_or_else(invalid)?;
            if end < start {
                debug!("Range end {} precedes start {}", end, start);
                return Err(invalid());
            }
            Some(end)
        };
        RangeSpec::Bytes { start, end }
    };

    Ok(Some(range))
}

/// Extract and parse the `Range` header from a request header map
///
/// A header value that is not visible ASCII counts as present but invalid.
pub fn range_from_headers(headers: &HeaderMap) -> Result<Option<RangeSpec>> {
    match headers.get(http::header::RANGE) {
        None => Ok(None),
        Some(value) => {
            let value = value.to_str().map_err(|_| {
                MediaError::InvalidRange("non-ASCII range header".to_string())
            })?;
            parse_range_header(Some(value))
        }
    }
}

/// Plain decimal digits only; `str::parse` would also accept a leading `+`
fn parse_position(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
