//! Object key sanitization
//!
//! Request paths arrive percent-encoded and untrusted. Before anything is
//! looked up they are decoded and normalized into an [`ObjectKey`], which
//! guarantees the key is non-empty and made only of plain segments: no
//! leading or doubled slash, no `.` and no `..`. Every spelling of a path
//! maps to one key, so prefix checks see what the store will open.

use crate::error::{MediaError, Result};
use percent_encoding::percent_decode_str;
use std::fmt;
use tracing::debug;

/// A canonical object key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Sanitize a raw, path-encoded key
    ///
    /// Steps: percent-decode, turn backslashes into forward slashes, then
    /// drop empty and `.` segments. Fails with [`MediaError::InvalidKey`]
    /// when the input is not valid percent-encoded UTF-8, when nothing is
    /// left, or when any segment is `..`.
    pub fn parse(raw: &str) -> Result<Self> {
        if !has_valid_escapes(raw) {
            debug!("Rejecting key with malformed percent escape: {}", raw);
            return Err(MediaError::InvalidKey(format!(
                "malformed percent escape in '{}'",
                raw
            )));
        }

        let decoded = percent_decode_str(raw).decode_utf8().map_err(|e| {
            MediaError::InvalidKey(format!("key is not valid UTF-8: {}", e))
        })?;

        let normalized = decoded.replace('\\', "/");

        let mut segments = Vec::new();
        for segment in normalized.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    debug!("Rejecting key with traversal segment: {}", normalized);
                    return Err(MediaError::InvalidKey(format!(
                        "key contains '..' segment: {}",
                        normalized
                    )));
                }
                segment => segments.push(segment),
            }
        }

        if segments.is_empty() {
            return Err(MediaError::InvalidKey("key is empty".to_string()));
        }

        Ok(ObjectKey(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Every `%` must introduce exactly two hex digits
fn has_valid_escapes(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}
