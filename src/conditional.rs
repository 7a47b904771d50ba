//! Conditional request headers and their evaluation
//!
//! The delivery handler never compares validators itself. It forwards the
//! raw headers to the store, and store backends call
//! [`Conditionals::should_send_body`] to decide whether to withhold the
//! payload.

use crate::models::ObjectMetadata;
use http::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Raw conditional headers, passed through verbatim
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditionals {
    pub if_none_match: Option<String>,
    pub if_match: Option<String>,
    pub if_modified_since: Option<String>,
    pub if_unmodified_since: Option<String>,
}

impl Conditionals {
    /// Collect the conditional headers present on a request
    ///
    /// Values that are not valid visible ASCII are dropped.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: http::header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };

        Conditionals {
            if_none_match: get(http::header::IF_NONE_MATCH),
            if_match: get(http::header::IF_MATCH),
            if_modified_since: get(http::header::IF_MODIFIED_SINCE),
            if_unmodified_since: get(http::header::IF_UNMODIFIED_SINCE),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.if_none_match.is_none()
            && self.if_match.is_none()
            && self.if_modified_since.is_none()
            && self.if_unmodified_since.is_none()
    }

    /// Decide whether the payload should accompany the object
    ///
    /// `If-Match` takes precedence over `If-Unmodified-Since`, and
    /// `If-None-Match` over `If-Modified-Since`. Dates that fail to parse
    /// are ignored.
    pub fn should_send_body(&self, metadata: &ObjectMetadata) -> bool {
        let etag = metadata.etag.as_deref();

        if let Some(if_match) = &self.if_match {
            if !etag_list_matches(if_match, etag, false) {
                debug!("If-Match failed for key={}", metadata.key);
                return false;
            }
        } else if let Some(since) = self.if_unmodified_since.as_deref().and_then(parse_date) {
            if truncate_to_secs(metadata.uploaded) > since {
                debug!("If-Unmodified-Since failed for key={}", metadata.key);
                return false;
            }
        }

        if let Some(if_none_match) = &self.if_none_match {
            if etag_list_matches(if_none_match, etag, true) {
                debug!("If-None-Match matched for key={}", metadata.key);
                return false;
            }
        } else if let Some(since) = self.if_modified_since.as_deref().and_then(parse_date) {
            if truncate_to_secs(metadata.uploaded) <= since {
                debug!("If-Modified-Since: not modified for key={}", metadata.key);
                return false;
            }
        }

        true
    }
}

/// Match a comma-separated ETag list (or `*`) against the object's ETag
fn etag_list_matches(list: &str, etag: Option<&str>, weak: bool) -> bool {
    let list = list.trim();
    // `*` matches any current representation
    if list == "*" {
        return true;
    }
    let Some(etag) = etag else {
        return false;
    };

    list.split(',').map(str::trim).any(|candidate| {
        if weak {
            strip_weak(candidate) == strip_weak(etag)
        } else {
            !candidate.starts_with("W/") && !etag.starts_with("W/") && candidate == etag
        }
    })
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

fn parse_date(value: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(value.trim()).ok()
}

/// HTTP dates carry whole seconds only
fn truncate_to_secs(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => UNIX_EPOCH + Duration::from_secs(d.as_secs()),
        Err(_) => time,
    }
}
