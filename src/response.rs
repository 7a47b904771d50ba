//! Response builder for media objects
//!
//! Turns a store result into status, headers and body. Bodies held in
//! memory are cheap to copy, which is what lets the edge cache keep full
//! responses. Streamed bodies pass through to the client untouched.

use crate::error::{MediaError, Result};
use crate::models::{ByteRange, MediaBody, ObjectMetadata, StoredObject};
use bytes::Bytes;
use futures::TryStreamExt;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use tracing::debug;

/// Body type handed to hyper
pub type HttpBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Default `Cache-Control` for immutable, content-addressed media
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Header marking responses served from the edge cache
pub const CACHE_STATUS_HEADER: &str = "cf-cache-status";

/// An HTTP response whose body is either in memory or streamed
#[derive(Debug)]
pub struct MediaResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: MediaBody,
}

impl MediaResponse {
    /// Plain-text response for statuses that carry no object
    pub fn status_only(status: StatusCode, message: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(message.len() as u64));
        MediaResponse {
            status,
            headers,
            body: Bytes::copy_from_slice(message.as_bytes()).into(),
        }
    }

    /// Copy of this response, `None` when the body is streamed
    pub fn try_clone(&self) -> Option<Self> {
        let body = self.body.as_bytes()?.clone();
        Some(MediaResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: body.into(),
        })
    }

    /// Map a client-facing error to its response
    pub fn from_error(err: &MediaError) -> Self {
        match err {
            MediaError::InvalidRange(_) => ResponseBuilder::range_not_satisfiable(None),
            MediaError::RangeUnsatisfiable { size } => ResponseBuilder::range_not_satisfiable(*size),
            other => {
                let status = StatusCode::from_u16(other.to_http_status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let message = status.canonical_reason().unwrap_or("Error");
                MediaResponse::status_only(status, message)
            }
        }
    }

    /// Mark this response as served from the edge cache
    pub fn mark_cache_hit(mut self) -> Self {
        self.headers.insert(
            HeaderName::from_static(CACHE_STATUS_HEADER),
            HeaderValue::from_static("HIT"),
        );
        self
    }

    pub fn is_cache_hit(&self) -> bool {
        self.headers
            .get(CACHE_STATUS_HEADER)
            .map(|v| v == "HIT")
            .unwrap_or(false)
    }

    /// Drop the body, keeping headers such as `Content-Length` intact
    pub fn without_body(mut self) -> Self {
        self.body = MediaBody::empty();
        self
    }

    /// Convert into a hyper-compatible response
    pub fn into_http(self) -> Response<HttpBody> {
        let body: HttpBody = match self.body {
            MediaBody::Bytes(bytes) => Full::new(bytes)
                .map_err(|never| match never {})
                .boxed_unsync(),
            MediaBody::Stream { stream, .. } => {
                StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync()
            }
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Builds responses from store objects
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    cache_control: HeaderValue,
}

impl ResponseBuilder {
    /// Create a builder with a custom `Cache-Control` directive
    pub fn new(cache_control: &str) -> Result<Self> {
        let cache_control = HeaderValue::from_str(cache_control).map_err(|e| {
            MediaError::ConfigError(format!("invalid cache_control '{}': {}", cache_control, e))
        })?;
        Ok(ResponseBuilder { cache_control })
    }

    /// Build the response for a GET
    ///
    /// * range and body: `206` with `Content-Range`
    /// * body only: `200` with the full payload
    /// * no body: `304`, headers only
    pub fn build(&self, object: StoredObject) -> Result<MediaResponse> {
        let StoredObject { metadata, body, range } = object;
        let mut headers = self.metadata_headers(&metadata)?;

        let (status, body) = match (body, range) {
            (Some(body), Some(range)) => {
                set_partial_headers(&mut headers, &range, metadata.size)?;
                (StatusCode::PARTIAL_CONTENT, body)
            }
            (Some(body), None) => {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
                (StatusCode::OK, body)
            }
            (None, _) => (StatusCode::NOT_MODIFIED, MediaBody::empty()),
        };

        debug!(
            "Built response: key={}, status={}, body_len={}, streamed={}",
            metadata.key,
            status,
            body.len(),
            body.is_stream()
        );

        Ok(MediaResponse { status, headers, body })
    }

    /// Build the header-only response for a HEAD
    pub fn build_head(&self, metadata: &ObjectMetadata) -> Result<MediaResponse> {
        let mut headers = self.metadata_headers(metadata)?;
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.size));
        Ok(MediaResponse {
            status: StatusCode::OK,
            headers,
            body: MediaBody::empty(),
        })
    }

    /// `416` with `Content-Range: bytes */{size}`, or `*` when unknown
    pub fn range_not_satisfiable(size: Option<u64>) -> MediaResponse {
        let content_range = match size {
            Some(size) => format!("bytes */{}", size),
            None => "bytes */*".to_string(),
        };
        let mut response = MediaResponse::status_only(
            StatusCode::RANGE_NOT_SATISFIABLE,
            "Range Not Satisfiable",
        );
        if let Ok(value) = HeaderValue::from_str(&content_range) {
            response.headers.insert(header::CONTENT_RANGE, value);
        }
        response
    }

    fn metadata_headers(&self, metadata: &ObjectMetadata) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, self.cache_control.clone());
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

        let last_modified = httpdate::fmt_http_date(metadata.uploaded);
        headers.insert(header::LAST_MODIFIED, header_value(&last_modified)?);

        if let Some(etag) = &metadata.etag {
            headers.insert(header::ETAG, header_value(etag)?);
        }
        if let Some(content_type) = &metadata.content_type {
            headers.insert(header::CONTENT_TYPE, header_value(content_type)?);
        }
        Ok(headers)
    }
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        ResponseBuilder {
            cache_control: HeaderValue::from_static(IMMUTABLE_CACHE_CONTROL),
        }
    }
}

fn set_partial_headers(headers: &mut HeaderMap, range: &ByteRange, total_size: u64) -> Result<()> {
    headers.insert(
        header::CONTENT_RANGE,
        header_value(&range.to_content_range(total_size))?,
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.size()));
    Ok(())
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| MediaError::upstream(format!("invalid header value '{}': {}", value, e)))
}
