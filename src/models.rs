//! Core data models for the media delivery service

use crate::error::{MediaError, Result};
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

/// A resolved byte range with absolute, inclusive bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// Starting byte position (inclusive)
    pub start: u64,
    /// Ending byte position (inclusive)
    pub end: u64,
}

impl ByteRange {
    /// Create a new ByteRange
    ///
    /// # Returns
    /// * `Ok(ByteRange)` if the range is valid
    /// * `Err(MediaError)` if start > end
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(MediaError::InvalidRange(format!(
                "start ({}) must be <= end ({})",
                start, end
            )));
        }
        Ok(ByteRange { start, end })
    }

    /// Get the size of this byte range in bytes
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Format as a satisfied `Content-Range` value against `total_size`
    pub fn to_content_range(&self, total_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total_size)
    }
}

/// Metadata the object store keeps for every blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Canonical key the object is stored under
    pub key: String,
    /// Total size of the object in bytes
    pub size: u64,
    /// Content type recorded at upload time
    pub content_type: Option<String>,
    /// Entity tag, already quoted
    pub etag: Option<String>,
    /// Upload timestamp, served as `Last-Modified`
    pub uploaded: SystemTime,
    /// Free-form metadata attached by the ingestion pipeline
    pub custom_metadata: HashMap<String, String>,
}

impl ObjectMetadata {
    /// Create metadata with only the required fields set
    pub fn new(key: impl Into<String>, size: u64, uploaded: SystemTime) -> Self {
        ObjectMetadata {
            key: key.into(),
            size,
            content_type: None,
            etag: None,
            uploaded,
            custom_metadata: HashMap::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// Chunks of a payload read incrementally from the store
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Payload of an object or a response
///
/// Small payloads are held in memory. Large ones stay a stream of chunks
/// whose total length is known up front, so `Content-Length` can still be
/// sent without buffering the file.
pub enum MediaBody {
    Bytes(Bytes),
    Stream { stream: ByteStream, len: u64 },
}

impl MediaBody {
    pub fn empty() -> Self {
        MediaBody::Bytes(Bytes::new())
    }

    /// Payload length in bytes
    pub fn len(&self) -> u64 {
        match self {
            MediaBody::Bytes(bytes) => bytes.len() as u64,
            MediaBody::Stream { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, MediaBody::Stream { .. })
    }

    /// The in-memory payload, `None` for streamed bodies
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            MediaBody::Bytes(bytes) => Some(bytes),
            MediaBody::Stream { .. } => None,
        }
    }

    /// Drain the body into memory
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        match self {
            MediaBody::Bytes(bytes) => Ok(bytes),
            MediaBody::Stream { mut stream, len } => {
                let mut buf = BytesMut::with_capacity(len as usize);
                while let Some(chunk) = stream.try_next().await? {
                    buf.extend_from_slice(&chunk);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl Default for MediaBody {
    fn default() -> Self {
        MediaBody::empty()
    }
}

impl From<Bytes> for MediaBody {
    fn from(bytes: Bytes) -> Self {
        MediaBody::Bytes(bytes)
    }
}

impl fmt::Debug for MediaBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaBody::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            MediaBody::Stream { len, .. } => {
                f.debug_struct("Stream").field("len", len).finish_non_exhaustive()
            }
        }
    }
}

/// Streams never compare equal, not even to themselves
impl PartialEq for MediaBody {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MediaBody::Bytes(a), MediaBody::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq<Bytes> for MediaBody {
    fn eq(&self, other: &Bytes) -> bool {
        self.as_bytes() == Some(other)
    }
}

/// Result of a store read
///
/// `body` is `None` when the store decided, based on the conditional
/// headers it was given, that the payload should not be sent. When a range
/// was requested, `body` holds only the bytes inside `range`.
#[derive(Debug)]
pub struct StoredObject {
    pub metadata: ObjectMetadata,
    pub body: Option<MediaBody>,
    pub range: Option<ByteRange>,
}

impl StoredObject {
    /// Object carrying its full payload
    pub fn full(metadata: ObjectMetadata, body: impl Into<MediaBody>) -> Self {
        StoredObject {
            metadata,
            body: Some(body.into()),
            range: None,
        }
    }

    /// Object whose body was withheld by a precondition
    pub fn without_body(metadata: ObjectMetadata) -> Self {
        StoredObject {
            metadata,
            body: None,
            range: None,
        }
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range_new() {
        let range = ByteRange::new(0, 1023).unwrap();
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 1023);
        assert_eq!(range.size(), 1024);
    }

    #[test]
    fn test_byte_range_invalid() {
        let result = ByteRange::new(100, 50);
        assert!(result.is_err());
    }

    #[test]
    fn test_byte_range_single_byte() {
        let range = ByteRange::new(7, 7).unwrap();
        assert_eq!(range.size(), 1);
    }

    #[test]
    fn test_content_range_format() {
        let range = ByteRange::new(0, 3).unwrap();
        assert_eq!(range.to_content_range(11), "bytes 0-3/11");
    }

    #[test]
    fn test_object_metadata_builders() {
        let metadata = ObjectMetadata::new("a/b.txt", 11, SystemTime::UNIX_EPOCH)
            .with_content_type("text/plain")
            .with_etag("\"abc\"");
        assert_eq!(metadata.key, "a/b.txt");
        assert_eq!(metadata.content_type.as_deref(), Some("text/plain"));
        assert_eq!(metadata.etag.as_deref(), Some("\"abc\""));
        assert!(metadata.custom_metadata.is_empty());
    }

    #[test]
    fn test_stored_object_without_body() {
        let metadata = ObjectMetadata::new("a", 1, SystemTime::UNIX_EPOCH);
        let object = StoredObject::without_body(metadata);
        assert!(!object.has_body());
        assert!(object.range.is_none());
    }

    #[tokio::test]
    async fn test_media_body_stream() {
        let chunks: Vec<std::io::Result<Bytes>> =
            vec![Ok(Bytes::from("abc")), Ok(Bytes::from("def"))];
        let body = MediaBody::Stream {
            stream: Box::pin(futures::stream::iter(chunks)),
            len: 6,
        };
        assert!(body.is_stream());
        assert_eq!(body.len(), 6);
        assert!(body.as_bytes().is_none());
        assert_eq!(body.into_bytes().await.unwrap(), Bytes::from("abcdef"));
    }

    #[test]
    fn test_media_body_bytes() {
        let body = MediaBody::from(Bytes::from("abc"));
        assert_eq!(body, Bytes::from("abc"));
        assert_eq!(body, MediaBody::from(Bytes::from("abc")));
        assert!(MediaBody::empty().is_empty());
    }
}
