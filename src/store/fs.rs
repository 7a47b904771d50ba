//! Filesystem-backed object store
//!
//! Every object is a regular file below `root`, addressed by its key.
//! Optional sidecar files named `<file>.meta.json` carry the content type,
//! an explicit ETag and custom metadata written by the ingestion pipeline.
//! Sidecars are never served as objects themselves.
//!
//! Bodies up to the stream threshold are read into memory. Larger ones are
//! streamed from the open file in chunks. Size, ETag and body all come
//! from one open handle, so a file swapped mid-request cannot produce a
//! `Content-Length` that disagrees with the bytes sent.

use super::{GetOptions, ObjectStore};
use crate::error::{MediaError, Result};
use crate::models::{MediaBody, ObjectMetadata, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

const SIDECAR_SUFFIX: &str = ".meta.json";

/// Bodies above this many bytes are streamed
pub const DEFAULT_STREAM_THRESHOLD: u64 = 8 * 1024 * 1024;

/// Metadata sidecar stored next to an object file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sidecar {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub custom_metadata: HashMap<String, String>,
}

/// Object store reading files below a root directory
pub struct FsStore {
    root: PathBuf,
    stream_threshold: u64,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsStore {
            root: root.into(),
            stream_threshold: DEFAULT_STREAM_THRESHOLD,
        }
    }

    /// Stream bodies larger than `threshold` bytes instead of buffering them
    pub fn with_stream_threshold(mut self, threshold: u64) -> Self {
        self.stream_threshold = threshold;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Option<PathBuf> {
        if key.ends_with(SIDECAR_SUFFIX) {
            return None;
        }
        Some(self.root.join(key))
    }

    async fn load_metadata(&self, key: &str, path: &Path) -> Result<Option<ObjectMetadata>> {
        let file_meta = match fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MediaError::upstream(format!("stat {}: {}", path.display(), e))),
        };
        Ok(Some(describe(key, path, &file_meta).await))
    }

    /// Read `len` bytes from the current position of `file`
    async fn read_body(&self, file: fs::File, len: u64, path: &Path) -> Result<MediaBody> {
        let mut reader = file.take(len);

        if len > self.stream_threshold {
            debug!("FsStore streaming {} bytes from {}", len, path.display());
            let stream = ReaderStream::new(reader).boxed();
            return Ok(MediaBody::Stream { stream, len });
        }

        let mut buf = Vec::with_capacity(len as usize);
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| MediaError::upstream(format!("read {}: {}", path.display(), e)))?;
        if buf.len() as u64 != len {
            return Err(MediaError::upstream(format!(
                "{} shrank while reading: expected {} bytes, got {}",
                path.display(),
                len,
                buf.len()
            )));
        }
        Ok(MediaBody::Bytes(Bytes::from(buf)))
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn get(&self, key: &str, options: &GetOptions) -> Result<Option<StoredObject>> {
        let Some(path) = self.object_path(key) else {
            return Ok(None);
        };

        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MediaError::upstream(format!("open {}: {}", path.display(), e))),
        };
        let file_meta = file
            .metadata()
            .await
            .map_err(|e| MediaError::upstream(format!("stat {}: {}", path.display(), e)))?;
        if !file_meta.is_file() {
            return Ok(None);
        }
        let metadata = describe(key, &path, &file_meta).await;

        if !options.conditionals.should_send_body(&metadata) {
            return Ok(Some(StoredObject::without_body(metadata)));
        }

        let Some(spec) = options.range else {
            let body = self.read_body(file, metadata.size, &path).await?;
            return Ok(Some(StoredObject::full(metadata, body)));
        };

        let range = spec.resolve(metadata.size)?;
        debug!(
            "FsStore ranged read: key={}, range={}-{}",
            key, range.start, range.end
        );

        file.seek(SeekFrom::Start(range.start))
            .await
            .map_err(|e| MediaError::upstream(format!("seek {}: {}", path.display(), e)))?;
        let body = self.read_body(file, range.size(), &path).await?;

        Ok(Some(StoredObject {
            metadata,
            body: Some(body),
            range: Some(range),
        }))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        let Some(path) = self.object_path(key) else {
            return Ok(None);
        };
        self.load_metadata(key, &path).await
    }
}

/// Object metadata from a file's stat result and its sidecar
async fn describe(key: &str, path: &Path, file_meta: &std::fs::Metadata) -> ObjectMetadata {
    let uploaded = file_meta.modified().unwrap_or(UNIX_EPOCH);
    let size = file_meta.len();
    let sidecar = read_sidecar(path).await;

    let mut metadata = ObjectMetadata::new(key, size, uploaded);
    metadata.content_type = sidecar
        .content_type
        .or_else(|| guess_content_type(key).map(str::to_string));
    metadata.etag = Some(
        sidecar
            .etag
            .unwrap_or_else(|| file_etag(key, size, uploaded)),
    );
    metadata.custom_metadata = sidecar.custom_metadata;
    metadata
}

/// Missing or unreadable sidecars fall back to defaults
async fn read_sidecar(path: &Path) -> Sidecar {
    let mut sidecar_path = path.as_os_str().to_owned();
    sidecar_path.push(SIDECAR_SUFFIX);

    match fs::read(&sidecar_path).await {
        Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
            warn!("Ignoring malformed sidecar {:?}: {}", sidecar_path, e);
            Sidecar::default()
        }),
        Err(_) => Sidecar::default(),
    }
}

/// ETag derived from key, size and mtime, so HEAD never reads the payload
fn file_etag(key: &str, size: u64, modified: SystemTime) -> String {
    let nanos = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let digest = xxh3_64(format!("{}:{}:{}", key, size, nanos).as_bytes());
    format!("\"{:016x}\"", digest)
}

/// Content type from the file extension
pub fn guess_content_type(key: &str) -> Option<&'static str> {
    let ext = key.rsplit_once('.')?.1.to_ascii_lowercase();
    let content_type = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "application/javascript",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => return None,
    };
    Some(content_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("a/b.JPG"), Some("image/jpeg"));
        assert_eq!(guess_content_type("a/b.txt"), Some("text/plain"));
        assert_eq!(guess_content_type("a/b"), None);
        assert_eq!(guess_content_type("a/b.unknown"), None);
    }

    #[test]
    fn test_sidecar_keys_hidden() {
        let store = FsStore::new("/tmp");
        assert!(store.object_path("a.png.meta.json").is_none());
        assert!(store.object_path("a.png").is_some());
    }

    #[test]
    fn test_file_etag_changes_with_mtime() {
        let a = file_etag("k", 10, UNIX_EPOCH);
        let b = file_etag("k", 10, UNIX_EPOCH + std::time::Duration::from_secs(1));
        assert_ne!(a, b);
        assert!(a.starts_with('"'));
    }

    #[tokio::test]
    async fn test_short_read_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("clip.bin");
        std::fs::write(&path, b"12345").unwrap();
        let store = FsStore::new(dir.path());

        let file = fs::File::open(&path).await.unwrap();
        let err = store.read_body(file, 8, &path).await.unwrap_err();
        assert_eq!(err.to_http_status(), 500);

        let file = fs::File::open(&path).await.unwrap();
        let body = store.read_body(file, 5, &path).await.unwrap();
        assert_eq!(body, Bytes::from("12345"));
    }

    #[tokio::test]
    async fn test_size_and_body_from_same_handle() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello world").unwrap();
        let store = FsStore::new(dir.path());

        let object = store.get("a.txt", &GetOptions::default()).await.unwrap().unwrap();
        let body = object.body.unwrap();
        assert_eq!(object.metadata.size, 11);
        assert_eq!(body.len(), object.metadata.size);
        assert_eq!(body, Bytes::from("hello world"));
    }
}
