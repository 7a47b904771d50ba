//! In-memory object store

use super::{content_etag, GetOptions, ObjectStore};
use crate::error::{MediaError, Result};
use crate::models::{ObjectMetadata, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::SystemTime;
use tracing::debug;

#[derive(Clone)]
struct MemoryObject {
    metadata: ObjectMetadata,
    data: Bytes,
}

/// Object store backed by a `HashMap`
///
/// Counts `get` and `head` calls so callers can observe how often the
/// store was actually reached.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, MemoryObject>>,
    get_calls: AtomicU64,
    head_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object, deriving size, ETag and upload time
    pub fn put(&self, key: &str, content_type: Option<&str>, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        let mut metadata = ObjectMetadata::new(key, data.len() as u64, SystemTime::now())
            .with_etag(content_etag(&data));
        metadata.content_type = content_type.map(str::to_string);
        self.insert(metadata, data)
    }

    /// Insert an object with caller-provided metadata
    ///
    /// `metadata.size` is overwritten with the payload length.
    pub fn insert(&self, mut metadata: ObjectMetadata, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        metadata.size = data.len() as u64;
        let mut objects = self
            .objects
            .write()
            .map_err(|e| MediaError::upstream(format!("store lock poisoned: {}", e)))?;
        debug!("MemoryStore insert: key={}, size={}", metadata.key, metadata.size);
        objects.insert(metadata.key.clone(), MemoryObject { metadata, data });
        Ok(())
    }

    /// Number of `get` calls served so far
    pub fn get_calls(&self) -> u64 {
        self.get_calls.load(Ordering::Relaxed)
    }

    /// Number of `head` calls served so far
    pub fn head_calls(&self) -> u64 {
        self.head_calls.load(Ordering::Relaxed)
    }

    fn lookup(&self, key: &str) -> Result<Option<MemoryObject>> {
        let objects = self
            .objects
            .read()
            .map_err(|e| MediaError::upstream(format!("store lock poisoned: {}", e)))?;
        Ok(objects.get(key).cloned())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str, options: &GetOptions) -> Result<Option<StoredObject>> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);

        let Some(object) = self.lookup(key)? else {
            return Ok(None);
        };

        if !options.conditionals.should_send_body(&object.metadata) {
            return Ok(Some(StoredObject::without_body(object.metadata)));
        }

        match options.range {
            Some(spec) => {
                let range = spec.resolve(object.metadata.size)?;
                // Bounds were clamped to the payload length by resolve
                let body = object
                    .data
                    .slice(range.start as usize..=range.end as usize);
                Ok(Some(StoredObject {
                    metadata: object.metadata,
                    body: Some(body.into()),
                    range: Some(range),
                }))
            }
            None => Ok(Some(StoredObject::full(object.metadata, object.data))),
        }
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        self.head_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.lookup(key)?.map(|object| object.metadata))
    }
}
