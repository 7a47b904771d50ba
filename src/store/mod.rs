//! Object store interface and backends
//!
//! The delivery handler talks to storage only through [`ObjectStore`].
//! Backends resolve ranges natively and evaluate conditional headers
//! themselves, returning a body-less [`StoredObject`] when a precondition
//! says the payload should not be sent.
//!
//! Two backends ship with the crate:
//! - [`MemoryStore`]: in-process map, used by tests and demos
//! - [`FsStore`]: objects are files below a root directory

pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use crate::conditional::Conditionals;
use crate::error::Result;
use crate::models::{ObjectMetadata, StoredObject};
use crate::range::RangeSpec;
use async_trait::async_trait;
use xxhash_rust::xxh3::xxh3_64;

/// Options for a store read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Range to read, resolved by the store against the object size
    pub range: Option<RangeSpec>,
    /// Conditional headers, forwarded verbatim from the client
    pub conditionals: Conditionals,
}

impl GetOptions {
    pub fn with_range(mut self, range: Option<RangeSpec>) -> Self {
        self.range = range;
        self
    }

    pub fn with_conditionals(mut self, conditionals: Conditionals) -> Self {
        self.conditionals = conditionals;
        self
    }
}

/// Read-only access to a key/blob store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object
    ///
    /// # Returns
    /// * `Ok(None)` if no object exists under `key`
    /// * `Ok(Some(obj))` with `obj.body == None` if a precondition failed
    /// * `Ok(Some(obj))` with the full payload, or the window described by
    ///   `obj.range` when a range was requested
    /// * `Err(MediaError::RangeUnsatisfiable)` if the range cannot be served
    async fn get(&self, key: &str, options: &GetOptions) -> Result<Option<StoredObject>>;

    /// Look up metadata only
    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>>;
}

/// Strong ETag for a blob, derived from its content
pub fn content_etag(data: &[u8]) -> String {
    format!("\"{:016x}\"", xxh3_64(data))
}
