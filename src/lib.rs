//! Media Delivery
//!
//! An HTTP service that streams binary assets (product images, documents)
//! out of a content-addressed object store.
//!
//! # Overview
//!
//! Objects are served from `GET /media/{key}` and `HEAD /media/{key}`. The
//! service implements single byte-range requests (`206 Partial Content`),
//! passes conditional headers through to the store, refuses keys under
//! protected prefixes, and keeps full responses in an edge cache.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use media_delivery::{MediaHandler, MemoryEdgeCache, MemoryStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! store.put("products/sofa.txt", Some("text/plain"), "a very comfy sofa")?;
//!
//! let handler = MediaHandler::new(store)
//!     .with_cache(Arc::new(MemoryEdgeCache::new(Duration::from_secs(3600))));
//!
//! let req = http::Request::get("/media/products/sofa.txt")
//!     .header("range", "bytes=0-5")
//!     .body(())?;
//! let response = handler.handle(&req).await?;
//! assert_eq!(response.status, http::StatusCode::PARTIAL_CONTENT);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`ObjectKey`]: sanitizes the requested key
//! - [`AccessPolicy`]: rejects keys under protected prefixes
//! - [`range`]: parses `Range` headers and resolves them against a size
//! - [`ResponseBuilder`]: turns store objects into responses
//! - [`MediaHandler`]: orchestrates GET and HEAD
//! - [`ObjectStore`]: storage interface, with [`MemoryStore`] and [`FsStore`]
//! - [`EdgeCache`]: full-response cache, with [`MemoryEdgeCache`]
//! - [`DeliveryMetrics`]: runtime counters, exposed by [`MetricsEndpoint`]
//!
//! # Configuration
//!
//! ```yaml
//! listen_address: "0.0.0.0:8080"
//! route_prefix: "/media/"
//! protected_prefixes: ["private"]
//! enable_cache: true
//! cache_ttl: 86400
//! store_root: "/srv/media"
//! ```
//!
//! See [`MediaConfig`] for all options.

pub mod cache;
pub mod conditional;
pub mod config;
pub mod error;
pub mod handler;
pub mod key;
pub mod metrics;
pub mod metrics_endpoint;
pub mod models;
pub mod policy;
pub mod range;
pub mod response;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use cache::{CacheKey, CacheStats, EdgeCache, MemoryEdgeCache};
pub use conditional::Conditionals;
pub use config::{MediaConfig, MetricsEndpointConfig};
pub use error::{MediaError, Result};
pub use handler::MediaHandler;
pub use key::ObjectKey;
pub use metrics::{DeliveryMetrics, MetricsSnapshot};
pub use metrics_endpoint::MetricsEndpoint;
pub use models::{ByteRange, ByteStream, MediaBody, ObjectMetadata, StoredObject};
pub use policy::{AccessDecision, AccessPolicy};
pub use range::{parse_range_header, RangeSpec};
pub use response::{HttpBody, MediaResponse, ResponseBuilder};
pub use server::MediaServer;
pub use store::{FsStore, GetOptions, MemoryStore, ObjectStore};
