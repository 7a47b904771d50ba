//! GET and HEAD handling for media objects
//!
//! Supported requests:
//! - `GET {prefix}{key}` - stream the object, honoring `Range` and
//!   conditional headers, consulting the edge cache for unranged requests
//! - `HEAD {prefix}{key}` - headers only, never cached
//!
//! Key sanitization and the access policy run before any store access, so
//! a protected object's existence is never revealed.

use crate::cache::{CacheKey, EdgeCache};
use crate::conditional::Conditionals;
use crate::config::MediaConfig;
use crate::error::{MediaError, Result};
use crate::key::ObjectKey;
use crate::metrics::DeliveryMetrics;
use crate::policy::{AccessDecision, AccessPolicy};
use crate::range::range_from_headers;
use crate::response::{MediaResponse, ResponseBuilder};
use crate::store::{GetOptions, ObjectStore};
use http::{HeaderMap, Method, Request, StatusCode, Uri};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Media delivery handler
pub struct MediaHandler {
    store: Arc<dyn ObjectStore>,
    cache: Option<Arc<dyn EdgeCache>>,
    policy: AccessPolicy,
    builder: ResponseBuilder,
    vary_headers: Vec<String>,
    route_prefix: String,
    metrics: Arc<DeliveryMetrics>,
}

impl MediaHandler {
    /// Create a handler with default policy and no edge cache
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            cache: None,
            policy: AccessPolicy::default(),
            builder: ResponseBuilder::default(),
            vary_headers: vec!["accept".to_string()],
            route_prefix: "/media/".to_string(),
            metrics: Arc::new(DeliveryMetrics::new()),
        }
    }

    /// Create a handler from configuration
    ///
    /// `cache` is ignored when caching is disabled in `config`.
    pub fn from_config(
        config: &MediaConfig,
        store: Arc<dyn ObjectStore>,
        cache: Option<Arc<dyn EdgeCache>>,
    ) -> Result<Self> {
        config.validate()?;
        let builder = ResponseBuilder::new(&config.cache_control)?;
        let cache = if config.enable_cache { cache } else { None };

        Ok(Self {
            store,
            cache,
            policy: AccessPolicy::new(&config.protected_prefixes),
            builder,
            vary_headers: config.cache_vary_headers.clone(),
            route_prefix: config.route_prefix.clone(),
            metrics: Arc::new(DeliveryMetrics::new()),
        })
    }

    /// Enable the edge cache
    pub fn with_cache(mut self, cache: Arc<dyn EdgeCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share a metrics collector, e.g. with the metrics endpoint
    pub fn with_metrics(mut self, metrics: Arc<DeliveryMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<DeliveryMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn route_prefix(&self) -> &str {
        &self.route_prefix
    }

    /// Handle an HTTP request addressed to the media route
    ///
    /// Paths outside the route prefix get `404`, methods other than GET and
    /// HEAD get `405`. Only upstream failures are returned as `Err`.
    pub async fn handle<B>(&self, req: &Request<B>) -> Result<MediaResponse> {
        let start_time = Instant::now();
        let method = req.method();
        self.metrics.record_request(method);

        let result = match req.uri().path().strip_prefix(self.route_prefix.as_str()) {
            None => Ok(MediaResponse::status_only(StatusCode::NOT_FOUND, "Not Found")),
            Some(raw_key) => {
                if method == Method::GET {
                    self.handle_get(raw_key, req.uri(), req.headers()).await
                } else if method == Method::HEAD {
                    self.handle_head(raw_key).await
                } else {
                    let mut response = MediaResponse::status_only(
                        StatusCode::METHOD_NOT_ALLOWED,
                        "Method Not Allowed",
                    );
                    response
                        .headers
                        .insert(http::header::ALLOW, http::HeaderValue::from_static("GET, HEAD"));
                    Ok(response)
                }
            }
        };

        self.metrics.record_request_duration(start_time.elapsed());
        match &result {
            Ok(response) => {
                self.metrics.record_response(response.status);
                if method != Method::HEAD {
                    self.metrics.record_bytes_to_client(response.body.len());
                }
            }
            Err(_) => self.metrics.record_response(StatusCode::INTERNAL_SERVER_ERROR),
        }

        if method == Method::HEAD {
            return result.map(MediaResponse::without_body);
        }
        result
    }

    /// Serve a GET for a raw, still percent-encoded key
    ///
    /// `uri` and `headers` identify the request for the edge cache.
    pub async fn handle_get(
        &self,
        raw_key: &str,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> Result<MediaResponse> {
        let key = match self.authorize(raw_key) {
            Ok(key) => key,
            Err(e) => return Ok(MediaResponse::from_error(&e)),
        };

        let range = match range_from_headers(headers) {
            Ok(range) => range,
            Err(e) => {
                debug!("Invalid range for key={}: {}", key, e);
                return Ok(self.invalid_range_response(&key).await);
            }
        };

        let cache_key = match (&self.cache, range) {
            (Some(_), None) => Some(CacheKey::from_request(uri, headers, &self.vary_headers)),
            _ => None,
        };

        if let (Some(cache), Some(cache_key)) = (&self.cache, &cache_key) {
            match cache.lookup(cache_key).await {
                Ok(Some(response)) => {
                    debug!("Serving key={} from edge cache", key);
                    self.metrics.record_cache_hit();
                    return Ok(response.mark_cache_hit());
                }
                Ok(None) => self.metrics.record_cache_miss(),
                Err(e) => {
                    warn!("Edge cache lookup failed for key={}: {}", key, e);
                    self.metrics.record_cache_error();
                }
            }
        }

        let options = GetOptions::default()
            .with_range(range)
            .with_conditionals(Conditionals::from_headers(headers));

        self.metrics.record_store_fetch();
        let object = match self.store.get(key.as_str(), &options).await {
            Ok(Some(object)) => object,
            Ok(None) => {
                debug!("Object not found: key={}", key);
                return Ok(MediaResponse::from_error(&MediaError::ObjectNotFound(
                    key.into_string(),
                )));
            }
            Err(MediaError::RangeUnsatisfiable { size }) => {
                debug!("Range unsatisfiable for key={}, size={:?}", key, size);
                return Ok(ResponseBuilder::range_not_satisfiable(size));
            }
            Err(e) => {
                error!("Store fetch failed for key={}: {}", key, e);
                return Err(e);
            }
        };

        let response = self.builder.build(object)?;

        if let (Some(cache), Some(cache_key)) = (&self.cache, &cache_key) {
            if response.status == StatusCode::OK {
                // Streamed bodies are too large to keep
                let copy = response.try_clone();
                match copy {
                    Some(copy) => {
                        if let Err(e) = cache.store(cache_key, copy).await {
                            warn!("Edge cache write failed for key={}: {}", key, e);
                            self.metrics.record_cache_error();
                        }
                    }
                    None => debug!("Not caching streamed response for key={}", key),
                }
            }
        }

        Ok(response)
    }

    /// Serve a HEAD for a raw, still percent-encoded key
    pub async fn handle_head(&self, raw_key: &str) -> Result<MediaResponse> {
        let key = match self.authorize(raw_key) {
            Ok(key) => key,
            Err(e) => return Ok(MediaResponse::from_error(&e).without_body()),
        };

        match self.store.head(key.as_str()).await {
            Ok(Some(metadata)) => self.builder.build_head(&metadata),
            Ok(None) => Ok(MediaResponse::from_error(&MediaError::ObjectNotFound(
                key.into_string(),
            ))
            .without_body()),
            Err(e) => {
                error!("Store head failed for key={}: {}", key, e);
                Err(e)
            }
        }
    }

    /// Sanitize the key and apply the access policy
    fn authorize(&self, raw_key: &str) -> Result<ObjectKey> {
        let key = ObjectKey::parse(raw_key).map_err(|e| {
            debug!("Rejected key '{}': {}", raw_key, e);
            e
        })?;

        if self.policy.check(&key) == AccessDecision::Denied {
            info!("Denied access to protected key={}", key);
            return Err(MediaError::ProtectedResource(key.into_string()));
        }

        Ok(key)
    }

    /// `416` for a malformed `Range`, reporting the size when it is cheap to learn
    async fn invalid_range_response(&self, key: &ObjectKey) -> MediaResponse {
        let size = match self.store.head(key.as_str()).await {
            Ok(metadata) => metadata.map(|m| m.size),
            Err(e) => {
                warn!("Size lookup for 416 failed, key={}: {}", key, e);
                None
            }
        };
        ResponseBuilder::range_not_satisfiable(size)
    }
}
