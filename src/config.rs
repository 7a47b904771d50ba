//! Configuration management for the media delivery service

use crate::error::{MediaError, Result};
use crate::response::IMMUTABLE_CACHE_CONTROL;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Configuration for the media delivery service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaConfig {
    /// Address the media server listens on (default: 127.0.0.1:8080)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Path prefix under which objects are served (default: /media/)
    /// Must start and end with '/'
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,

    /// Key prefixes that are never served (default: ["private"])
    #[serde(default = "default_protected_prefixes")]
    pub protected_prefixes: Vec<String>,

    /// Cache-Control directive sent with every object response
    #[serde(default = "default_cache_control")]
    pub cache_control: String,

    /// Whether to enable the edge cache (default: true)
    #[serde(default = "default_true")]
    pub enable_cache: bool,

    /// Edge cache TTL in seconds (default: 86400 = 1 day)
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    /// Maximum bytes of response bodies held by the edge cache (default: 64MB)
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size_bytes: usize,

    /// Request headers that become part of the cache key (default: ["accept"])
    #[serde(default = "default_cache_vary_headers")]
    pub cache_vary_headers: Vec<String>,

    /// Root directory of the filesystem object store
    #[serde(default = "default_store_root")]
    pub store_root: String,

    /// Bodies larger than this are streamed from disk instead of read into
    /// memory, and are never cached (default: 8MB)
    #[serde(default = "default_stream_threshold")]
    pub stream_threshold_bytes: u64,

    /// Metrics endpoint configuration (optional)
    #[serde(default)]
    pub metrics_endpoint: Option<MetricsEndpointConfig>,
}

/// Configuration for the metrics HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsEndpointConfig {
    /// Whether to enable the metrics endpoint (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind the metrics endpoint to (default: "127.0.0.1:9090")
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

// Default value functions for serde
fn default_listen_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_route_prefix() -> String {
    "/media/".to_string()
}

fn default_protected_prefixes() -> Vec<String> {
    vec!["private".to_string()]
}

fn default_cache_control() -> String {
    IMMUTABLE_CACHE_CONTROL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    86400 // 1 day
}

fn default_cache_max_size() -> usize {
    64 * 1024 * 1024 // 64MB
}

fn default_cache_vary_headers() -> Vec<String> {
    vec!["accept".to_string()]
}

fn default_store_root() -> String {
    "/var/lib/media-delivery".to_string()
}

fn default_stream_threshold() -> u64 {
    8 * 1024 * 1024 // 8MB
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}

impl Default for MediaConfig {
    fn default() -> Self {
        MediaConfig {
            listen_address: default_listen_address(),
            route_prefix: default_route_prefix(),
            protected_prefixes: default_protected_prefixes(),
            cache_control: default_cache_control(),
            enable_cache: default_true(),
            cache_ttl: default_cache_ttl(),
            cache_max_size_bytes: default_cache_max_size(),
            cache_vary_headers: default_cache_vary_headers(),
            store_root: default_store_root(),
            stream_threshold_bytes: default_stream_threshold(),
            metrics_endpoint: None,
        }
    }
}

impl MediaConfig {
    /// Load configuration from a YAML file
    ///
    /// # Returns
    /// * `Ok(MediaConfig)` if loading and validation succeed
    /// * `Err(MediaError)` if file cannot be read or config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            MediaError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: MediaConfig = serde_yaml::from_str(content).map_err(|e| {
            MediaError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - listen_address must be a socket address
    /// - route_prefix must start and end with '/'
    /// - protected_prefixes entries must not be empty
    /// - cache_control must not be empty
    /// - cache_ttl must be > 0 when caching is enabled
    /// - metrics endpoint address must be a socket address when enabled
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        if !self.route_prefix.starts_with('/') || !self.route_prefix.ends_with('/') {
            return Err(MediaError::ConfigError(format!(
                "route_prefix must start and end with '/', got '{}'",
                self.route_prefix
            )));
        }

        if self
            .protected_prefixes
            .iter()
            .any(|p| p.trim_matches('/').is_empty())
        {
            return Err(MediaError::ConfigError(
                "protected_prefixes must not contain empty entries".to_string(),
            ));
        }

        if self.cache_control.trim().is_empty() {
            return Err(MediaError::ConfigError(
                "cache_control must not be empty".to_string(),
            ));
        }

        if self.enable_cache && self.cache_ttl == 0 {
            return Err(MediaError::ConfigError(
                "cache_ttl must be greater than 0 when caching is enabled".to_string(),
            ));
        }

        if let Some(endpoint) = &self.metrics_endpoint {
            if endpoint.enabled {
                endpoint.address.parse::<SocketAddr>().map_err(|e| {
                    MediaError::ConfigError(format!(
                        "Invalid metrics endpoint address '{}': {}",
                        endpoint.address, e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Parsed listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen_address.parse().map_err(|e| {
            MediaError::ConfigError(format!(
                "Invalid listen_address '{}': {}",
                self.listen_address, e
            ))
        })
    }

    pub fn cache_ttl_duration(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }
}
