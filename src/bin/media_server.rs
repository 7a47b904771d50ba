//! Media server binary
//!
//! Usage:
//!   media-server [config.yaml]
//!
//! Without a config file the defaults from `MediaConfig` apply, with
//! `MEDIA_STORE_ROOT` overriding the store directory when set.
//!
//! Then test with curl:
//!   curl -i http://localhost:8080/media/products/sofa.jpg
//!   curl -i -H 'Range: bytes=0-99' http://localhost:8080/media/products/sofa.jpg
//!   curl -I http://localhost:8080/media/products/sofa.jpg

use anyhow::Context;
use media_delivery::{
    DeliveryMetrics, EdgeCache, FsStore, MediaConfig, MediaHandler, MediaServer, MemoryEdgeCache,
    MetricsEndpoint,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

fn load_config() -> anyhow::Result<MediaConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            MediaConfig::from_file(&path).with_context(|| format!("loading {}", path))
        }
        None => {
            let mut config = MediaConfig::default();
            if let Ok(root) = std::env::var("MEDIA_STORE_ROOT") {
                config.store_root = root;
            }
            config.validate()?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = load_config()?;
    info!("Serving objects from {}", config.store_root);

    let store = Arc::new(
        FsStore::new(&config.store_root).with_stream_threshold(config.stream_threshold_bytes),
    );
    let cache: Option<Arc<dyn EdgeCache>> = if config.enable_cache {
        info!(
            "Edge cache enabled: ttl={}s, max_size={} bytes",
            config.cache_ttl, config.cache_max_size_bytes
        );
        Some(Arc::new(MemoryEdgeCache::with_max_size(
            config.cache_ttl_duration(),
            config.cache_max_size_bytes,
        )))
    } else {
        info!("Edge cache disabled");
        None
    };

    let metrics = Arc::new(DeliveryMetrics::new());
    let handler = MediaHandler::from_config(&config, store, cache)?.with_metrics(metrics.clone());

    if let Some(endpoint) = config.metrics_endpoint.as_ref().filter(|e| e.enabled) {
        let addr: SocketAddr = endpoint.address.parse()?;
        let metrics_endpoint = MetricsEndpoint::new(metrics, addr);
        tokio::spawn(async move {
            if let Err(e) = metrics_endpoint.start().await {
                error!("Metrics endpoint stopped: {}", e);
            }
        });
    }

    let addr = config.listen_addr()?;
    MediaServer::new(Arc::new(handler)).start(addr).await?;
    Ok(())
}
