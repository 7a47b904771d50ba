//! Metrics HTTP Endpoint
//!
//! Exposes delivery metrics in Prometheus text format on a separate port,
//! alongside a trivial health check.

use crate::metrics::{DeliveryMetrics, MetricsSnapshot};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics endpoint server
pub struct MetricsEndpoint {
    metrics: Arc<DeliveryMetrics>,
    addr: SocketAddr,
}

impl MetricsEndpoint {
    /// Create a new metrics endpoint
    ///
    /// # Example
    /// ```no_run
    /// use media_delivery::metrics::DeliveryMetrics;
    /// use media_delivery::metrics_endpoint::MetricsEndpoint;
    /// use std::sync::Arc;
    ///
    /// let metrics = Arc::new(DeliveryMetrics::new());
    /// let endpoint = MetricsEndpoint::new(metrics, "127.0.0.1:9090".parse().unwrap());
    /// ```
    pub fn new(metrics: Arc<DeliveryMetrics>, addr: SocketAddr) -> Self {
        Self { metrics, addr }
    }

    /// Start the metrics endpoint server
    ///
    /// Runs until the process is terminated or the listener fails.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Metrics endpoint listening on http://{}", self.addr);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let metrics = Arc::clone(&self.metrics);

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let metrics = Arc::clone(&metrics);
                    async move { handle_request(req, metrics).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving metrics connection: {:?}", err);
                }
            });
        }
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<DeliveryMetrics>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let (status, content_type, body) = match req.uri().path() {
        "/metrics" => (
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&metrics.get_stats()),
        ),
        "/health" => (
            StatusCode::OK,
            "application/json",
            r#"{"status":"healthy"}"#.to_string(),
        ),
        _ => (StatusCode::NOT_FOUND, "text/plain", "404 Not Found".to_string()),
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(content_type),
    );
    Ok(response)
}

fn metric(output: &mut String, name: &str, kind: &str, help: &str, value: impl std::fmt::Display) {
    let _ = writeln!(output, "# HELP {} {}", name, help);
    let _ = writeln!(output, "# TYPE {} {}", name, kind);
    let _ = writeln!(output, "{} {}", name, value);
    output.push('\n');
}

/// Format metrics in Prometheus exposition format
pub fn format_prometheus_metrics(snapshot: &MetricsSnapshot) -> String {
    let mut output = String::new();

    metric(&mut output, "media_requests_total", "counter",
        "Total number of requests processed", snapshot.total_requests);
    metric(&mut output, "media_get_requests_total", "counter",
        "Number of GET requests", snapshot.get_requests);
    metric(&mut output, "media_head_requests_total", "counter",
        "Number of HEAD requests", snapshot.head_requests);

    let _ = writeln!(output, "# HELP media_responses_total Responses sent by status code");
    let _ = writeln!(output, "# TYPE media_responses_total counter");
    for (code, value) in [
        ("200", snapshot.responses_ok),
        ("206", snapshot.responses_partial),
        ("304", snapshot.responses_not_modified),
        ("400", snapshot.responses_bad_request),
        ("403", snapshot.responses_forbidden),
        ("404", snapshot.responses_not_found),
        ("416", snapshot.responses_range_not_satisfiable),
        ("5xx", snapshot.responses_server_error),
    ] {
        let _ = writeln!(output, "media_responses_total{{status=\"{}\"}} {}", code, value);
    }
    output.push('\n');

    metric(&mut output, "media_cache_hits_total", "counter",
        "Number of edge cache hits", snapshot.cache_hits);
    metric(&mut output, "media_cache_misses_total", "counter",
        "Number of edge cache misses", snapshot.cache_misses);
    metric(&mut output, "media_cache_errors_total", "counter",
        "Number of edge cache errors", snapshot.cache_errors);
    metric(&mut output, "media_cache_hit_rate", "gauge",
        "Cache hit rate percentage", format!("{:.2}", snapshot.cache_hit_rate()));

    metric(&mut output, "media_store_fetches_total", "counter",
        "Number of object store reads", snapshot.store_fetches);
    metric(&mut output, "media_bytes_to_client_total", "counter",
        "Total body bytes sent to clients", snapshot.bytes_to_client);
    metric(&mut output, "media_request_duration_ms_avg", "gauge",
        "Average request duration in milliseconds",
        format!("{:.2}", snapshot.avg_request_duration_ms()));

    output
}
