//! HTTP server for the media route
//!
//! Accepts HTTP/1 connections and hands each request to a shared
//! [`MediaHandler`]. Upstream failures surface as a generic `500`.

use crate::handler::MediaHandler;
use crate::response::{HttpBody, MediaResponse};
use http::{Request, Response, StatusCode};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Media server
pub struct MediaServer {
    handler: Arc<MediaHandler>,
}

impl MediaServer {
    pub fn new(handler: Arc<MediaHandler>) -> Self {
        Self { handler }
    }

    /// Bind `addr` and serve until the listener fails
    pub async fn start(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        info!(
            "Media server listening on http://{}{}",
            listener.local_addr()?,
            self.handler.route_prefix()
        );

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let handler = Arc::clone(&self.handler);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let handler = Arc::clone(&handler);
                    async move { handle_request(handler, req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Connection error from {}: {}", peer_addr, err);
                }
            });
        }
    }
}

/// Handle incoming HTTP requests
async fn handle_request(
    handler: Arc<MediaHandler>,
    req: Request<hyper::body::Incoming>,
) -> Result<Response<HttpBody>, std::convert::Infallible> {
    // Request bodies are never read
    let (parts, _body) = req.into_parts();
    let req = Request::from_parts(parts, ());

    debug!("{} {}", req.method(), req.uri());

    let response = match handler.handle(&req).await {
        Ok(response) => response,
        Err(e) => {
            error!("{} {} failed: {}", req.method(), req.uri(), e);
            MediaResponse::status_only(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    };

    Ok(response.into_http())
}
