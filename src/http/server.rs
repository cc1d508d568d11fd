//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::{router, AppState};
use crate::error::Result;

/// HTTP server for the admission service.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Shared limiter and policy table
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;

        info!(
            addr = %self.addr,
            "Starting HTTP admission service with graceful shutdown"
        );

        let app = router(self.state).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }
}
