//! HTTP server setup.
//!
//! # Responsibilities
//! - Wire up middleware (request ID, tracing)
//! - Bind the transport to the listener
//! - Stop accepting on shutdown, then drain open socket sessions

use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::ServiceExt;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::{Service, ServiceBuilder};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::handshake::WebSocketTransport;
use super::tracker::SessionTracker;
use crate::config::ServerConfig;
use crate::sockets::DispatchError;

/// Serves a socket dispatcher over HTTP/1.1.
pub struct SocketServer<S> {
    service: S,
    grace: Duration,
    sessions: SessionTracker,
}

impl<S> SocketServer<S>
where
    S: Service<Request<Body>, Response = Response, Error = DispatchError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    pub fn new(service: S, config: &ServerConfig) -> Self {
        Self {
            service,
            grace: Duration::from_secs(config.shutdown_grace_secs),
            sessions: SessionTracker::new(),
        }
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Run until `shutdown` fires, accepting connections on `listener`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Socket server starting");

        let transport = WebSocketTransport::new(self.service, self.sessions.clone());
        let service = ServiceBuilder::new()
            .map_response(|response: Response<_>| response.map(Body::new))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .service(transport);

        let make_service = ServiceExt::<Request<Body>>::into_make_service(service);
        axum::serve(listener, make_service)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, no longer accepting connections");
            })
            .await?;

        let open = self.sessions.active_count();
        if open > 0 {
            tracing::info!(sessions = open, grace_secs = self.grace.as_secs(), "Draining socket sessions");
            if !self.sessions.wait_idle(self.grace).await {
                tracing::warn!(
                    sessions = self.sessions.active_count(),
                    "Grace period elapsed with socket sessions still open"
                );
            }
        }

        tracing::info!("Socket server stopped");
        Ok(())
    }
}
