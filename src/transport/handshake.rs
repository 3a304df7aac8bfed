//! Websocket handshake and session hand-off.
//!
//! # Responsibilities
//! - Validate upgrade requests and answer `101 Switching Protocols`
//! - Await the hyper upgrade in a spawned task, one per session
//! - Hand the ready [`Connection`] to the dispatcher in request extensions
//! - Apply the error policy: plain requests get a status code, failed
//!   sessions are logged and closed
//!
//! # Design Decisions
//! - The upgraded stream only exists after the 101 has been sent, so the
//!   dispatcher runs in the session task; routing failures there close the
//!   connection instead of producing an HTTP error

use std::convert::Infallible;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tower::{Service, ServiceExt};

use super::tracker::SessionTracker;
use crate::sockets::{is_upgrade_request, Connection, DispatchError};

/// Reasons an upgrade request is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("websocket upgrade requires GET, got {0}")]
    Method(Method),

    #[error("missing `Connection: upgrade` header")]
    ConnectionHeader,

    #[error("unsupported websocket version, expected 13")]
    Version,

    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
}

/// Check an upgrade request and derive its `Sec-WebSocket-Accept` value.
pub fn validate_handshake(method: &Method, headers: &HeaderMap) -> Result<String, HandshakeError> {
    if method != Method::GET {
        return Err(HandshakeError::Method(method.clone()));
    }

    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    if !connection_upgrade {
        return Err(HandshakeError::ConnectionHeader);
    }

    let version = headers
        .get(header::SEC_WEBSOCKET_VERSION)
        .and_then(|value| value.to_str().ok());
    if version.map(str::trim) != Some("13") {
        return Err(HandshakeError::Version);
    }

    let key = headers
        .get(header::SEC_WEBSOCKET_KEY)
        .ok_or(HandshakeError::MissingKey)?;
    Ok(derive_accept_key(key.as_bytes()))
}

fn switching_protocols(accept: &str) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    if let Ok(accept) = HeaderValue::from_str(accept) {
        headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    }
    response
}

/// Transport service in front of the socket dispatcher.
#[derive(Clone)]
pub struct WebSocketTransport<S> {
    inner: S,
    sessions: SessionTracker,
}

impl<S> WebSocketTransport<S> {
    pub fn new(inner: S, sessions: SessionTracker) -> Self {
        Self { inner, sessions }
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }
}

impl<S> Service<Request<Body>> for WebSocketTransport<S>
where
    S: Service<Request<Body>, Response = Response, Error = DispatchError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness is awaited per request on a clone of `inner`.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let inner = self.inner.clone();

        if !is_upgrade_request(request.headers()) {
            return Box::pin(async move {
                Ok(match inner.oneshot(request).await {
                    Ok(response) => response,
                    Err(err) => {
                        tracing::error!(error = %err, "Request dispatch failed");
                        err.into_response()
                    }
                })
            });
        }

        let accept = match validate_handshake(request.method(), request.headers()) {
            Ok(accept) => accept,
            Err(err) => {
                tracing::warn!(path = %request.uri().path(), error = %err, "Rejected websocket handshake");
                return Box::pin(async move { Ok((StatusCode::BAD_REQUEST, err.to_string()).into_response()) });
            }
        };

        let Some(on_upgrade) = request.extensions_mut().remove::<OnUpgrade>() else {
            tracing::warn!(path = %request.uri().path(), "Connection is not upgradable");
            return Box::pin(async move { Ok(StatusCode::UPGRADE_REQUIRED.into_response()) });
        };

        let guard = self.sessions.track();
        tokio::spawn(async move {
            let _guard = guard;
            let path = request.uri().path().to_string();

            let upgraded = match on_upgrade.await {
                Ok(upgraded) => upgraded,
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "Websocket upgrade failed");
                    return;
                }
            };

            let connection = Connection::new(TokioIo::new(upgraded));
            let connection_id = connection.id();
            request.extensions_mut().insert(connection);
            tracing::debug!(path = %path, connection_id = %connection_id, "Websocket session opened");

            match inner.oneshot(request).await {
                Ok(_) => {
                    tracing::info!(path = %path, connection_id = %connection_id, "Websocket session closed");
                }
                Err(DispatchError::Routing(err)) => {
                    tracing::warn!(path = %path, connection_id = %connection_id, error = %err, "Closing unroutable websocket session");
                }
                Err(err) => {
                    tracing::error!(path = %path, connection_id = %connection_id, error = %err, "Websocket session failed");
                }
            }
        });

        Box::pin(async move { Ok(switching_protocols(&accept)) })
    }
}
