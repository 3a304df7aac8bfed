//! Handler contract shared by plain and socket routes.

use std::future::Future;

use axum::body::Body;
use axum::http::{request::Parts, HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use crate::routing::{RouteMatch, RoutingError, Values};
use crate::sockets::{Connection, SOCKET_PARAM};

/// Errors a handler can return.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection stream was already taken")]
    ConnectionTaken,

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("{0}")]
    Message(String),
}

impl HandlerError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

pub type HandlerResult = Result<Response, HandlerError>;

/// Everything a handler is invoked with.
#[derive(Debug)]
pub struct HandlerRequest {
    pub endpoint: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Rule defaults overlaid with the captured path variables.
    pub values: Values,
    /// The upgraded connection when dispatched as a socket, else `None`.
    pub ws: Option<Connection>,
    pub body: Body,
}

impl HandlerRequest {
    /// The reserved `ws` value is carried by the `ws` field, never in `values`.
    pub(crate) fn new(parts: Parts, body: Body, matched: RouteMatch, ws: Option<Connection>) -> Self {
        let mut values = matched.values;
        values.remove(SOCKET_PARAM);
        Self {
            endpoint: matched.endpoint,
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            values,
            ws,
            body,
        }
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// A path value rendered as text; numbers are formatted.
    pub fn param_str(&self, name: &str) -> Option<String> {
        match self.values.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn is_socket(&self) -> bool {
        self.ws.is_some()
    }

    pub fn take_socket(&mut self) -> Option<Connection> {
        self.ws.take()
    }
}

/// An endpoint's callable.
///
/// Implemented for any `Fn(HandlerRequest) -> impl Future<Output =
/// Result<impl IntoResponse, HandlerError>>`, so plain `async fn`s work.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: HandlerRequest) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(HandlerRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    R: IntoResponse,
{
    fn call(&self, request: HandlerRequest) -> BoxFuture<'static, HandlerResult> {
        let fut = (self)(request);
        Box::pin(async move { fut.await.map(IntoResponse::into_response) })
    }
}
