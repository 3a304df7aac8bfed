//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Method, Request};
use serde_json::Value;
use tokio::io::DuplexStream;

use socket_router::config::AppConfig;
use socket_router::context;
use socket_router::sockets::Connection;
use socket_router::{HandlerError, HandlerRequest, Values};

/// What a recording handler saw on one invocation.
#[derive(Debug, Clone)]
pub struct Seen {
    pub endpoint: String,
    pub values: Values,
    pub had_socket: bool,
    pub context_endpoint: Option<String>,
    pub app_context: bool,
}

/// Collects invocations of recording handlers.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    /// A handler that records its invocation and answers `body`.
    pub fn handler(
        &self,
        body: &'static str,
    ) -> impl Fn(HandlerRequest) -> futures_util::future::BoxFuture<'static, Result<&'static str, HandlerError>>
           + Send
           + Sync
           + 'static {
        let seen = Arc::clone(&self.seen);
        move |req: HandlerRequest| {
            let seen = Arc::clone(&seen);
            Box::pin(async move {
                let current = context::current_request();
                seen.lock().unwrap().push(Seen {
                    endpoint: req.endpoint.clone(),
                    values: req.values.clone(),
                    had_socket: req.is_socket(),
                    context_endpoint: current.map(|c| c.endpoint().to_string()),
                    app_context: context::current_app().is_some(),
                });
                Ok(body)
            })
        }
    }
}

pub fn config_with_server_name(server_name: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.server.server_name = Some(server_name.to_string());
    config
}

pub fn plain_request(method: Method, path: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header(header::HOST, "chat.local")
        .body(Body::empty())
        .unwrap()
}

/// An upgrade request without a connection attached.
pub fn upgrade_request(path: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .header(header::HOST, "chat.local")
        .header(header::UPGRADE, "WebSocket")
        .header(header::CONNECTION, "Upgrade")
        .body(Body::empty())
        .unwrap()
}

/// An upgrade request carrying an in-memory connection; returns the peer end.
pub fn upgrade_with_connection(path: &str) -> (Request<Body>, DuplexStream) {
    let (server, client) = tokio::io::duplex(4096);
    let mut request = upgrade_request(path);
    request.extensions_mut().insert(Connection::new(server));
    (request, client)
}

pub fn string_value(values: &Values, key: &str) -> Option<String> {
    match values.get(key)? {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
