//! Request dispatch between the host pipeline and socket handlers.
//!
//! # Responsibilities
//! - Detect upgrade requests (`Upgrade: websocket`, any case)
//! - Pass everything else to the host service untouched
//! - Match upgrade requests against the socket table only
//! - Run the socket handler with its connection inside scoped contexts
//! - Answer with an empty response once the handler returns
//!
//! # Design Decisions
//! - `NoMatch` on an upgrade request is returned, never retried on the host
//! - Handler errors surface as `DispatchError`; the transport decides the
//!   policy (log, close, status code)

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::{BoxFuture, Either, MapErr};
use futures_util::TryFutureExt;
use thiserror::Error;
use tower::{Layer, Service};
use tracing::Instrument;

use super::connection::{Connection, ConnectionId};
use crate::app::{HandlerError, HandlerRegistry, HandlerRequest};
use crate::context::{self, AppContext, RequestContext};
use crate::observability::metrics;
use crate::routing::{MapUrlAdapters, RoutingError, UrlAdapter};

/// True when the request asks for a websocket upgrade.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("websocket"))
}

/// Errors from dispatching an upgrade request.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("no socket handler registered for endpoint {0}")]
    MissingHandler(String),

    #[error("upgrade request carries no connection")]
    MissingConnection,

    #[error("socket handler {endpoint} failed: {source}")]
    Handler {
        endpoint: String,
        #[source]
        source: HandlerError,
    },
}

impl DispatchError {
    /// Status code for transports that can still answer over HTTP.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Routing(RoutingError::NoMatch { .. }) => StatusCode::NOT_FOUND,
            Self::Routing(RoutingError::MethodNotAllowed { .. }) => StatusCode::METHOD_NOT_ALLOWED,
            Self::MissingConnection => StatusCode::BAD_REQUEST,
            Self::Routing(_) | Self::MissingHandler(_) | Self::Handler { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = status.canonical_reason().unwrap_or("Error");
        (status, message).into_response()
    }
}

/// Marks the empty response returned after a socket handler finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHandedOff(pub ConnectionId);

/// The frozen socket table and its handlers.
#[derive(Debug)]
pub struct SocketTables {
    adapters: MapUrlAdapters,
    view_functions: Arc<HandlerRegistry>,
}

impl SocketTables {
    pub fn new(adapters: MapUrlAdapters, view_functions: Arc<HandlerRegistry>) -> Self {
        Self {
            adapters,
            view_functions,
        }
    }

    pub fn view_functions(&self) -> &HandlerRegistry {
        &self.view_functions
    }
}

/// Tower layer installing [`SocketDispatch`] in front of a host service.
#[derive(Clone)]
pub struct SocketDispatchLayer {
    tables: Arc<SocketTables>,
    app: AppContext,
}

impl SocketDispatchLayer {
    pub fn new(tables: SocketTables, app: AppContext) -> Self {
        Self {
            tables: Arc::new(tables),
            app,
        }
    }
}

impl<S> Layer<S> for SocketDispatchLayer {
    type Service = SocketDispatch<S>;

    fn layer(&self, host: S) -> Self::Service {
        SocketDispatch {
            host,
            tables: Arc::clone(&self.tables),
            app: self.app.clone(),
        }
    }
}

/// Routes upgrade requests to socket handlers and the rest to `host`.
#[derive(Clone)]
pub struct SocketDispatch<S> {
    host: S,
    tables: Arc<SocketTables>,
    app: AppContext,
}

impl<S> SocketDispatch<S> {
    pub fn host(&self) -> &S {
        &self.host
    }
}

type PassThrough<F> = MapErr<F, fn(Infallible) -> DispatchError>;

fn unreachable_error(never: Infallible) -> DispatchError {
    match never {}
}

impl<S> Service<Request<Body>> for SocketDispatch<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible>,
{
    type Response = Response;
    type Error = DispatchError;
    type Future = Either<PassThrough<S::Future>, BoxFuture<'static, Result<Response, DispatchError>>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.host.poll_ready(cx).map_err(unreachable_error)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        if !is_upgrade_request(request.headers()) {
            metrics::record_dispatch("pass_through");
            return Either::Left(
                self.host
                    .call(request)
                    .map_err(unreachable_error as fn(Infallible) -> DispatchError),
            );
        }

        metrics::record_dispatch("socket");
        let tables = Arc::clone(&self.tables);
        let app = self.app.clone();
        Either::Right(Box::pin(dispatch_socket(tables, app, request)))
    }
}

async fn dispatch_socket(
    tables: Arc<SocketTables>,
    app: AppContext,
    request: Request<Body>,
) -> Result<Response, DispatchError> {
    let (mut parts, body) = request.into_parts();

    let path = parts.uri.path().to_string();
    let matched = tables
        .adapters
        .bind(Some(&parts))
        .ok_or(RoutingError::NoUrlAdapter)?
        .match_path(&path, None)
        .inspect_err(|err| tracing::warn!(path = %path, error = %err, "Upgrade request matched no socket route"))?;

    let handler = tables
        .view_functions
        .get(&matched.endpoint)
        .ok_or_else(|| DispatchError::MissingHandler(matched.endpoint.clone()))?;

    let connection = parts
        .extensions
        .remove::<Connection>()
        .ok_or(DispatchError::MissingConnection)?;
    let connection_id = connection.id();
    let endpoint = matched.endpoint.clone();

    let request_context = RequestContext::new(&parts, endpoint.as_str(), app.bind_request(&parts));
    let handler_request = HandlerRequest::new(parts, body, matched, Some(connection));

    let span = tracing::info_span!(
        "socket_dispatch",
        endpoint = %endpoint,
        connection_id = %connection_id,
        path = %path,
    );

    let started = Instant::now();
    let result = async {
        tracing::debug!("Socket handler started");
        context::scoped(app, request_context, handler.call(handler_request)).await
    }
    .instrument(span)
    .await;

    match result {
        Ok(_) => {
            metrics::record_socket_session("completed", started);
            tracing::debug!(
                endpoint = %endpoint,
                connection_id = %connection_id,
                "Socket handler returned"
            );
            let mut response = Response::new(Body::empty());
            response
                .extensions_mut()
                .insert(ConnectionHandedOff(connection_id));
            Ok(response)
        }
        Err(source) => {
            metrics::record_socket_session("failed", started);
            Err(DispatchError::Handler { endpoint, source })
        }
    }
}
