//! The host application's request pipeline.
//!
//! # Responsibilities
//! - Bind the plain table to each request and match it
//! - Map routing failures to 404 / 405
//! - Invoke the handler inside scoped contexts, without a connection
//! - Map handler errors to 500

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, request::Parts, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use tower::Service;

use super::handler::HandlerRequest;
use super::registry::HandlerRegistry;
use crate::config::AppConfig;
use crate::context::{self, AppContext, RequestContext};
use crate::routing::{MapUrlAdapters, RouteMap, RoutingError, UrlAdapter, UrlAdapterFactory};

/// Frozen application state, cheap to clone.
#[derive(Clone)]
pub struct AppCore {
    config: Arc<AppConfig>,
    url_map: Arc<RouteMap>,
    view_functions: Arc<HandlerRegistry>,
    url_adapters: Arc<dyn UrlAdapterFactory>,
}

impl AppCore {
    pub fn new(config: Arc<AppConfig>, url_map: Arc<RouteMap>, view_functions: Arc<HandlerRegistry>) -> Self {
        let url_adapters = Arc::new(MapUrlAdapters::new(Arc::clone(&url_map), Arc::clone(&config)));
        Self {
            config,
            url_map,
            view_functions,
            url_adapters,
        }
    }

    /// Replace how url adapters are created for requests and the app.
    pub fn with_url_adapters(mut self, url_adapters: Arc<dyn UrlAdapterFactory>) -> Self {
        self.url_adapters = url_adapters;
        self
    }

    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    pub fn url_map(&self) -> &Arc<RouteMap> {
        &self.url_map
    }

    pub fn view_functions(&self) -> &HandlerRegistry {
        &self.view_functions
    }

    pub fn create_url_adapter(&self, request: Option<&Parts>) -> Option<Arc<dyn UrlAdapter>> {
        self.url_adapters.create_url_adapter(request)
    }

    pub fn app_context(&self) -> AppContext {
        AppContext::new(Arc::clone(&self.config), Arc::clone(&self.url_adapters))
    }

    /// Handle one request end to end.
    pub async fn handle_request(&self, request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();

        let Some(adapter) = self.create_url_adapter(Some(&parts)) else {
            tracing::error!(path = %parts.uri.path(), "No url adapter for request");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };

        let matched = match adapter.match_path(parts.uri.path(), Some(&parts.method)) {
            Ok(matched) => matched,
            Err(err) => return routing_error_response(err),
        };

        let Some(handler) = self.view_functions.get(&matched.endpoint) else {
            tracing::error!(endpoint = %matched.endpoint, "Route has no registered handler");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };

        let endpoint = matched.endpoint.clone();
        let request_context = RequestContext::new(&parts, endpoint.clone(), Some(adapter));
        let handler_request = HandlerRequest::new(parts, body, matched, None);

        match context::scoped(self.app_context(), request_context, handler.call(handler_request)).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(endpoint = %endpoint, error = %err, "Handler failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

fn routing_error_response(err: RoutingError) -> Response {
    match err {
        RoutingError::NoMatch { path } => {
            tracing::debug!(path = %path, "No route matched");
            (StatusCode::NOT_FOUND, "Not Found").into_response()
        }
        RoutingError::MethodNotAllowed { path, method, allowed } => {
            tracing::debug!(path = %path, method = %method, "Method not allowed");
            let allow = allowed
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let mut response = (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response();
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(header::ALLOW, value);
            }
            response
        }
        other => {
            tracing::error!(error = %other, "Routing failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Tower entry point for the host application.
#[derive(Clone)]
pub struct AppService {
    core: AppCore,
}

impl AppService {
    pub fn new(core: AppCore) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &AppCore {
        &self.core
    }
}

impl Service<Request<Body>> for AppService {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let core = self.core.clone();
        Box::pin(async move { Ok(core.handle_request(request).await) })
    }
}
