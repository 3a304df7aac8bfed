//! Scoped application and request contexts.
//!
//! Handlers do not receive the application explicitly. While a handler
//! runs, the dispatcher (or the host pipeline) installs an [`AppContext`]
//! and a [`RequestContext`] as tokio task-locals; they are dropped when the
//! handler future completes, fails or unwinds.

use std::future::Future;
use std::sync::Arc;

use axum::http::{request::Parts, HeaderMap, Method, Uri};

use crate::config::AppConfig;
use crate::routing::{BuildOptions, RoutingError, UrlAdapter, UrlAdapterFactory, Values};

tokio::task_local! {
    static APP_CONTEXT: AppContext;
    static REQUEST_CONTEXT: RequestContext;
}

/// Application state visible to handlers.
#[derive(Clone)]
pub struct AppContext {
    config: Arc<AppConfig>,
    url_adapters: Arc<dyn UrlAdapterFactory>,
}

impl AppContext {
    pub fn new(config: Arc<AppConfig>, url_adapters: Arc<dyn UrlAdapterFactory>) -> Self {
        Self {
            config,
            url_adapters,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// An adapter bound to the configured server, if one is configured.
    pub fn url_adapter(&self) -> Option<Arc<dyn UrlAdapter>> {
        self.url_adapters.create_url_adapter(None)
    }

    pub fn bind_request(&self, parts: &Parts) -> Option<Arc<dyn UrlAdapter>> {
        self.url_adapters.create_url_adapter(Some(parts))
    }
}

/// The request being handled.
#[derive(Clone)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    endpoint: String,
    url_adapter: Option<Arc<dyn UrlAdapter>>,
}

impl RequestContext {
    pub fn new(parts: &Parts, endpoint: impl Into<String>, url_adapter: Option<Arc<dyn UrlAdapter>>) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            endpoint: endpoint.into(),
            url_adapter,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn url_adapter(&self) -> Option<&Arc<dyn UrlAdapter>> {
        self.url_adapter.as_ref()
    }
}

/// Run `fut` with both contexts installed.
pub async fn scoped<F>(app: AppContext, request: RequestContext, fut: F) -> F::Output
where
    F: Future,
{
    APP_CONTEXT
        .scope(app, REQUEST_CONTEXT.scope(request, fut))
        .await
}

/// Run `fut` with only the application context installed.
pub async fn with_app<F>(app: AppContext, fut: F) -> F::Output
where
    F: Future,
{
    APP_CONTEXT.scope(app, fut).await
}

pub fn current_app() -> Option<AppContext> {
    APP_CONTEXT.try_with(Clone::clone).ok()
}

pub fn current_request() -> Option<RequestContext> {
    REQUEST_CONTEXT.try_with(Clone::clone).ok()
}

/// Build a url for `endpoint` from inside a handler.
///
/// Uses the current request's adapter; outside a request, falls back to the
/// application's, which needs `server.server_name`.
pub fn url_for(endpoint: &str, values: &Values, options: &BuildOptions) -> Result<String, RoutingError> {
    let adapter = REQUEST_CONTEXT
        .try_with(|request| request.url_adapter.clone())
        .ok()
        .flatten()
        .or_else(|| {
            APP_CONTEXT
                .try_with(AppContext::url_adapter)
                .ok()
                .flatten()
        })
        .ok_or(RoutingError::NoUrlAdapter)?;

    adapter.build(endpoint, values, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{MapUrlAdapters, RouteMap, RoutePattern, Rule};
    use axum::http::Request;

    fn app_context(server_name: Option<&str>) -> AppContext {
        let mut map = RouteMap::new();
        map.add(Rule::new(RoutePattern::parse("/chat").unwrap(), "chat"))
            .unwrap();
        let mut config = AppConfig::default();
        config.server.server_name = server_name.map(str::to_string);
        let config = Arc::new(config);
        let adapters = MapUrlAdapters::new(Arc::new(map), Arc::clone(&config));
        AppContext::new(config, Arc::new(adapters))
    }

    #[tokio::test]
    async fn test_no_context_outside_scope() {
        assert!(current_app().is_none());
        assert!(current_request().is_none());
        assert_eq!(
            url_for("chat", &Values::new(), &BuildOptions::default()),
            Err(RoutingError::NoUrlAdapter)
        );
    }

    #[tokio::test]
    async fn test_scoped_contexts_are_released() {
        let app = app_context(None);
        let parts = Request::builder()
            .uri("/chat")
            .header("Host", "chat.local")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        let adapter = app.url_adapters.create_url_adapter(Some(&parts));
        let request = RequestContext::new(&parts, "chat", adapter);

        let built = scoped(app, request, async {
            assert_eq!(current_request().unwrap().endpoint(), "chat");
            assert!(current_app().is_some());
            url_for("chat", &Values::new(), &BuildOptions::default().external())
        })
        .await;

        assert_eq!(built.unwrap(), "http://chat.local/chat");
        assert!(current_request().is_none());
        assert!(current_app().is_none());
    }

    #[tokio::test]
    async fn test_app_context_needs_server_name() {
        let unbound = with_app(app_context(None), async {
            url_for("chat", &Values::new(), &BuildOptions::default())
        })
        .await;
        assert_eq!(unbound, Err(RoutingError::NoUrlAdapter));

        let bound = with_app(app_context(Some("example.com")), async {
            url_for("chat", &Values::new(), &BuildOptions::default().external())
        })
        .await;
        assert_eq!(bound.unwrap(), "http://example.com/chat");
    }
}
