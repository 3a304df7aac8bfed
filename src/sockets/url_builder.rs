//! Reverse routing that prefers socket urls.
//!
//! An endpoint registered through [`Sockets`](super::Sockets) lives in both
//! tables. Building its url yields an absolute `ws://` / `wss://` url;
//! endpoints only the host knows fall back to the host adapter unchanged.

use std::sync::Arc;

use axum::http::{request::Parts, Method};
use url::Url;

use crate::routing::{
    BuildOptions, MapUrlAdapters, RouteMatch, RoutingError, UrlAdapter, UrlAdapterFactory, Values,
};

/// Composite adapter: socket table first, host table second.
#[derive(Debug, Clone)]
pub struct SocketUrlAdapter {
    app: Arc<dyn UrlAdapter>,
    sockets: Arc<dyn UrlAdapter>,
}

impl SocketUrlAdapter {
    pub fn new(app: Arc<dyn UrlAdapter>, sockets: Arc<dyn UrlAdapter>) -> Self {
        Self { app, sockets }
    }
}

impl UrlAdapter for SocketUrlAdapter {
    fn match_path(&self, path: &str, method: Option<&Method>) -> Result<RouteMatch, RoutingError> {
        self.app.match_path(path, method)
    }

    fn build(
        &self,
        endpoint: &str,
        values: &Values,
        options: &BuildOptions,
    ) -> Result<String, RoutingError> {
        // Socket urls are always absolute and ignore the method.
        let socket_options = BuildOptions {
            method: None,
            force_external: true,
            append_unknown: options.append_unknown,
        };

        match self
            .sockets
            .build(endpoint, values, &socket_options)
            .and_then(|url| to_socket_scheme(&url))
        {
            Ok(url) => Ok(url),
            Err(err) if err.is_no_route() => self.app.build(endpoint, values, options),
            Err(RoutingError::InvalidUrl { url, reason }) => {
                tracing::warn!(
                    endpoint,
                    url = %url,
                    reason = %reason,
                    "Socket url unusable, building host url"
                );
                self.app.build(endpoint, values, options)
            }
            Err(err) => Err(err),
        }
    }
}

/// Rewrite `http` to `ws` and `https` to `wss`. Other schemes are kept.
pub fn to_socket_scheme(url: &str) -> Result<String, RoutingError> {
    let invalid = |reason: String| RoutingError::InvalidUrl {
        url: url.to_string(),
        reason,
    };

    let mut parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    let scheme = match parsed.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return Ok(parsed.into()),
    };
    parsed
        .set_scheme(scheme)
        .map_err(|()| invalid(format!("cannot switch scheme to {scheme}")))?;
    Ok(parsed.into())
}

/// Creates [`SocketUrlAdapter`]s bound to the same request or server.
#[derive(Debug, Clone)]
pub struct SocketUrlAdapters {
    app: MapUrlAdapters,
    sockets: MapUrlAdapters,
}

impl SocketUrlAdapters {
    pub fn new(app: MapUrlAdapters, sockets: MapUrlAdapters) -> Self {
        Self { app, sockets }
    }
}

impl UrlAdapterFactory for SocketUrlAdapters {
    fn create_url_adapter(&self, request: Option<&Parts>) -> Option<Arc<dyn UrlAdapter>> {
        let app = self.app.create_url_adapter(request)?;
        let sockets = self.sockets.create_url_adapter(request)?;
        Some(Arc::new(SocketUrlAdapter::new(app, sockets)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::routing::{RouteMap, RoutePattern, Rule};
    use serde_json::json;

    fn rule(pattern: &str, endpoint: &str) -> Rule {
        Rule::new(RoutePattern::parse(pattern).unwrap(), endpoint)
    }

    fn adapter(scheme: &str) -> SocketUrlAdapter {
        let mut app_map = RouteMap::new();
        app_map
            .add(rule("/chat", "chat").with_methods([Method::GET]))
            .unwrap();
        app_map
            .add(rule("/about", "about").with_methods([Method::GET]))
            .unwrap();
        let mut socket_map = RouteMap::new();
        socket_map
            .add(rule("/chat", "chat").with_defaults(Values::from([(
                "ws".to_string(),
                serde_json::Value::Null,
            )])))
            .unwrap();

        let app: Arc<dyn UrlAdapter> = Arc::new(Arc::new(app_map).bind("chat.local", "/", scheme));
        let sockets: Arc<dyn UrlAdapter> =
            Arc::new(Arc::new(socket_map).bind("chat.local", "/", scheme));
        SocketUrlAdapter::new(app, sockets)
    }

    #[test]
    fn test_socket_endpoint_builds_ws_url() {
        let url = adapter("http")
            .build("chat", &Values::new(), &BuildOptions::default())
            .unwrap();
        assert_eq!(url, "ws://chat.local/chat");
    }

    #[test]
    fn test_https_becomes_wss() {
        let url = adapter("https")
            .build("chat", &Values::new(), &BuildOptions::default().external())
            .unwrap();
        assert_eq!(url, "wss://chat.local/chat");
    }

    #[test]
    fn test_socket_build_ignores_method() {
        let url = adapter("http")
            .build("chat", &Values::new(), &BuildOptions::default().method(Method::POST))
            .unwrap();
        assert_eq!(url, "ws://chat.local/chat");
    }

    #[test]
    fn test_plain_endpoint_falls_back_unchanged() {
        let adapter = adapter("http");
        assert_eq!(
            adapter
                .build("about", &Values::new(), &BuildOptions::default())
                .unwrap(),
            "/about"
        );
        assert_eq!(
            adapter
                .build("about", &Values::new(), &BuildOptions::default().external())
                .unwrap(),
            "http://chat.local/about"
        );
    }

    #[test]
    fn test_unknown_values_survive_rewrite() {
        let values = Values::from([("room".to_string(), json!("lobby"))]);
        let url = adapter("http")
            .build("chat", &values, &BuildOptions::default())
            .unwrap();
        assert_eq!(url, "ws://chat.local/chat?room=lobby");
    }

    #[test]
    fn test_unknown_endpoint_is_no_route() {
        let err = adapter("http")
            .build("missing", &Values::new(), &BuildOptions::default())
            .unwrap_err();
        assert!(err.is_no_route());
    }

    #[test]
    fn test_unparsable_socket_url_falls_back_to_host() {
        let mut app_map = RouteMap::new();
        app_map
            .add(rule("/chat", "chat").with_methods([Method::GET]))
            .unwrap();
        let mut socket_map = RouteMap::new();
        socket_map.add(rule("/chat", "chat")).unwrap();

        let app: Arc<dyn UrlAdapter> = Arc::new(Arc::new(app_map).bind("bad host", "/", "http"));
        let sockets: Arc<dyn UrlAdapter> =
            Arc::new(Arc::new(socket_map).bind("bad host", "/", "http"));
        let adapter = SocketUrlAdapter::new(app, sockets);

        assert_eq!(
            adapter
                .build("chat", &Values::new(), &BuildOptions::default())
                .unwrap(),
            "/chat"
        );
    }

    #[test]
    fn test_scheme_rewrite() {
        assert_eq!(to_socket_scheme("http://h:8080/a?b=1").unwrap(), "ws://h:8080/a?b=1");
        assert_eq!(to_socket_scheme("https://h/a").unwrap(), "wss://h/a");
        assert_eq!(to_socket_scheme("wss://h/a").unwrap(), "wss://h/a");
        assert!(matches!(
            to_socket_scheme("not a url"),
            Err(RoutingError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_factory_binds_both_tables() {
        let config = Arc::new(AppConfig::default());
        let mut socket_map = RouteMap::new();
        socket_map.add(rule("/chat", "chat")).unwrap();
        let factory = SocketUrlAdapters::new(
            MapUrlAdapters::new(Arc::new(RouteMap::new()), Arc::clone(&config)),
            MapUrlAdapters::new(Arc::new(socket_map), config),
        );

        assert!(factory.create_url_adapter(None).is_none());

        let parts = axum::http::Request::builder()
            .uri("/")
            .header("Host", "example.com")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        let adapter = factory.create_url_adapter(Some(&parts)).unwrap();
        assert_eq!(
            adapter
                .build("chat", &Values::new(), &BuildOptions::default())
                .unwrap(),
            "ws://example.com/chat"
        );
    }
}
