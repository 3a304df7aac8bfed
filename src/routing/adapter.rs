//! The adapter seam between route tables and their callers.
//!
//! `UrlAdapter` is what request handling and reverse routing consume. The
//! plain [`MapAdapter`](super::MapAdapter) implements it over one table; the
//! socket layer composes two of them behind the same trait.

use std::fmt;
use std::sync::Arc;

use axum::http::{header, request::Parts, Method};

use super::error::RoutingError;
use super::map::{MapAdapter, RouteMap};
use super::Values;
use crate::config::AppConfig;

/// Result of a successful forward match.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch {
    pub endpoint: String,
    /// Rule defaults overlaid with the captured path values.
    pub values: Values,
}

/// Options for reverse url building.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Only rules accepting this method are considered.
    pub method: Option<Method>,
    /// Produce `scheme://server/path` instead of a relative path.
    pub force_external: bool,
    /// Append values unknown to the rule as a query string.
    pub append_unknown: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            method: None,
            force_external: false,
            append_unknown: true,
        }
    }
}

impl BuildOptions {
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn external(mut self) -> Self {
        self.force_external = true;
        self
    }

    pub fn append_unknown(mut self, append: bool) -> Self {
        self.append_unknown = append;
        self
    }
}

/// Forward matching and reverse building over a bound route table.
pub trait UrlAdapter: Send + Sync + fmt::Debug {
    /// Match a request path. `None` for the method means any method.
    fn match_path(&self, path: &str, method: Option<&Method>) -> Result<RouteMatch, RoutingError>;

    /// Build a url for an endpoint.
    fn build(
        &self,
        endpoint: &str,
        values: &Values,
        options: &BuildOptions,
    ) -> Result<String, RoutingError>;
}

/// Creates url adapters for a request, or for the application when there
/// is no request.
pub trait UrlAdapterFactory: Send + Sync {
    fn create_url_adapter(&self, request: Option<&Parts>) -> Option<Arc<dyn UrlAdapter>>;
}

/// Binds one route table using the server configuration.
#[derive(Debug, Clone)]
pub struct MapUrlAdapters {
    map: Arc<RouteMap>,
    config: Arc<AppConfig>,
}

impl MapUrlAdapters {
    pub fn new(map: Arc<RouteMap>, config: Arc<AppConfig>) -> Self {
        Self { map, config }
    }

    pub fn map(&self) -> &Arc<RouteMap> {
        &self.map
    }

    /// Bind to a request, or to the configured server name without one.
    ///
    /// A configured `server_name` takes precedence over the Host header.
    pub fn bind(&self, request: Option<&Parts>) -> Option<MapAdapter> {
        let server = &self.config.server;
        match request {
            Some(parts) => {
                let server_name = server
                    .server_name
                    .clone()
                    .or_else(|| request_host(parts))
                    .unwrap_or_else(|| "localhost".to_string());
                let scheme = parts.uri.scheme_str().unwrap_or("http");
                Some(self.map.bind(server_name, &server.application_root, scheme))
            }
            None => server.server_name.as_ref().map(|name| {
                self.map.bind(
                    name.clone(),
                    &server.application_root,
                    server.preferred_url_scheme.clone(),
                )
            }),
        }
    }
}

impl UrlAdapterFactory for MapUrlAdapters {
    fn create_url_adapter(&self, request: Option<&Parts>) -> Option<Arc<dyn UrlAdapter>> {
        self.bind(request)
            .map(|adapter| Arc::new(adapter) as Arc<dyn UrlAdapter>)
    }
}

fn request_host(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
}
