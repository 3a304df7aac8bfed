//! Host application.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     App::route / add_url_rule
//!     → RouteMap (plain table) + HandlerRegistry
//!     → App::into_core (freeze behind Arc)
//!
//! Request:
//!     AppService (tower Service)
//!     → url adapter (bound to the request)
//!     → match → handler → scoped contexts → Response
//! ```
//!
//! # Design Decisions
//! - Routes without declared methods answer `GET` (and `HEAD`)
//! - Endpoint names default to the handler function's name
//! - The url adapter factory is pluggable so extensions such as the socket
//!   layer can change reverse routing without touching handlers

pub mod handler;
pub mod registry;
pub mod service;

use std::sync::Arc;

use axum::http::Method;
use serde_json::Value;

pub use handler::{Handler, HandlerError, HandlerRequest, HandlerResult};
pub use registry::{endpoint_from_handler, same_handler, HandlerRegistry};
pub use service::{AppCore, AppService};

use crate::config::AppConfig;
use crate::routing::{RouteMap, RoutePattern, RoutingError, Rule, Values};

/// Per-route registration options.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    /// Allowed methods; `None` (or empty) means the table's default.
    pub methods: Option<Vec<Method>>,
    /// Values merged into every match and used when building urls.
    pub defaults: Values,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    pub fn default_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }
}

/// The application under construction.
pub struct App {
    config: Arc<AppConfig>,
    url_map: RouteMap,
    view_functions: HandlerRegistry,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            url_map: RouteMap::new(),
            view_functions: HandlerRegistry::new(),
        }
    }

    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    pub fn url_map(&self) -> &RouteMap {
        &self.url_map
    }

    pub fn view_functions(&self) -> &HandlerRegistry {
        &self.view_functions
    }

    /// Register `handler` at `pattern`, named after the handler function.
    pub fn route<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<String, RoutingError> {
        self.add_url_rule(pattern, None, handler, RouteOptions::default())
    }

    /// Register a route; returns the endpoint name used.
    pub fn add_url_rule<H: Handler>(
        &mut self,
        pattern: &str,
        endpoint: Option<&str>,
        handler: H,
        options: RouteOptions,
    ) -> Result<String, RoutingError> {
        let endpoint = resolve_endpoint::<H>(endpoint)?;
        let pattern = RoutePattern::parse(pattern)?;
        self.add_handler_rule(pattern, &endpoint, Arc::new(handler), options)?;
        Ok(endpoint)
    }

    /// Register an already shared handler under an already compiled pattern.
    pub fn add_handler_rule(
        &mut self,
        pattern: RoutePattern,
        endpoint: &str,
        handler: Arc<dyn Handler>,
        options: RouteOptions,
    ) -> Result<(), RoutingError> {
        if self.url_map.contains_endpoint(endpoint) || self.view_functions.contains(endpoint) {
            return Err(RoutingError::DuplicateEndpoint {
                endpoint: endpoint.to_string(),
            });
        }

        let methods = options
            .methods
            .filter(|methods| !methods.is_empty())
            .unwrap_or_else(|| vec![Method::GET]);

        tracing::debug!(
            endpoint = %endpoint,
            pattern = %pattern,
            methods = ?methods,
            "Route registered"
        );

        let rule = Rule::new(pattern, endpoint)
            .with_defaults(options.defaults)
            .with_methods(methods);
        self.url_map.add(rule)?;
        self.view_functions.insert(endpoint, handler)
    }

    /// Freeze the tables.
    pub fn into_core(self) -> AppCore {
        AppCore::new(
            self.config,
            Arc::new(self.url_map),
            Arc::new(self.view_functions),
        )
    }

    pub fn into_service(self) -> AppService {
        AppService::new(self.into_core())
    }
}

/// Use the explicit endpoint, or derive one from the handler type.
pub(crate) fn resolve_endpoint<H>(endpoint: Option<&str>) -> Result<String, RoutingError> {
    match endpoint {
        Some(endpoint) => Ok(endpoint.to_string()),
        None => endpoint_from_handler::<H>().ok_or_else(|| RoutingError::MissingEndpoint {
            handler: std::any::type_name::<H>().to_string(),
        }),
    }
}
