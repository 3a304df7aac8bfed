//! Routing error taxonomy.

use axum::http::Method;
use thiserror::Error;

/// Errors produced while registering, matching or building routes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// The path matched no rule in the table that was consulted.
    #[error("no route matches path {path}")]
    NoMatch { path: String },

    /// The path matched, but not for this method.
    #[error("method {method} is not allowed for {path}")]
    MethodNotAllowed {
        path: String,
        method: Method,
        allowed: Vec<Method>,
    },

    /// No rule for the endpoint accepts the supplied values and method.
    #[error("could not build a url for endpoint {endpoint}")]
    NoRoute { endpoint: String },

    /// The endpoint name is already taken in one of the tables.
    #[error("endpoint {endpoint} is already registered")]
    DuplicateEndpoint { endpoint: String },

    /// The route pattern could not be compiled.
    #[error("invalid route pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// No endpoint name was given and none could be derived from the handler.
    #[error("handler {handler} has no usable name, pass an explicit endpoint")]
    MissingEndpoint { handler: String },

    /// A built url could not be parsed or rewritten.
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Reverse routing was requested with nothing to bind the url to.
    #[error("no url adapter available: outside a request a server_name must be configured")]
    NoUrlAdapter,
}

impl RoutingError {
    pub(crate) fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn no_route(endpoint: &str) -> Self {
        Self::NoRoute {
            endpoint: endpoint.to_string(),
        }
    }

    /// True for the build failure that the socket adapter recovers from.
    pub fn is_no_route(&self) -> bool {
        matches!(self, Self::NoRoute { .. })
    }
}
