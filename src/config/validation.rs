//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, url scheme and mount point
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("server.server_name must not be empty")]
    EmptyServerName,

    #[error("server.application_root {0:?} must start with '/'")]
    ApplicationRoot(String),

    #[error("server.preferred_url_scheme {0:?} must be http or https")]
    UrlScheme(String),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;

    if server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(server.bind_address.clone()));
    }

    if matches!(&server.server_name, Some(name) if name.trim().is_empty()) {
        errors.push(ValidationError::EmptyServerName);
    }

    if !server.application_root.starts_with('/') {
        errors.push(ValidationError::ApplicationRoot(
            server.application_root.clone(),
        ));
    }

    if !matches!(server.preferred_url_scheme.as_str(), "http" | "https") {
        errors.push(ValidationError::UrlScheme(
            server.preferred_url_scheme.clone(),
        ));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
