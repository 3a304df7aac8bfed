//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (at startup):
//!     "/rooms/<id>" + endpoint + defaults + methods
//!     → pattern.rs (compile segments)
//!     → map.rs (insert into RouteMap, ordered by specificity)
//!
//! Incoming request:
//!     → adapter.rs (bind table to host / script name / scheme)
//!     → map.rs (match path) → RouteMatch or NoMatch / MethodNotAllowed
//!
//! Reverse routing:
//!     endpoint + values → map.rs (render path, append query) → url or NoRoute
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in the hot path (segment matching only)
//! - Deterministic: same input always matches same route
//! - Explicit NoMatch rather than silent default

pub mod adapter;
pub mod error;
pub mod map;
pub mod pattern;

use std::collections::BTreeMap;

pub use adapter::{BuildOptions, MapUrlAdapters, RouteMatch, UrlAdapter, UrlAdapterFactory};
pub use error::RoutingError;
pub use map::{MapAdapter, RouteMap, Rule};
pub use pattern::{Converter, RoutePattern};

/// Path variables, defaults and url-building values.
pub type Values = BTreeMap<String, serde_json::Value>;
