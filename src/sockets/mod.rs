//! Websocket routing extension for [`App`].
//!
//! # Data Flow
//! ```text
//! Registration (at startup):
//!     Sockets::route / add_url_rule
//!     → socket RouteMap (defaults gain `ws = null`, any method)
//!     → socket HandlerRegistry
//!     → App::add_handler_rule (same pattern, endpoint, handler object)
//!
//! Wiring:
//!     Sockets::init_app(app)
//!     → host AppCore gets the socket-preferring url adapter factory
//!     → SocketDispatch wraps the host AppService
//!
//! Incoming request:
//!     Upgrade: websocket? ── no ──→ host AppService, untouched
//!            │ yes
//!            ▼
//!     socket table match → handler(ws = Connection) → empty handoff response
//! ```
//!
//! # Design Decisions
//! - Every socket endpoint also exists in the host table, so reverse routing
//!   and plain requests keep working for it
//! - Socket matching never falls back to the host table
//! - Both builders are consumed by `init_app`: registration is finished
//!   before the first request is dispatched

pub mod connection;
pub mod dispatcher;
pub mod url_builder;

use std::sync::Arc;

use serde_json::Value;
use tower::Layer;

pub use connection::{BoxedIo, Connection, ConnectionId, SocketIo, SocketStream};
pub use dispatcher::{
    is_upgrade_request, ConnectionHandedOff, DispatchError, SocketDispatch, SocketDispatchLayer,
    SocketTables,
};
pub use url_builder::{to_socket_scheme, SocketUrlAdapter, SocketUrlAdapters};

use crate::app::{resolve_endpoint, App, AppService, Handler, HandlerRegistry, RouteOptions};
use crate::routing::{MapUrlAdapters, RouteMap, RoutePattern, RoutingError, Rule};

/// Reserved value name carrying the connection to socket handlers.
pub const SOCKET_PARAM: &str = "ws";

/// The socket route table and its handlers.
#[derive(Debug, Default)]
pub struct Sockets {
    url_map: RouteMap,
    view_functions: HandlerRegistry,
}

impl Sockets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url_map(&self) -> &RouteMap {
        &self.url_map
    }

    pub fn view_functions(&self) -> &HandlerRegistry {
        &self.view_functions
    }

    /// Register a socket endpoint named after the handler function.
    pub fn route<H: Handler>(
        &mut self,
        app: &mut App,
        pattern: &str,
        handler: H,
    ) -> Result<String, RoutingError> {
        self.add_url_rule(app, pattern, None, handler, RouteOptions::default())
    }

    /// Register a socket endpoint in both tables; returns the endpoint name.
    ///
    /// Declared methods only restrict the host route. Nothing is inserted
    /// anywhere if the endpoint is taken in either table or the pattern
    /// captures the reserved [`SOCKET_PARAM`] name.
    pub fn add_url_rule<H: Handler>(
        &mut self,
        app: &mut App,
        pattern: &str,
        endpoint: Option<&str>,
        handler: H,
        options: RouteOptions,
    ) -> Result<String, RoutingError> {
        let endpoint = resolve_endpoint::<H>(endpoint)?;
        let pattern = RoutePattern::parse(pattern)?;
        if pattern.has_argument(SOCKET_PARAM) {
            return Err(RoutingError::invalid_pattern(
                pattern.source(),
                format!("`{SOCKET_PARAM}` is reserved for the socket connection"),
            ));
        }

        let taken = self.url_map.contains_endpoint(&endpoint)
            || self.view_functions.contains(&endpoint)
            || app.url_map().contains_endpoint(&endpoint)
            || app.view_functions().contains(&endpoint);
        if taken {
            return Err(RoutingError::DuplicateEndpoint { endpoint });
        }

        let RouteOptions {
            methods,
            mut defaults,
        } = options;
        defaults
            .entry(SOCKET_PARAM.to_string())
            .or_insert(Value::Null);

        let handler: Arc<dyn Handler> = Arc::new(handler);
        let rule = Rule::new(pattern.clone(), endpoint.as_str()).with_defaults(defaults.clone());
        self.url_map.add(rule)?;
        self.view_functions
            .insert(&endpoint, Arc::clone(&handler))?;

        app.add_handler_rule(
            pattern.clone(),
            &endpoint,
            handler,
            RouteOptions {
                methods: Some(methods.unwrap_or_default()),
                defaults,
            },
        )?;

        tracing::info!(
            endpoint = %endpoint,
            pattern = %pattern,
            "Socket route registered"
        );
        Ok(endpoint)
    }

    /// Freeze both tables and return the dispatch layer with its host.
    pub fn into_layer(self, app: App) -> (SocketDispatchLayer, AppService) {
        let config = Arc::clone(app.config());
        let socket_adapters = MapUrlAdapters::new(Arc::new(self.url_map), Arc::clone(&config));

        let core = app.into_core();
        let app_adapters = MapUrlAdapters::new(Arc::clone(core.url_map()), config);
        let core = core.with_url_adapters(Arc::new(SocketUrlAdapters::new(
            app_adapters,
            socket_adapters.clone(),
        )));

        let tables = SocketTables::new(socket_adapters, Arc::new(self.view_functions));
        let layer = SocketDispatchLayer::new(tables, core.app_context());
        (layer, AppService::new(core))
    }

    /// Wrap `app` so upgrade requests are dispatched to socket handlers.
    pub fn init_app(self, app: App) -> SocketDispatch<AppService> {
        let (layer, host) = self.into_layer(app);
        tracing::debug!("Socket dispatch installed");
        layer.layer(host)
    }
}
