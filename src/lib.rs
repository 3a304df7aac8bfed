//! Websocket routing for a small HTTP application framework.
//!
//! Socket endpoints are registered next to ordinary routes. Upgrade
//! requests are dispatched to socket handlers with the negotiated
//! connection; everything else reaches the host application untouched.
//! Reverse routing prefers `ws://` / `wss://` urls for socket endpoints.

// Core subsystems
pub mod app;
pub mod config;
pub mod context;
pub mod routing;
pub mod sockets;
pub mod transport;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use app::{App, AppService, HandlerError, HandlerRequest, RouteOptions};
pub use config::AppConfig;
pub use lifecycle::Shutdown;
pub use routing::{BuildOptions, RoutingError, Values};
pub use sockets::{Connection, DispatchError, SocketDispatch, Sockets};
pub use transport::SocketServer;
