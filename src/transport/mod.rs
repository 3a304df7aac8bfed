//! Transport layer.
//!
//! # Data Flow
//! ```text
//! TcpListener → axum::serve (request id, trace)
//!     → WebSocketTransport
//!         plain request  → dispatcher → host response (errors → status)
//!         upgrade        → handshake check → 101
//!                          └─ spawned session: hyper upgrade → Connection
//!                             → dispatcher → socket handler → close
//! Shutdown:
//!     signal → stop accepting → drain tracked sessions (bounded) → exit
//! ```

pub mod handshake;
pub mod server;
pub mod tracker;

pub use handshake::{validate_handshake, HandshakeError, WebSocketTransport};
pub use server::SocketServer;
pub use tracker::{SessionGuard, SessionTracker};
