//! Connection handles for upgraded sockets.
//!
//! # Responsibilities
//! - Give every upgraded connection a unique id for tracing
//! - Carry the transport's duplex stream to the socket handler
//!
//! # Design Decisions
//! - The handle is opaque: built by the transport, consumed by the handler
//! - Cloneable so it can travel in request extensions; the stream itself
//!   can be taken exactly once

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_tungstenite::WebSocketStream;

use crate::app::HandlerError;

/// Global atomic counter for connection IDs.
/// Relaxed ordering: ids only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an upgraded connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

/// Any duplex byte stream an upgraded connection can ride on.
pub trait SocketIo: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> SocketIo for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased socket stream.
pub type BoxedIo = Box<dyn SocketIo>;

/// Websocket framing over an upgraded connection.
pub type SocketStream = WebSocketStream<BoxedIo>;

/// Handle to an already negotiated duplex connection.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    io: Arc<Mutex<Option<BoxedIo>>>,
}

impl Connection {
    /// Wrap a ready stream. Called by the transport after the handshake.
    pub fn new<T: SocketIo>(io: T) -> Self {
        Self {
            id: ConnectionId::next(),
            io: Arc::new(Mutex::new(Some(Box::new(io)))),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Take the raw stream. `None` once any clone has taken it.
    pub fn take(&self) -> Option<BoxedIo> {
        let mut slot = match self.io.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.take()
    }

    pub fn is_taken(&self) -> bool {
        match self.io.lock() {
            Ok(slot) => slot.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    /// Take the stream and speak server-side websocket frames over it.
    pub async fn into_websocket(self) -> Result<SocketStream, HandlerError> {
        self.into_websocket_with_config(None).await
    }

    pub async fn into_websocket_with_config(
        self,
        config: Option<WebSocketConfig>,
    ) -> Result<SocketStream, HandlerError> {
        let io = self.take().ok_or(HandlerError::ConnectionTaken)?;
        Ok(WebSocketStream::from_raw_socket(io, Role::Server, config).await)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("taken", &self.is_taken())
            .finish()
    }
}
