//! Endpoint → handler registry.
//!
//! # Design Decisions
//! - Handlers are stored as `Arc<dyn Handler>` so the plain and socket
//!   tables can point at the same object
//! - Registering a different handler under a taken name is an error;
//!   re-registering the very same handler is accepted

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::handler::Handler;
use crate::routing::RoutingError;

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, endpoint: &str, handler: Arc<dyn Handler>) -> Result<(), RoutingError> {
        if let Some(existing) = self.handlers.get(endpoint) {
            if same_handler(existing, &handler) {
                return Ok(());
            }
            return Err(RoutingError::DuplicateEndpoint {
                endpoint: endpoint.to_string(),
            });
        }
        self.handlers.insert(endpoint.to_string(), handler);
        Ok(())
    }

    pub fn get(&self, endpoint: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(endpoint).cloned()
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.handlers.contains_key(endpoint)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut endpoints: Vec<&str> = self.endpoints().collect();
        endpoints.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("endpoints", &endpoints)
            .finish()
    }
}

/// Pointer identity of two handler objects (data pointer only).
pub fn same_handler(a: &Arc<dyn Handler>, b: &Arc<dyn Handler>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Derive an endpoint name from a handler's type.
///
/// Function items yield their name (`crate::chat::echo` → `echo`);
/// closures and generic types yield `None`.
pub fn endpoint_from_handler<H: ?Sized>() -> Option<String> {
    let type_name = std::any::type_name::<H>();
    let name = type_name.rsplit("::").next()?;
    let usable = !name.is_empty()
        && !type_name.contains('<')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    usable.then(|| name.to_string())
}
