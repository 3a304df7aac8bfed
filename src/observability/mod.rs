//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Registration, dispatch, transport:
//!     → logging.rs (structured log events, `socket_dispatch` spans)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (plain or JSON)
//!     → Prometheus scrape endpoint (when enabled)
//! ```

pub mod logging;
pub mod metrics;
