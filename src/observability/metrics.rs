//! Metrics collection and exposition.
//!
//! # Metrics
//! - `socket_router_dispatch_total` (counter): requests by dispatch mode
//! - `socket_router_sessions_total` (counter): finished socket handlers by outcome
//! - `socket_router_session_duration_seconds` (histogram): socket handler run time
//! - `socket_router_active_sessions` (gauge): upgraded sessions still open
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// `mode` is `pass_through` or `socket`.
pub fn record_dispatch(mode: &'static str) {
    metrics::counter!("socket_router_dispatch_total", "mode" => mode).increment(1);
}

pub fn record_socket_session(outcome: &'static str, started: Instant) {
    metrics::counter!("socket_router_sessions_total", "outcome" => outcome).increment(1);
    metrics::histogram!("socket_router_session_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

pub fn set_active_sessions(count: u64) {
    metrics::gauge!("socket_router_active_sessions").set(count as f64);
}
