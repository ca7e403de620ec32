//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): RPC requests by method
//! - `gateway_access_denied_total` (counter): rejections by pipeline stage
//! - `gateway_tool_calls_total` (counter): tool calls by tool and outcome
//! - `gateway_tool_call_duration_seconds` (histogram): tool latency by tool
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is opt-in via `metrics_address`

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
///
/// Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str) {
    metrics::counter!("gateway_requests_total", "method" => method.to_string()).increment(1);
}

pub fn record_access_denied(stage: &'static str) {
    metrics::counter!("gateway_access_denied_total", "stage" => stage).increment(1);
}

pub fn record_tool_call(tool: &str, ok: bool, started: Instant) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!(
        "gateway_tool_calls_total",
        "tool" => tool.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("gateway_tool_call_duration_seconds", "tool" => tool.to_string())
        .record(started.elapsed().as_secs_f64());
}
