//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define framework metrics (controller latency, responses, session saves)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `webcore_controller_duration_seconds` (histogram): action latency by handler
//! - `webcore_responses_total` (counter): responses by status class
//! - `webcore_response_bytes_total` (counter): body bytes by status class
//! - `webcore_session_saves_total` (counter): session saves by outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Labels stay low-cardinality (handler names, status classes, outcomes)

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_controller_duration(handler: &str, elapsed: Duration) {
    metrics::histogram!("webcore_controller_duration_seconds", "handler" => handler.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_response(status: StatusCode, bytes: usize) {
    let class = status_class(status);
    metrics::counter!("webcore_responses_total", "status_class" => class).increment(1);
    metrics::counter!("webcore_response_bytes_total", "status_class" => class).increment(bytes as u64);
}

pub fn record_session_save(outcome: &'static str) {
    metrics::counter!("webcore_session_saves_total", "outcome" => outcome).increment(1);
}

/// `2xx`, `4xx`... for a status code.
pub fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(StatusCode::OK), "2xx");
        assert_eq!(status_class(StatusCode::SEE_OTHER), "3xx");
        assert_eq!(status_class(StatusCode::NOT_FOUND), "4xx");
        assert_eq!(status_class(StatusCode::NOT_IMPLEMENTED), "5xx");
    }
}
