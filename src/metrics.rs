//! Prometheus metrics for admission decisions.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    pub static ref EVALUATIONS_TOTAL: IntCounter = register_int_counter!(
        "turnstile_evaluations_total",
        "Admission evaluations performed"
    )
    .unwrap();
    pub static ref ADMITTED_TOTAL: IntCounter =
        register_int_counter!("turnstile_admitted_total", "Requests admitted").unwrap();
    pub static ref REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "turnstile_rejected_total",
        "Requests rejected, by reason",
        &["reason"]
    )
    .unwrap();
    pub static ref BANS_IMPOSED_TOTAL: IntCounter =
        register_int_counter!("turnstile_bans_imposed_total", "Ban flags written").unwrap();
    pub static ref STORE_ERRORS_TOTAL: IntCounter = register_int_counter!(
        "turnstile_store_errors_total",
        "Counter store failures during evaluation"
    )
    .unwrap();
    pub static ref EVALUATION_LATENCY: Histogram = register_histogram!(
        "turnstile_evaluation_latency_seconds",
        "Admission evaluation latency in seconds"
    )
    .unwrap();
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
