//! Prometheus collectors for the operation pipeline.
//!
//! Collectors live in a crate-owned [`REGISTRY`]; embedders scrape it through
//! [`gather_metrics`] and expose it however they expose the rest of the node.


use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tracing::error;

lazy_static! {
    pub static ref OPERATIONS_COMPLETED: IntCounterVec = IntCounterVec::new(
        Opts::new("operations_completed", "Operations applied and finalized"),
        &["op_type"]
    )
    .expect("Should succeed to create metric");

    pub static ref OPERATIONS_FAILED: IntCounterVec = IntCounterVec::new(
        Opts::new("operations_failed", "Operations failed back to the client"),
        &["op_type"]
    )
    .expect("Should succeed to create metric");

    pub static ref FATAL_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("fatal_failures", "Unrecoverable failures after commit"),
        &["source"]
    )
    .expect("Should succeed to create metric");

    pub static ref PENDING_OPERATIONS: IntGauge =
        IntGauge::new("pending_operations", "Operations registered with the tracker")
            .expect("metric can not be created");

    pub static ref PENDING_MEMORY_BYTES: IntGauge =
        IntGauge::new("pending_memory_bytes", "Bytes held by tracked operations")
            .expect("metric can not be created");

    pub static ref OPERATION_LATENCY_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("operation_latency_ms", "Driver start to finalize latency in ms")
            .buckets(exponential_buckets(1.0, 2.0, 16).expect("valid buckets")),
        &["op_type"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(OPERATIONS_COMPLETED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(OPERATIONS_FAILED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(FATAL_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(PENDING_OPERATIONS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(PENDING_MEMORY_BYTES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(OPERATION_LATENCY_MS.clone()))
        .expect("collector can be registered");
}

/// Renders the crate registry in the Prometheus text format.
pub fn gather_metrics() -> String {
    REGISTER.call_once(|| register_custom_metrics(&REGISTRY));

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode driver metrics: {}", e);
        return String::default();
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("driver metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}
