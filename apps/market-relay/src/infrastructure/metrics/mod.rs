//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Decoded messages by kind and decode errors by kind
//! - **Dispatch**: Messages routed to a handler or left unregistered
//! - **Orders**: Orders forwarded, documents rejected, batches submitted
//! - **Session**: Whether each stream currently has a known location
//! - **Uploads**: Publish outcomes and latency per destination
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::protocol::MessageKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Repeated calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns [`BuildError`] if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Decode counters
    describe_counter!(
        "market_relay_frames_decoded_total",
        "Total protocol messages decoded by kind"
    );
    describe_counter!(
        "market_relay_frame_errors_total",
        "Total commands or messages skipped due to decode errors"
    );

    // Dispatch counters
    describe_counter!(
        "market_relay_messages_dispatched_total",
        "Total decoded messages by whether a handler was registered"
    );

    // Order counters
    describe_counter!(
        "market_relay_orders_forwarded_total",
        "Total normalized orders handed to the upload path"
    );
    describe_counter!(
        "market_relay_orders_rejected_total",
        "Total order documents skipped during conversion"
    );
    describe_counter!(
        "market_relay_batches_submitted_total",
        "Total upload batches submitted"
    );
    describe_counter!(
        "market_relay_invalid_session_drops_total",
        "Total order messages dropped because the location was unknown"
    );

    // Session gauge
    describe_gauge!(
        "market_relay_session_location_known",
        "1 when the stream's session has a known location, 0 otherwise"
    );

    // Upload metrics
    describe_counter!(
        "market_relay_publish_total",
        "Total batch publish attempts by destination and outcome"
    );
    describe_histogram!(
        "market_relay_publish_duration_seconds",
        "Time to publish one batch to one destination"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric label for the result of one publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Destination accepted the batch.
    Delivered,
    /// Destination did not answer within the timeout.
    TimedOut,
    /// Destination refused the batch or the request failed.
    Failed,
}

impl PublishOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::TimedOut => "timed_out",
            Self::Failed => "failed",
        }
    }
}

/// Record a decoded protocol message.
pub fn record_frame_decoded(kind: MessageKind) {
    counter!(
        "market_relay_frames_decoded_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a decode error.
pub fn record_frame_error(error_kind: &str) {
    counter!(
        "market_relay_frame_errors_total",
        "error_type" => error_kind.to_string()
    )
    .increment(1);
}

/// Record whether a decoded message reached a handler.
pub fn record_message_dispatched(handled: bool) {
    counter!(
        "market_relay_messages_dispatched_total",
        "handled" => if handled { "true" } else { "false" }
    )
    .increment(1);
}

/// Record converted and rejected orders from one message.
pub fn record_orders(forwarded: usize, rejected: usize) {
    counter!("market_relay_orders_forwarded_total").increment(forwarded as u64);
    counter!("market_relay_orders_rejected_total").increment(rejected as u64);
}

/// Record a submitted upload batch.
pub fn record_batch_submitted() {
    counter!("market_relay_batches_submitted_total").increment(1);
}

/// Record an order message dropped for lack of a known location.
pub fn record_invalid_session_drop() {
    counter!("market_relay_invalid_session_drops_total").increment(1);
}

/// Update the location gauge for a stream.
pub fn set_session_valid(stream: &str, known: bool) {
    gauge!(
        "market_relay_session_location_known",
        "stream" => stream.to_string()
    )
    .set(if known { 1.0 } else { 0.0 });
}

/// Record one publish attempt.
pub fn record_publish(destination: &str, outcome: PublishOutcome, duration: Duration) {
    counter!(
        "market_relay_publish_total",
        "destination" => destination.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!(
        "market_relay_publish_duration_seconds",
        "destination" => destination.to_string()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
