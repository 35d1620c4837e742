//! Prometheus Metrics Module
//!
//! Exposes session metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Frames**: frames received and sent by payload type
//! - **Spots**: spot events delivered and dropped
//! - **Errors**: decode failures, vendor errors, session failures
//! - **Session**: current state and handshake latency
//!
//! # Integration
//!
//! When a port is configured, metrics are served at `/metrics` on that port.
//! Without one no recorder is installed and every call below is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::domain::session::SessionState;
use crate::infrastructure::ctrader::messages::PayloadType;

// =============================================================================
// Exporter
// =============================================================================

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// Port `0` leaves metrics disabled. Must be called inside a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or a recorder is
/// already installed.
pub fn init_metrics(port: u16) -> Result<bool, BuildError> {
    if port == 0 {
        return Ok(false);
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()?;

    register_metrics();
    Ok(true)
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Frame counters
    describe_counter!(
        "ctrader_frames_received_total",
        "Total frames received from the Open API by payload type"
    );
    describe_counter!(
        "ctrader_frames_sent_total",
        "Total frames sent to the Open API by payload type"
    );

    // Spot counters
    describe_counter!(
        "ctrader_spot_events_total",
        "Total spot events delivered to the sink"
    );
    describe_counter!(
        "ctrader_spot_events_dropped_total",
        "Total spot events dropped by a lagging consumer"
    );
    describe_counter!(
        "ctrader_heartbeats_sent_total",
        "Total heartbeat events sent"
    );

    // Error counters
    describe_counter!(
        "ctrader_decode_errors_total",
        "Total undecodable frames by session phase"
    );
    describe_counter!(
        "ctrader_vendor_errors_total",
        "Total error responses received by error code"
    );
    describe_counter!(
        "ctrader_session_failures_total",
        "Total terminal session failures by kind"
    );

    // Session state
    describe_gauge!(
        "ctrader_session_state",
        "Position of the current state on the handshake path (-1 = failed)"
    );
    describe_histogram!(
        "ctrader_handshake_seconds",
        "Time from connect to the first streaming state"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Session phase label.
#[derive(Debug, Clone, Copy)]
pub enum Phase {
    /// Before streaming.
    Handshake,
    /// Streaming.
    Streaming,
}

impl Phase {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::Streaming => "streaming",
        }
    }

    const fn from_streaming(streaming: bool) -> Self {
        if streaming {
            Self::Streaming
        } else {
            Self::Handshake
        }
    }
}

fn payload_label(payload_type: u32) -> &'static str {
    PayloadType::try_from(payload_type).map_or("unknown", PayloadType::name)
}

/// Record a frame received.
pub fn record_frame_received(payload_type: u32) {
    counter!(
        "ctrader_frames_received_total",
        "payload_type" => payload_label(payload_type)
    )
    .increment(1);
}

/// Record a frame sent.
pub fn record_frame_sent(payload_type: u32) {
    counter!(
        "ctrader_frames_sent_total",
        "payload_type" => payload_label(payload_type)
    )
    .increment(1);
}

/// Record a spot event handed to the sink.
pub fn record_spot_event() {
    counter!("ctrader_spot_events_total").increment(1);
}

/// Record spot events dropped by a lagging consumer.
pub fn record_spots_dropped(count: u64) {
    counter!("ctrader_spot_events_dropped_total").increment(count);
}

/// Record a heartbeat sent.
pub fn record_heartbeat_sent() {
    counter!("ctrader_heartbeats_sent_total").increment(1);
}

/// Record an undecodable frame.
pub fn record_decode_error(streaming: bool) {
    counter!(
        "ctrader_decode_errors_total",
        "phase" => Phase::from_streaming(streaming).as_str()
    )
    .increment(1);
}

/// Record an error response from the server.
pub fn record_vendor_error(error_code: &str, during_handshake: bool) {
    counter!(
        "ctrader_vendor_errors_total",
        "error_code" => error_code.to_string(),
        "phase" => Phase::from_streaming(!during_handshake).as_str()
    )
    .increment(1);
}

/// Record a terminal session failure.
pub fn record_session_failure(kind: &'static str) {
    counter!("ctrader_session_failures_total", "kind" => kind).increment(1);
}

/// Update the session state gauge.
pub fn set_session_state(state: SessionState) {
    gauge!("ctrader_session_state").set(f64::from(state.ordinal()));
}

/// Record how long the handshake took.
pub fn record_handshake_duration(duration: Duration) {
    histogram!("ctrader_handshake_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
