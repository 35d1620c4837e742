//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Transport`: persistent message channel to the Open API endpoint
//! - `SpotSink`: consumer of decoded spot ticks

use async_trait::async_trait;

use crate::domain::streaming::SpotEvent;

// =============================================================================
// Transport
// =============================================================================

/// Transport-level failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Socket-level fault on an open connection.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection closed by the peer or locally.
    #[error("connection closed")]
    Closed,

    /// Frame that cannot be carried as text.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Bidirectional message channel to one Open API endpoint.
///
/// Frames are opaque text; the transport never interprets payloads.
#[async_trait]
pub trait Transport: Send {
    /// Send one frame.
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Wait for the next frame.
    ///
    /// Returns `Ok(None)` once the connection has closed in an orderly way.
    async fn receive(&mut self) -> Result<Option<String>, TransportError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

// =============================================================================
// Spot Sink
// =============================================================================

/// Consumer of decoded spot ticks.
pub trait SpotSink: Send {
    /// Receive one tick.
    fn on_spot(&mut self, event: &SpotEvent);
}

impl SpotSink for Vec<SpotEvent> {
    fn on_spot(&mut self, event: &SpotEvent) {
        self.push(*event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_collects_in_order() {
        let mut sink: Vec<SpotEvent> = Vec::new();
        for id in [1, 2] {
            sink.on_spot(&SpotEvent {
                symbol_id: id,
                bid: Some(10),
                ask: None,
                timestamp_millis: None,
            });
        }
        assert_eq!(sink.iter().map(|e| e.symbol_id).collect::<Vec<_>>(), [1, 2]);
    }
}
