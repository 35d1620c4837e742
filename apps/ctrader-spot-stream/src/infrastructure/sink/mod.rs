//! Spot Sinks
//!
//! [`SpotSink`] adapters: a console printer for the binary and an mpsc
//! forwarder for embedding the driver in a larger program.
//!
//! Prices are printed raw; no instrument digits are applied.

use std::io::Write;

use chrono::SecondsFormat;
use tokio::sync::mpsc;

use crate::application::ports::SpotSink;
use crate::domain::streaming::SpotEvent;
use crate::infrastructure::metrics;

// =============================================================================
// Console Sink
// =============================================================================

/// Prints one line per tick.
///
/// ```text
/// Spot EURUSD: bid=115920 ask=115923 ts=2025-11-11T19:03:29.806Z (1762887809806)
/// ```
#[derive(Debug)]
pub struct ConsoleSink<W> {
    symbol: String,
    out: W,
}

impl ConsoleSink<std::io::Stdout> {
    /// Sink writing to stdout.
    #[must_use]
    pub fn stdout(symbol: impl Into<String>) -> Self {
        Self::new(symbol, std::io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    /// Sink writing to `out`.
    pub fn new(symbol: impl Into<String>, out: W) -> Self {
        Self {
            symbol: symbol.into(),
            out,
        }
    }

    /// Consume the sink and return the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Render one tick line, without the trailing newline.
#[must_use]
pub fn format_spot(symbol: &str, event: &SpotEvent) -> String {
    let side = |v: Option<i64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
    let ts = match (event.timestamp(), event.timestamp_millis) {
        (Some(dt), Some(ms)) => format!(
            "{} ({ms})",
            dt.to_rfc3339_opts(SecondsFormat::Millis, true)
        ),
        (None, Some(ms)) => ms.to_string(),
        _ => "-".to_string(),
    };
    format!(
        "Spot {symbol}: bid={} ask={} ts={ts}",
        side(event.bid),
        side(event.ask)
    )
}

impl<W: Write + Send> SpotSink for ConsoleSink<W> {
    fn on_spot(&mut self, event: &SpotEvent) {
        let line = format_spot(&self.symbol, event);
        if let Err(e) = writeln!(self.out, "{line}").and_then(|()| self.out.flush()) {
            tracing::warn!(error = %e, "Failed to write spot line");
        }
    }
}

// =============================================================================
// Channel Sink
// =============================================================================

/// Forwards ticks into a bounded channel without blocking the driver.
///
/// Ticks that do not fit are dropped and counted.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<SpotEvent>,
    dropped: u64,
}

impl ChannelSink {
    /// Create a sink and its receiving end.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SpotEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Wrap an existing sender.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<SpotEvent>) -> Self {
        Self { tx, dropped: 0 }
    }

    /// Ticks dropped so far.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl SpotSink for ChannelSink {
    fn on_spot(&mut self, event: &SpotEvent) {
        match self.tx.try_send(*event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped += 1;
                metrics::record_spots_dropped(1);
                tracing::warn!(dropped = self.dropped, "Spot consumer lagging, tick dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped += 1;
                metrics::record_spots_dropped(1);
                tracing::debug!("Spot consumer gone, tick dropped");
            }
        }
    }
}
