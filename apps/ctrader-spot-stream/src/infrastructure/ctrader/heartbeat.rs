//! Heartbeat
//!
//! The Open API drops connections that stay silent, so the client sends a
//! `ProtoHeartbeatEvent` (51) on a fixed interval. The same timer checks how
//! long the server has been quiet and reports a silent feed once per silence.
//!
//! Everything here runs inside the driver's single loop, so no state is
//! shared across tasks.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::messages::{HeartbeatEvent as HeartbeatPayload, ProtoMessage};

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between outbound heartbeats (zero disables the timer).
    pub interval: Duration,
    /// Inbound silence after which a warning is logged (zero disables).
    pub idle_warning: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            idle_warning: Duration::from_secs(30),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(interval: Duration, idle_warning: Duration) -> Self {
        Self {
            interval,
            idle_warning,
        }
    }

    /// Configuration with the timer switched off.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Check if outbound heartbeats are sent.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

/// Events produced by a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a heartbeat now.
    Send,
    /// Send a heartbeat; the server has also been silent this long.
    SendAndIdle(Duration),
}

/// Inbound activity tracking.
#[derive(Debug)]
pub struct HeartbeatState {
    last_inbound: Instant,
    idle_reported: bool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new heartbeat state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_inbound: Instant::now(),
            idle_reported: false,
        }
    }

    /// Record that a frame arrived.
    pub fn record_inbound(&mut self) {
        self.last_inbound = Instant::now();
        self.idle_reported = false;
    }

    /// Get the time since the last inbound frame.
    #[must_use]
    pub fn time_since_inbound(&self) -> Duration {
        self.last_inbound.elapsed()
    }

    /// Evaluate a timer tick.
    ///
    /// Silence is reported once; the next inbound frame re-arms it.
    pub fn on_tick(&mut self, config: &HeartbeatConfig) -> HeartbeatEvent {
        let silent_for = self.time_since_inbound();
        if !config.idle_warning.is_zero()
            && silent_for >= config.idle_warning
            && !self.idle_reported
        {
            self.idle_reported = true;
            return HeartbeatEvent::SendAndIdle(silent_for);
        }
        HeartbeatEvent::Send
    }
}

/// Outbound heartbeat message.
#[must_use]
pub fn heartbeat_message() -> ProtoMessage {
    ProtoMessage::Heartbeat(HeartbeatPayload::default())
}

/// Heartbeat timer that never fires when disabled.
#[derive(Debug)]
pub struct HeartbeatTimer {
    interval: Option<Interval>,
}

impl HeartbeatTimer {
    /// Create a timer whose first tick is one interval from now.
    #[must_use]
    pub fn new(config: &HeartbeatConfig) -> Self {
        let interval = config.is_enabled().then(|| {
            let mut interval =
                tokio::time::interval_at(Instant::now() + config.interval, config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        Self { interval }
    }

    /// Wait for the next tick.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.idle_warning, Duration::from_secs(30));
        assert!(config.is_enabled());
        assert!(!HeartbeatConfig::disabled().is_enabled());
    }

    #[test]
    fn test_heartbeat_message_type() {
        assert_eq!(heartbeat_message().payload_type(), 51);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_reported_once_per_silence() {
        let config = HeartbeatConfig::new(Duration::from_secs(10), Duration::from_secs(30));
        let mut state = HeartbeatState::new();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(state.on_tick(&config), HeartbeatEvent::Send);

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(matches!(
            state.on_tick(&config),
            HeartbeatEvent::SendAndIdle(d) if d >= Duration::from_secs(30)
        ));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(state.on_tick(&config), HeartbeatEvent::Send);

        state.record_inbound();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(matches!(
            state.on_tick(&config),
            HeartbeatEvent::SendAndIdle(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_warning_disabled() {
        let config = HeartbeatConfig::new(Duration::from_secs(10), Duration::ZERO);
        let mut state = HeartbeatState::new();
        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(state.on_tick(&config), HeartbeatEvent::Send);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_first_tick_after_one_interval() {
        let config = HeartbeatConfig::new(Duration::from_secs(10), Duration::ZERO);
        let mut timer = HeartbeatTimer::new(&config);
        let start = Instant::now();
        timer.tick().await;
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_timer_never_fires() {
        let mut timer = HeartbeatTimer::new(&HeartbeatConfig::disabled());
        let fired = tokio::time::timeout(Duration::from_secs(3600), timer.tick()).await;
        assert!(fired.is_err());
    }
}
