//! Session Driver
//!
//! The single receive-dispatch loop. It feeds decoded frames to [`Session`],
//! sends whatever the session asks for, hands ticks to the [`SpotSink`] and
//! keeps the connection alive with heartbeats.
//!
//! Frames are processed strictly in arrival order. During the handshake each
//! step is bounded by `step_timeout`; once streaming, decode failures and
//! vendor errors are logged and the loop keeps going.

use std::time::Duration;

use tokio::time::{Instant, error::Elapsed};
use tokio_util::sync::CancellationToken;

use super::codec::JsonCodec;
use super::heartbeat::{
    HeartbeatConfig, HeartbeatEvent, HeartbeatState, HeartbeatTimer, heartbeat_message,
};
use super::messages::ProtoMessage;
use super::session::{Session, SessionAction, SessionError};
use crate::application::ports::{SpotSink, Transport, TransportError};
use crate::domain::session::HandshakeStep;
use crate::infrastructure::metrics;

/// Driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Per-step handshake timeout; `None` waits forever.
    pub step_timeout: Option<Duration>,
    /// Heartbeat settings.
    pub heartbeat: HeartbeatConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            step_timeout: Some(Duration::from_secs(15)),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

/// How a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Cancelled from outside.
    Interrupted,
    /// Server closed the connection while streaming.
    ConnectionClosed,
}

enum LoopEvent {
    Cancelled,
    Heartbeat,
    Frame(Result<Result<Option<String>, TransportError>, Elapsed>),
}

/// Drives one [`Session`] over one [`Transport`].
pub struct SessionDriver<T, S> {
    session: Session,
    transport: T,
    sink: S,
    codec: JsonCodec,
    config: DriverConfig,
    heartbeat: HeartbeatState,
}

impl<T: Transport, S: SpotSink> SessionDriver<T, S> {
    /// Create a driver for a fresh session.
    pub fn new(session: Session, transport: T, sink: S, config: DriverConfig) -> Self {
        Self {
            session,
            transport,
            sink,
            codec: JsonCodec::new(),
            config,
            heartbeat: HeartbeatState::new(),
        }
    }

    /// Session state.
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Spot sink.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Take the parts back.
    pub fn into_parts(self) -> (Session, T, S) {
        (self.session, self.transport, self.sink)
    }

    /// Run the handshake, then stream until closed or cancelled.
    ///
    /// # Errors
    ///
    /// Returns the first terminal [`SessionError`]; the session is `Failed`
    /// afterwards.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<SessionOutcome, SessionError> {
        let started = Instant::now();
        let request = self.session.start()?;
        self.send(&request).await?;
        metrics::set_session_state(self.session.state());

        let mut timer = HeartbeatTimer::new(&self.config.heartbeat);
        let mut deadline_step = self.session.current_step();
        let mut deadline = self.deadline();

        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => LoopEvent::Cancelled,
                () = timer.tick() => LoopEvent::Heartbeat,
                frame = receive_until(&mut self.transport, deadline) => LoopEvent::Frame(frame),
            };

            match event {
                LoopEvent::Cancelled => return Ok(self.interrupt().await),
                LoopEvent::Heartbeat => self.on_heartbeat_tick().await?,
                LoopEvent::Frame(Err(_elapsed)) => {
                    return Err(self.timeout(deadline_step));
                }
                LoopEvent::Frame(Ok(Err(e))) => {
                    tracing::error!(error = %e, state = %self.session.state(), "Transport error");
                    return Err(self.fail(e.into()));
                }
                LoopEvent::Frame(Ok(Ok(None))) => {
                    if self.session.state().is_streaming() {
                        tracing::info!("Connection closed");
                        return Ok(SessionOutcome::ConnectionClosed);
                    }
                    tracing::error!(state = %self.session.state(), "Connection closed during handshake");
                    return Err(self.fail(TransportError::Closed.into()));
                }
                LoopEvent::Frame(Ok(Ok(Some(text)))) => {
                    let was_streaming = self.session.state().is_streaming();
                    self.on_frame(&text).await?;

                    if !was_streaming && self.session.state().is_streaming() {
                        let elapsed = started.elapsed();
                        metrics::record_handshake_duration(elapsed);
                        tracing::info!(
                            symbol = self.session.symbol().map(|s| s.name.as_str()),
                            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                            "Handshake complete, streaming spot events"
                        );
                    }

                    let step = self.session.current_step();
                    if step != deadline_step {
                        deadline_step = step;
                        deadline = self.deadline();
                    }
                }
            }
        }
    }

    fn deadline(&self) -> Option<Instant> {
        if self.session.state().is_streaming() {
            return None;
        }
        self.config.step_timeout.map(|t| Instant::now() + t)
    }

    fn fail(&mut self, error: SessionError) -> SessionError {
        metrics::record_session_failure(error.kind());
        let error = self.session.fail(error);
        metrics::set_session_state(self.session.state());
        error
    }

    fn timeout(&mut self, step: Option<HandshakeStep>) -> SessionError {
        let timeout = self.config.step_timeout.unwrap_or_default();
        let step = step.unwrap_or(HandshakeStep::ApplicationAuth);
        tracing::error!(step = %step, timeout_secs = timeout.as_secs(), "Handshake step timed out");
        self.fail(SessionError::HandshakeTimeout { step, timeout })
    }

    async fn send(&mut self, message: &ProtoMessage) -> Result<(), SessionError> {
        let frame = match self.codec.encode(message) {
            Ok(frame) => frame,
            Err(e) => return Err(self.fail(SessionError::Encode(e))),
        };

        let payload_type = message.payload_type();
        tracing::debug!(payload_type, "Sending request");

        if let Err(e) = self.transport.send(frame).await {
            tracing::error!(error = %e, payload_type, "Send failed");
            return Err(self.fail(e.into()));
        }
        metrics::record_frame_sent(payload_type);
        Ok(())
    }

    async fn on_frame(&mut self, text: &str) -> Result<(), SessionError> {
        self.heartbeat.record_inbound();
        let streaming = self.session.state().is_streaming();

        let (envelope, message) = match self.codec.decode_frame(text) {
            Ok(decoded) => decoded,
            Err(source) => {
                metrics::record_decode_error(streaming);
                if streaming {
                    tracing::warn!(error = %source, raw = %text, "Dropping undecodable frame");
                    return Ok(());
                }
                let step = self.session.current_step();
                return Err(self.fail(SessionError::Decode {
                    step,
                    raw: text.to_string(),
                    source,
                }));
            }
        };

        metrics::record_frame_received(envelope.payload_type);
        if let Some(err) = message.as_error() {
            metrics::record_vendor_error(&err.error_code, !streaming);
        }

        let actions = match self.session.handle(message, &envelope) {
            Ok(actions) => actions,
            Err(e) => {
                metrics::record_session_failure(e.kind());
                metrics::set_session_state(self.session.state());
                return Err(e);
            }
        };

        for action in actions {
            match action {
                SessionAction::Send(request) => self.send(&request).await?,
                SessionAction::Emit(event) => {
                    metrics::record_spot_event();
                    self.sink.on_spot(&event);
                }
            }
        }

        metrics::set_session_state(self.session.state());
        Ok(())
    }

    async fn on_heartbeat_tick(&mut self) -> Result<(), SessionError> {
        if let HeartbeatEvent::SendAndIdle(silent_for) =
            self.heartbeat.on_tick(&self.config.heartbeat)
        {
            tracing::warn!(
                silent_secs = silent_for.as_secs(),
                state = %self.session.state(),
                "No frames received from server"
            );
        }

        self.send(&heartbeat_message()).await?;
        metrics::record_heartbeat_sent();
        Ok(())
    }

    async fn interrupt(&mut self) -> SessionOutcome {
        tracing::info!(state = %self.session.state(), "Interrupted, closing session");

        if let Some(request) = self.session.unsubscribe_request() {
            match self.codec.encode(&request) {
                Ok(frame) => {
                    if let Err(e) = self.transport.send(frame).await {
                        tracing::debug!(error = %e, "Unsubscribe not sent");
                    }
                }
                Err(e) => tracing::debug!(error = %e, "Unsubscribe not encoded"),
            }
        }

        if let Err(e) = self.transport.close().await {
            tracing::debug!(error = %e, "Close failed");
        }
        SessionOutcome::Interrupted
    }
}

async fn receive_until<T: Transport>(
    transport: &mut T,
    deadline: Option<Instant>,
) -> Result<Result<Option<String>, TransportError>, Elapsed> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, transport.receive()).await,
        None => Ok(transport.receive().await),
    }
}
