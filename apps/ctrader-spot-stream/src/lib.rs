#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! cTrader Spot Stream - Open API Session Driver
//!
//! Connects to the cTrader Open API JSON WebSocket endpoint, walks the
//! authentication handshake, resolves one symbol and streams its spot ticks.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Session lifecycle and streaming values
//!   - `session`: Handshake states and steps
//!   - `streaming`: Spot ticks, resolved account and symbol
//!
//! - **Application**: Port definitions
//!   - `ports`: Transport and spot sink interfaces
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `ctrader`: Messages, codec, session state machine, driver, transport
//!   - `sink`: Console and channel spot sinks
//!   - `config`: Environment-based configuration
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//!                ┌───────────┐   frames   ┌────────────┐  ProtoMessage  ┌─────────┐
//! Open API WS ──►│ Transport │───────────►│   Driver   │───────────────►│ Session │
//!             ◄──│           │◄───────────│ (1 loop)   │◄── actions ────│         │
//!                └───────────┘  requests  └─────┬──────┘                └─────────┘
//!                                               │ SpotEvent
//!                                               ▼
//!                                          ┌──────────┐
//!                                          │ SpotSink │
//!                                          └──────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Session lifecycle and streaming types.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::session::{HandshakeStep, SessionState};
pub use domain::streaming::{ResolvedSymbol, SelectedAccount, SpotEvent};

// Ports
pub use application::ports::{SpotSink, Transport, TransportError};

// Session driver
pub use infrastructure::ctrader::{
    AccountSelection, DriverConfig, JsonCodec, PayloadType, ProtoMessage, Session,
    SessionDriver, SessionError, SessionOutcome, WebSocketTransport,
};

// Infrastructure config
pub use infrastructure::config::{AppConfig, ConfigError, Credentials, Environment};

// Sinks
pub use infrastructure::sink::{ChannelSink, ConsoleSink};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
