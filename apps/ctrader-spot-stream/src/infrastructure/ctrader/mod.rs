//! cTrader Open API Adapters
//!
//! Session driver for the Open API JSON WebSocket endpoint:
//!
//! - **Messages / Codec**: payload types and the `payloadType` envelope
//! - **Session**: handshake state machine with single-slot request correlation
//! - **Driver**: receive-dispatch loop with heartbeats and step timeouts
//! - **Transport**: rustls WebSocket connection

pub mod codec;
pub mod driver;
pub mod heartbeat;
pub mod messages;
pub mod session;
pub mod token;
pub mod transport;

pub use codec::{CodecError, Envelope, JsonCodec};
pub use driver::{DriverConfig, SessionDriver, SessionOutcome};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatState, HeartbeatTimer};
pub use messages::{PayloadType, ProtoMessage};
pub use session::{AccountSelection, PendingRequest, Session, SessionAction, SessionError};
pub use token::{TokenError, TokenInfo};
pub use transport::WebSocketTransport;
