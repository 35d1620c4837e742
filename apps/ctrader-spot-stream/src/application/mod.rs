//! Application Layer - Port definitions.
//!
//! This layer contains the port interfaces that define how the session
//! driver interacts with the transport and with tick consumers.

/// Port interfaces for external systems (transport, spot sink).
pub mod ports;
