//! Domain Layer - Session lifecycle and streaming types.
//!
//! This layer contains the core domain types for the Open API session
//! with no transport or codec dependencies.

/// Session lifecycle states and handshake steps.
pub mod session;

/// Spot tick, resolved symbol and selected account types.
pub mod streaming;
