//! Session Lifecycle
//!
//! The handshake is strictly linear: every step issues one request and
//! waits for its paired response before the next step starts.
//!
//! ```text
//! Disconnected → Connected → AppAuthSent → AppAuthenticated
//!   → AccountsRequested → AccountSelected → AccountAuthSent
//!   → AccountAuthenticated → SymbolsRequested → SymbolResolved
//!   → SubscribeSent → Streaming
//! ```
//!
//! Any state may move to `Failed`, which is terminal.

use std::fmt;

// =============================================================================
// Handshake Step
// =============================================================================

/// One request/response exchange of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeStep {
    /// Application-level authentication with client id and secret.
    ApplicationAuth,
    /// Lookup of trading accounts reachable with the access token.
    AccountsLookup,
    /// Account-level authentication for the selected account.
    AccountAuth,
    /// Symbol list lookup for the selected account.
    SymbolsLookup,
    /// Spot subscription for the resolved symbol.
    Subscribe,
}

impl HandshakeStep {
    /// All steps in handshake order.
    pub const ALL: [Self; 5] = [
        Self::ApplicationAuth,
        Self::AccountsLookup,
        Self::AccountAuth,
        Self::SymbolsLookup,
        Self::Subscribe,
    ];

    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ApplicationAuth => "application_auth",
            Self::AccountsLookup => "accounts_lookup",
            Self::AccountAuth => "account_auth",
            Self::SymbolsLookup => "symbols_lookup",
            Self::Subscribe => "subscribe",
        }
    }
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle state of an Open API session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No connection yet.
    #[default]
    Disconnected,
    /// Transport is open, nothing sent.
    Connected,
    /// Application auth request sent.
    AppAuthSent,
    /// Application auth confirmed.
    AppAuthenticated,
    /// Accounts-by-token request sent.
    AccountsRequested,
    /// An account was picked from the accounts response.
    AccountSelected,
    /// Account auth request sent.
    AccountAuthSent,
    /// Account auth confirmed.
    AccountAuthenticated,
    /// Symbols list request sent.
    SymbolsRequested,
    /// Target symbol matched to an id.
    SymbolResolved,
    /// Spot subscription request sent.
    SubscribeSent,
    /// Receiving spot events.
    Streaming,
    /// Terminal failure.
    Failed,
}

impl SessionState {
    /// The successful path, in the order the driver visits it.
    pub const HANDSHAKE_ORDER: [Self; 12] = [
        Self::Disconnected,
        Self::Connected,
        Self::AppAuthSent,
        Self::AppAuthenticated,
        Self::AccountsRequested,
        Self::AccountSelected,
        Self::AccountAuthSent,
        Self::AccountAuthenticated,
        Self::SymbolsRequested,
        Self::SymbolResolved,
        Self::SubscribeSent,
        Self::Streaming,
    ];

    /// Step whose response this state is waiting for, if any.
    #[must_use]
    pub const fn step(&self) -> Option<HandshakeStep> {
        match self {
            Self::AppAuthSent => Some(HandshakeStep::ApplicationAuth),
            Self::AccountsRequested => Some(HandshakeStep::AccountsLookup),
            Self::AccountAuthSent => Some(HandshakeStep::AccountAuth),
            Self::SymbolsRequested => Some(HandshakeStep::SymbolsLookup),
            Self::SubscribeSent => Some(HandshakeStep::Subscribe),
            _ => None,
        }
    }

    /// Check if a handshake response is outstanding.
    #[must_use]
    pub const fn is_awaiting_response(&self) -> bool {
        self.step().is_some()
    }

    /// Check if the session is in the streaming phase.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// Check if the session has failed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connected => "CONNECTED",
            Self::AppAuthSent => "APP_AUTH_SENT",
            Self::AppAuthenticated => "APP_AUTHENTICATED",
            Self::AccountsRequested => "ACCOUNTS_REQUESTED",
            Self::AccountSelected => "ACCOUNT_SELECTED",
            Self::AccountAuthSent => "ACCOUNT_AUTH_SENT",
            Self::AccountAuthenticated => "ACCOUNT_AUTHENTICATED",
            Self::SymbolsRequested => "SYMBOLS_REQUESTED",
            Self::SymbolResolved => "SYMBOL_RESOLVED",
            Self::SubscribeSent => "SUBSCRIBE_SENT",
            Self::Streaming => "STREAMING",
            Self::Failed => "FAILED",
        }
    }

    /// Position on the successful path, used as a metrics gauge value.
    ///
    /// `Failed` maps to `-1`.
    #[must_use]
    pub fn ordinal(&self) -> i32 {
        Self::HANDSHAKE_ORDER
            .iter()
            .position(|s| s == self)
            .and_then(|i| i32::try_from(i).ok())
            .unwrap_or(-1)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
