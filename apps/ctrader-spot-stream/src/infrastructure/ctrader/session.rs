//! Session State Machine
//!
//! Owns the ordered handshake and the correlation of inbound messages to the
//! single outstanding request.
//!
//! The Open API pairs requests and responses by payload type only, so at most
//! one request is in flight while the handshake runs. [`PendingRequest`] is
//! that single slot: it records the response type that completes the current
//! step together with whatever the step needs to process it.
//!
//! # Handshake
//!
//! ```text
//! APP_AUTH_SENT        --2101-->  APP_AUTHENTICATED      (send 2149)
//! ACCOUNTS_REQUESTED   --2150-->  ACCOUNT_SELECTED       (send 2102)
//! ACCOUNT_AUTH_SENT    --2103-->  ACCOUNT_AUTHENTICATED  (send 2114)
//! SYMBOLS_REQUESTED    --2115-->  SYMBOL_RESOLVED        (send 2127)
//! SUBSCRIBE_SENT       --2128 or 2131-->  STREAMING
//! ```
//!
//! While a request is pending, error responses (2142, 50) fail the session
//! and every other message is ignored. Once streaming, spot events for the
//! subscribed symbol are emitted and nothing else changes state.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use super::codec::{CodecError, Envelope};
use super::messages::{
    AccountAuthReq, ApplicationAuthReq, ErrorRes, GetAccountsByAccessTokenReq,
    GetAccountsByAccessTokenRes, LightSymbol, PayloadType, ProtoMessage, SpotEventPayload,
    SubscribeSpotsReq, SymbolsListReq, UnsubscribeSpotsReq,
};
use crate::application::ports::TransportError;
use crate::domain::session::{HandshakeStep, SessionState};
use crate::domain::streaming::{ResolvedSymbol, SelectedAccount, SpotEvent};
use crate::infrastructure::config::Credentials;

// =============================================================================
// Errors
// =============================================================================

/// Terminal session failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport failed or closed before streaming.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Outbound message could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[source] CodecError),

    /// Inbound frame could not be decoded during the handshake.
    #[error("failed to decode frame during {}: {source}; raw: {raw}", step_label(.step))]
    Decode {
        /// Step in flight.
        step: Option<HandshakeStep>,
        /// Raw frame text.
        raw: String,
        /// Codec failure.
        source: CodecError,
    },

    /// Server answered with an error response in place of the expected one.
    #[error(
        "{} failed: server returned payload type {payload_type} {error_code}{}; payload: {raw}",
        step_label(.step),
        .description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default()
    )]
    Protocol {
        /// Step in flight.
        step: Option<HandshakeStep>,
        /// Payload type of the error response.
        payload_type: u32,
        /// Vendor error code.
        error_code: String,
        /// Vendor description.
        description: Option<String>,
        /// Raw payload.
        raw: String,
    },

    /// The access token reaches no trading accounts.
    #[error(
        "{step} failed: no accounts returned for the access token (permission scope: {}); payload type {payload_type}, payload: {raw}",
        .permission_scope.as_deref().unwrap_or("unknown")
    )]
    NoAccounts {
        /// Step whose response was empty.
        step: HandshakeStep,
        /// Payload type of the response.
        payload_type: u32,
        /// Scope reported by the server, if any.
        permission_scope: Option<String>,
        /// Raw payload.
        raw: String,
    },

    /// The configured account id is not among the token's accounts.
    #[error(
        "{step} failed: account {id} not returned for the access token (available: {available:?}); payload type {payload_type}, payload: {raw}"
    )]
    AccountNotFound {
        /// Step whose response lacked the account.
        step: HandshakeStep,
        /// Payload type of the response.
        payload_type: u32,
        /// Configured account id.
        id: i64,
        /// Ids the server returned.
        available: Vec<i64>,
        /// Raw payload.
        raw: String,
    },

    /// The target symbol is not in the account's symbol list.
    #[error(
        "{step} failed: symbol '{symbol}' not found among {available} symbols; payload type {payload_type}, payload: {raw}"
    )]
    SymbolNotFound {
        /// Step whose response lacked the symbol.
        step: HandshakeStep,
        /// Payload type of the response.
        payload_type: u32,
        /// Configured symbol name.
        symbol: String,
        /// Number of symbols the server returned.
        available: usize,
        /// Raw payload.
        raw: String,
    },

    /// A response lacks a field the next step needs.
    #[error("{step} response is missing {field}: {raw}")]
    MissingField {
        /// Step whose response was incomplete.
        step: HandshakeStep,
        /// Missing field name.
        field: &'static str,
        /// Raw record or payload.
        raw: String,
    },

    /// No response arrived within the per-step timeout.
    #[error("{step} timed out after {}s", .timeout.as_secs())]
    HandshakeTimeout {
        /// Step in flight.
        step: HandshakeStep,
        /// Configured timeout.
        timeout: Duration,
    },

    /// Operation not valid in the current state.
    #[error("unexpected session state {state}")]
    UnexpectedState {
        /// Current state.
        state: SessionState,
    },
}

#[allow(clippy::ref_option)]
fn step_label(step: &Option<HandshakeStep>) -> &'static str {
    step.map_or("session", |s| s.as_str())
}

const NO_ACCOUNTS_HINT: &str = "\
Tips:
- Ensure CTRADER_ENV matches your token (demo vs live are separate).
- Use a LIVE access token when CTRADER_ENV=live. Demo tokens won't work on live.
- Confirm your OAuth scopes include 'accounts' or 'trading'.
- Verify the token belongs to the cTID owning the target account.
- Some brokers may restrict Open API; confirm your broker enables it.
- Regenerate the token via OAuth and re-test.
  Auth guide: https://help.ctrader.com/open-api/account-authentication/
  Endpoints: https://help.ctrader.com/open-api/proxies-endpoints/";

const SYMBOL_NOT_FOUND_HINT: &str =
    "Tip: ensure the symbol exists and is available for this account (check CTRADER_SYMBOL).";

const ACCOUNT_NOT_FOUND_HINT: &str =
    "Tip: unset CTRADER_ACCOUNT_ID to use the first account, or pick one of the listed ids.";

const TIMEOUT_HINT: &str =
    "Tip: check that CTRADER_ENV points at the environment your credentials belong to.";

impl SessionError {
    /// Operator guidance for configuration problems.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NoAccounts { .. } => Some(NO_ACCOUNTS_HINT),
            Self::SymbolNotFound { .. } => Some(SYMBOL_NOT_FOUND_HINT),
            Self::AccountNotFound { .. } => Some(ACCOUNT_NOT_FOUND_HINT),
            Self::HandshakeTimeout { .. } => Some(TIMEOUT_HINT),
            _ => None,
        }
    }

    /// Stable label used in metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Encode(_) => "encode",
            Self::Decode { .. } => "decode",
            Self::Protocol { .. } => "protocol",
            Self::NoAccounts { .. } => "no_accounts",
            Self::AccountNotFound { .. } => "account_not_found",
            Self::SymbolNotFound { .. } => "symbol_not_found",
            Self::MissingField { .. } => "missing_field",
            Self::HandshakeTimeout { .. } => "handshake_timeout",
            Self::UnexpectedState { .. } => "unexpected_state",
        }
    }
}

// =============================================================================
// Pending Request
// =============================================================================

/// The single outstanding handshake request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingRequest {
    /// Waiting for application auth confirmation.
    ApplicationAuth,
    /// Waiting for the token's account list.
    Accounts,
    /// Waiting for account auth confirmation.
    AccountAuth {
        /// Account being authorized.
        account_id: i64,
    },
    /// Waiting for the symbol list.
    Symbols {
        /// Authorized account.
        account_id: i64,
        /// Name to look up.
        target: String,
    },
    /// Waiting for subscription confirmation or the first tick.
    Subscribe {
        /// Authorized account.
        account_id: i64,
        /// Subscribed symbol.
        symbol: ResolvedSymbol,
    },
}

impl PendingRequest {
    /// Response type that completes this request.
    #[must_use]
    pub const fn expected(&self) -> PayloadType {
        match self {
            Self::ApplicationAuth => PayloadType::ApplicationAuthRes,
            Self::Accounts => PayloadType::GetAccountsByAccessTokenRes,
            Self::AccountAuth { .. } => PayloadType::AccountAuthRes,
            Self::Symbols { .. } => PayloadType::SymbolsListRes,
            Self::Subscribe { .. } => PayloadType::SubscribeSpotsRes,
        }
    }

    /// Handshake step this request belongs to.
    #[must_use]
    pub const fn step(&self) -> HandshakeStep {
        match self {
            Self::ApplicationAuth => HandshakeStep::ApplicationAuth,
            Self::Accounts => HandshakeStep::AccountsLookup,
            Self::AccountAuth { .. } => HandshakeStep::AccountAuth,
            Self::Symbols { .. } => HandshakeStep::SymbolsLookup,
            Self::Subscribe { .. } => HandshakeStep::Subscribe,
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// How to pick an account from the accounts response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccountSelection {
    /// First account in the list.
    #[default]
    First,
    /// Account with this `ctidTraderAccountId`.
    Id(i64),
}

impl fmt::Display for AccountSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Output of one state machine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Send this request.
    Send(ProtoMessage),
    /// Hand this tick to the sink.
    Emit(SpotEvent),
}

impl From<&SpotEventPayload> for SpotEvent {
    fn from(payload: &SpotEventPayload) -> Self {
        Self {
            symbol_id: payload.symbol_id,
            bid: payload.bid,
            ask: payload.ask,
            timestamp_millis: payload.timestamp,
        }
    }
}

/// Open API session state.
///
/// Mutated only through [`Session::start`], [`Session::handle`] and
/// [`Session::fail`]; every state entered is appended to the history.
#[derive(Debug)]
pub struct Session {
    credentials: Credentials,
    target_symbol: String,
    account_selection: AccountSelection,
    state: SessionState,
    pending: Option<PendingRequest>,
    account: Option<SelectedAccount>,
    symbol: Option<ResolvedSymbol>,
    history: Vec<SessionState>,
    subscription_confirmed: bool,
}

impl Session {
    /// Create a disconnected session.
    #[must_use]
    pub fn new(
        credentials: Credentials,
        target_symbol: impl Into<String>,
        account_selection: AccountSelection,
    ) -> Self {
        Self {
            credentials,
            target_symbol: target_symbol.into(),
            account_selection,
            state: SessionState::Disconnected,
            pending: None,
            account: None,
            symbol: None,
            history: vec![SessionState::Disconnected],
            subscription_confirmed: false,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Every state entered so far, starting with `Disconnected`.
    #[must_use]
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Outstanding request, if any.
    #[must_use]
    pub const fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    /// Step in flight, if any.
    #[must_use]
    pub fn current_step(&self) -> Option<HandshakeStep> {
        self.pending.as_ref().map(PendingRequest::step)
    }

    /// Selected account, once known.
    #[must_use]
    pub const fn account(&self) -> Option<SelectedAccount> {
        self.account
    }

    /// Resolved symbol, once known.
    #[must_use]
    pub const fn symbol(&self) -> Option<&ResolvedSymbol> {
        self.symbol.as_ref()
    }

    /// Configured symbol name.
    #[must_use]
    pub fn target_symbol(&self) -> &str {
        &self.target_symbol
    }

    /// Whether the server has confirmed the subscription.
    #[must_use]
    pub const fn subscription_confirmed(&self) -> bool {
        self.subscription_confirmed
    }

    /// Mark the transport open and issue application auth.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedState` unless the session is disconnected.
    pub fn start(&mut self) -> Result<ProtoMessage, SessionError> {
        if self.state != SessionState::Disconnected {
            return Err(SessionError::UnexpectedState { state: self.state });
        }
        self.transition(SessionState::Connected);
        let request = ProtoMessage::ApplicationAuthReq(ApplicationAuthReq::new(
            self.credentials.client_id(),
            self.credentials.client_secret(),
        ));
        Ok(self.request(PendingRequest::ApplicationAuth, request))
    }

    /// Process one decoded inbound message.
    ///
    /// # Errors
    ///
    /// Any handshake failure. The session is `Failed` afterwards.
    pub fn handle(
        &mut self,
        message: ProtoMessage,
        envelope: &Envelope,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if self.state.is_streaming() {
            return Ok(self.handle_streaming(message));
        }

        let Some(pending) = self.pending.take() else {
            return Err(self.fail(SessionError::UnexpectedState { state: self.state }));
        };

        self.handle_pending(pending, message, envelope)
            .map_err(|err| self.fail(err))
    }

    /// Move to `Failed` and hand the error back.
    pub fn fail(&mut self, error: SessionError) -> SessionError {
        if !self.state.is_terminal() {
            tracing::debug!(state = %self.state, error = %error, "Session failed");
            self.pending = None;
            self.transition(SessionState::Failed);
        }
        error
    }

    /// Request that drops the spot subscription, when streaming.
    #[must_use]
    pub fn unsubscribe_request(&self) -> Option<ProtoMessage> {
        if !self.state.is_streaming() {
            return None;
        }
        let (account, symbol) = (self.account?, self.symbol.as_ref()?);
        Some(ProtoMessage::UnsubscribeSpotsReq(UnsubscribeSpotsReq {
            ctid_trader_account_id: account.id,
            symbol_id: vec![symbol.id],
        }))
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = %self.state, to = %next, "Session state");
        self.state = next;
        self.history.push(next);
    }

    fn request(&mut self, pending: PendingRequest, message: ProtoMessage) -> ProtoMessage {
        let next = match pending {
            PendingRequest::ApplicationAuth => SessionState::AppAuthSent,
            PendingRequest::Accounts => SessionState::AccountsRequested,
            PendingRequest::AccountAuth { .. } => SessionState::AccountAuthSent,
            PendingRequest::Symbols { .. } => SessionState::SymbolsRequested,
            PendingRequest::Subscribe { .. } => SessionState::SubscribeSent,
        };
        self.pending = Some(pending);
        self.transition(next);
        message
    }

    fn handle_pending(
        &mut self,
        pending: PendingRequest,
        message: ProtoMessage,
        envelope: &Envelope,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let payload_type = message.payload_type();

        match (pending, message) {
            (PendingRequest::ApplicationAuth, ProtoMessage::ApplicationAuthRes(_)) => {
                tracing::info!("Application auth OK");
                self.transition(SessionState::AppAuthenticated);
                let request = ProtoMessage::GetAccountsByAccessTokenReq(
                    GetAccountsByAccessTokenReq {
                        access_token: self.credentials.access_token().to_string(),
                    },
                );
                Ok(vec![SessionAction::Send(
                    self.request(PendingRequest::Accounts, request),
                )])
            }

            (PendingRequest::Accounts, ProtoMessage::GetAccountsByAccessTokenRes(res)) => {
                tracing::info!(count = res.ctid_trader_account.len(), "Accounts response");
                let account = self.select_account(&res, envelope)?;
                tracing::info!(account_id = account.id, is_live = ?account.is_live, "Using account");
                self.account = Some(account);
                self.transition(SessionState::AccountSelected);
                let request = ProtoMessage::AccountAuthReq(AccountAuthReq {
                    ctid_trader_account_id: account.id,
                    access_token: self.credentials.access_token().to_string(),
                });
                Ok(vec![SessionAction::Send(self.request(
                    PendingRequest::AccountAuth {
                        account_id: account.id,
                    },
                    request,
                ))])
            }

            (PendingRequest::AccountAuth { account_id }, ProtoMessage::AccountAuthRes(_)) => {
                tracing::info!(account_id, "Account auth OK");
                self.transition(SessionState::AccountAuthenticated);
                let request = ProtoMessage::SymbolsListReq(SymbolsListReq {
                    ctid_trader_account_id: account_id,
                    include_archived_symbols: false,
                });
                let pending = PendingRequest::Symbols {
                    account_id,
                    target: self.target_symbol.clone(),
                };
                Ok(vec![SessionAction::Send(self.request(pending, request))])
            }

            (
                PendingRequest::Symbols { account_id, target },
                ProtoMessage::SymbolsListRes(res),
            ) => {
                let record = find_symbol(&target, &res.symbol).ok_or_else(|| {
                    SessionError::SymbolNotFound {
                        step: HandshakeStep::SymbolsLookup,
                        payload_type: envelope.payload_type,
                        symbol: target.clone(),
                        available: res.symbol.len(),
                        raw: envelope.payload.to_string(),
                    }
                })?;
                let id = record.symbol_id.ok_or_else(|| SessionError::MissingField {
                    step: HandshakeStep::SymbolsLookup,
                    field: "symbolId",
                    raw: to_raw(record),
                })?;
                let symbol = ResolvedSymbol {
                    id,
                    name: record
                        .symbol_name
                        .clone()
                        .or_else(|| record.display_name.clone())
                        .unwrap_or(target),
                };
                tracing::info!(symbol = %symbol.name, symbol_id = id, "Found symbol");
                self.symbol = Some(symbol.clone());
                self.transition(SessionState::SymbolResolved);
                let request = ProtoMessage::SubscribeSpotsReq(SubscribeSpotsReq::single(
                    account_id, id,
                ));
                let pending = PendingRequest::Subscribe { account_id, symbol };
                Ok(vec![SessionAction::Send(self.request(pending, request))])
            }

            (PendingRequest::Subscribe { symbol, .. }, ProtoMessage::SubscribeSpotsRes(_)) => {
                tracing::info!(symbol = %symbol.name, symbol_id = symbol.id, "Subscribe confirmed");
                self.subscription_confirmed = true;
                self.transition(SessionState::Streaming);
                Ok(Vec::new())
            }

            (PendingRequest::Subscribe { symbol, .. }, ProtoMessage::SpotEvent(spot))
                if spot.symbol_id == symbol.id =>
            {
                tracing::info!(
                    symbol = %symbol.name,
                    symbol_id = symbol.id,
                    "Spot event before subscribe confirmation, streaming"
                );
                self.transition(SessionState::Streaming);
                Ok(vec![SessionAction::Emit(SpotEvent::from(&spot))])
            }

            (pending, ProtoMessage::Error(err) | ProtoMessage::CommonError(err)) => {
                Err(protocol_error(Some(pending.step()), payload_type, err, envelope))
            }

            (pending, other) => {
                tracing::debug!(
                    payload_type,
                    expected = pending.expected().code(),
                    step = %pending.step(),
                    heartbeat = matches!(other, ProtoMessage::Heartbeat(_)),
                    "Ignoring message while awaiting response"
                );
                self.pending = Some(pending);
                Ok(Vec::new())
            }
        }
    }

    fn handle_streaming(&mut self, message: ProtoMessage) -> Vec<SessionAction> {
        let subscribed = self.symbol.as_ref().map(|s| s.id);

        match message {
            ProtoMessage::SpotEvent(spot) if Some(spot.symbol_id) == subscribed => {
                vec![SessionAction::Emit(SpotEvent::from(&spot))]
            }
            ProtoMessage::SpotEvent(spot) => {
                tracing::debug!(symbol_id = spot.symbol_id, "Ignoring spot event for other symbol");
                Vec::new()
            }
            ProtoMessage::SubscribeSpotsRes(_) if !self.subscription_confirmed => {
                self.subscription_confirmed = true;
                tracing::info!(symbol_id = ?subscribed, "Subscribe confirmed");
                Vec::new()
            }
            ProtoMessage::SubscribeSpotsRes(_) => {
                tracing::debug!("Duplicate subscribe confirmation");
                Vec::new()
            }
            ProtoMessage::Error(err) | ProtoMessage::CommonError(err) => {
                tracing::warn!(
                    error_code = %err.error_code,
                    description = ?err.description,
                    "Error event while streaming"
                );
                Vec::new()
            }
            ProtoMessage::ClientDisconnect(event) => {
                tracing::warn!(reason = ?event.reason, "Server announced disconnect");
                Vec::new()
            }
            ProtoMessage::Heartbeat(_) => {
                tracing::trace!("Heartbeat");
                Vec::new()
            }
            other => {
                tracing::debug!(payload_type = other.payload_type(), "Ignoring message");
                Vec::new()
            }
        }
    }

    fn select_account(
        &self,
        res: &GetAccountsByAccessTokenRes,
        envelope: &Envelope,
    ) -> Result<SelectedAccount, SessionError> {
        if res.ctid_trader_account.is_empty() {
            return Err(SessionError::NoAccounts {
                step: HandshakeStep::AccountsLookup,
                payload_type: envelope.payload_type,
                permission_scope: res.permission_scope.as_ref().map(scope_label),
                raw: envelope.payload.to_string(),
            });
        }

        let record = match self.account_selection {
            AccountSelection::First => &res.ctid_trader_account[0],
            AccountSelection::Id(id) => res
                .ctid_trader_account
                .iter()
                .find(|a| a.ctid_trader_account_id == Some(id))
                .ok_or_else(|| SessionError::AccountNotFound {
                    step: HandshakeStep::AccountsLookup,
                    payload_type: envelope.payload_type,
                    id,
                    available: res
                        .ctid_trader_account
                        .iter()
                        .filter_map(|a| a.ctid_trader_account_id)
                        .collect(),
                    raw: envelope.payload.to_string(),
                })?,
        };

        let id = record
            .ctid_trader_account_id
            .ok_or_else(|| SessionError::MissingField {
                step: HandshakeStep::AccountsLookup,
                field: "ctidTraderAccountId",
                raw: to_raw(record),
            })?;

        Ok(SelectedAccount {
            id,
            is_live: record.is_live,
        })
    }
}

/// Find `target` in a symbol list.
///
/// Exact match on `symbolName` or `displayName` first, then the same
/// comparison ignoring case.
#[must_use]
pub fn find_symbol<'a>(target: &str, symbols: &'a [LightSymbol]) -> Option<&'a LightSymbol> {
    let names = |s: &'a LightSymbol| {
        [s.symbol_name.as_deref(), s.display_name.as_deref()]
            .into_iter()
            .flatten()
    };

    symbols
        .iter()
        .find(|s| names(s).any(|n| n == target))
        .or_else(|| {
            let upper = target.to_uppercase();
            symbols
                .iter()
                .find(|s| names(s).any(|n| n.to_uppercase() == upper))
        })
}

fn protocol_error(
    step: Option<HandshakeStep>,
    payload_type: u32,
    err: ErrorRes,
    envelope: &Envelope,
) -> SessionError {
    SessionError::Protocol {
        step,
        payload_type,
        error_code: err.error_code,
        description: err.description,
        raw: envelope.payload.to_string(),
    }
}

fn scope_label(scope: &Value) -> String {
    match scope {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_raw<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
