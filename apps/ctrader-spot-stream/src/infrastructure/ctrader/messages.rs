//! cTrader Open API Message Types
//!
//! Wire format types for the JSON flavour of the Open API. Every frame is an
//! envelope `{"clientMsgId", "payloadType", "payload"}` (see
//! [`super::codec::Envelope`]); the payload shape is fixed by the payload type.
//!
//! # Payload Types
//!
//! The integer codes are the vendor's `ProtoOAPayloadType` /
//! `ProtoPayloadType` values and must match exactly.
//!
//! ## Handshake (request / response)
//! - `2100` / `2101`: Application auth
//! - `2149` / `2150`: Accounts by access token
//! - `2102` / `2103`: Account auth
//! - `2114` / `2115`: Symbols list
//! - `2127` / `2128`: Subscribe spots
//! - `2129` / `2130`: Unsubscribe spots
//!
//! ## Unsolicited
//! - `2131`: Spot event
//! - `2142`: Open API error
//! - `2148`: Client disconnect
//! - `50`: Common error
//! - `51`: Heartbeat
//!
//! # References
//!
//! - [Open API messages](https://help.ctrader.com/open-api/messages/)
//! - [JSON endpoint](https://help.ctrader.com/open-api/sending-receiving-json/)

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// =============================================================================
// Payload Type Codes
// =============================================================================

/// Payload type discriminator carried in every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PayloadType {
    /// `ProtoErrorRes`
    CommonErrorRes = 50,
    /// `ProtoHeartbeatEvent`
    HeartbeatEvent = 51,
    /// `ProtoOAApplicationAuthReq`
    ApplicationAuthReq = 2100,
    /// `ProtoOAApplicationAuthRes`
    ApplicationAuthRes = 2101,
    /// `ProtoOAAccountAuthReq`
    AccountAuthReq = 2102,
    /// `ProtoOAAccountAuthRes`
    AccountAuthRes = 2103,
    /// `ProtoOASymbolsListReq`
    SymbolsListReq = 2114,
    /// `ProtoOASymbolsListRes`
    SymbolsListRes = 2115,
    /// `ProtoOASubscribeSpotsReq`
    SubscribeSpotsReq = 2127,
    /// `ProtoOASubscribeSpotsRes`
    SubscribeSpotsRes = 2128,
    /// `ProtoOAUnsubscribeSpotsReq`
    UnsubscribeSpotsReq = 2129,
    /// `ProtoOAUnsubscribeSpotsRes`
    UnsubscribeSpotsRes = 2130,
    /// `ProtoOASpotEvent`
    SpotEvent = 2131,
    /// `ProtoOAErrorRes`
    ErrorRes = 2142,
    /// `ProtoOAClientDisconnectEvent`
    ClientDisconnectEvent = 2148,
    /// `ProtoOAGetAccountListByAccessTokenReq`
    GetAccountsByAccessTokenReq = 2149,
    /// `ProtoOAGetAccountListByAccessTokenRes`
    GetAccountsByAccessTokenRes = 2150,
}

impl PayloadType {
    /// Every known payload type.
    pub const ALL: [Self; 17] = [
        Self::CommonErrorRes,
        Self::HeartbeatEvent,
        Self::ApplicationAuthReq,
        Self::ApplicationAuthRes,
        Self::AccountAuthReq,
        Self::AccountAuthRes,
        Self::SymbolsListReq,
        Self::SymbolsListRes,
        Self::SubscribeSpotsReq,
        Self::SubscribeSpotsRes,
        Self::UnsubscribeSpotsReq,
        Self::UnsubscribeSpotsRes,
        Self::SpotEvent,
        Self::ErrorRes,
        Self::ClientDisconnectEvent,
        Self::GetAccountsByAccessTokenReq,
        Self::GetAccountsByAccessTokenRes,
    ];

    /// Integer code on the wire.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Vendor message name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CommonErrorRes => "ProtoErrorRes",
            Self::HeartbeatEvent => "ProtoHeartbeatEvent",
            Self::ApplicationAuthReq => "ProtoOAApplicationAuthReq",
            Self::ApplicationAuthRes => "ProtoOAApplicationAuthRes",
            Self::AccountAuthReq => "ProtoOAAccountAuthReq",
            Self::AccountAuthRes => "ProtoOAAccountAuthRes",
            Self::SymbolsListReq => "ProtoOASymbolsListReq",
            Self::SymbolsListRes => "ProtoOASymbolsListRes",
            Self::SubscribeSpotsReq => "ProtoOASubscribeSpotsReq",
            Self::SubscribeSpotsRes => "ProtoOASubscribeSpotsRes",
            Self::UnsubscribeSpotsReq => "ProtoOAUnsubscribeSpotsReq",
            Self::UnsubscribeSpotsRes => "ProtoOAUnsubscribeSpotsRes",
            Self::SpotEvent => "ProtoOASpotEvent",
            Self::ErrorRes => "ProtoOAErrorRes",
            Self::ClientDisconnectEvent => "ProtoOAClientDisconnectEvent",
            Self::GetAccountsByAccessTokenReq => "ProtoOAGetAccountListByAccessTokenReq",
            Self::GetAccountsByAccessTokenRes => "ProtoOAGetAccountListByAccessTokenRes",
        }
    }

    /// Check if this is one of the two error response types.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::ErrorRes | Self::CommonErrorRes)
    }
}

impl TryFrom<u32> for PayloadType {
    type Error = u32;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or(code)
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

// =============================================================================
// Field Helpers
// =============================================================================

/// 64-bit integers may arrive as JSON numbers or as decimal strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum IntOrString {
    Int(i64),
    Str(String),
}

impl IntOrString {
    fn into_i64<E: serde::de::Error>(self) -> Result<i64, E> {
        match self {
            Self::Int(v) => Ok(v),
            Self::Str(s) => s.trim().parse().map_err(E::custom),
        }
    }
}

fn de_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    IntOrString::deserialize(d)?.into_i64()
}

fn de_opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Option::<IntOrString>::deserialize(d)?
        .map(IntOrString::into_i64)
        .transpose()
}

/// Repeated fields sometimes collapse to a single object.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

fn de_one_or_many<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Option::<OneOrMany<T>>::deserialize(d)? {
        None => Vec::new(),
        Some(OneOrMany::Many(items)) => items,
        Some(OneOrMany::One(item)) => vec![item],
    })
}

// =============================================================================
// Handshake Requests (Client -> Server)
// =============================================================================

/// Application authentication request.
///
/// # Wire Format (JSON)
/// ```json
/// {"clientId": "...", "clientSecret": "..."}
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationAuthReq {
    /// Application client id.
    pub client_id: String,
    /// Application client secret.
    pub client_secret: String,
}

impl ApplicationAuthReq {
    /// Create a new application auth request.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for ApplicationAuthReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationAuthReq")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Accounts-by-access-token request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAccountsByAccessTokenReq {
    /// OAuth access token.
    pub access_token: String,
}

impl fmt::Debug for GetAccountsByAccessTokenReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetAccountsByAccessTokenReq")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Account authentication request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAuthReq {
    /// Account to authorize.
    #[serde(deserialize_with = "de_i64")]
    pub ctid_trader_account_id: i64,
    /// OAuth access token.
    pub access_token: String,
}

impl fmt::Debug for AccountAuthReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountAuthReq")
            .field("ctid_trader_account_id", &self.ctid_trader_account_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Symbols list request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolsListReq {
    /// Account whose symbols are listed.
    #[serde(deserialize_with = "de_i64")]
    pub ctid_trader_account_id: i64,
    /// Include archived symbols.
    #[serde(default)]
    pub include_archived_symbols: bool,
}

/// Spot subscription request.
///
/// `symbolId` is a repeated field; one id is sent per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeSpotsReq {
    /// Subscribing account.
    #[serde(deserialize_with = "de_i64")]
    pub ctid_trader_account_id: i64,
    /// Symbols to subscribe.
    #[serde(deserialize_with = "de_one_or_many")]
    pub symbol_id: Vec<i64>,
    /// Ask the server to stamp every spot event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe_to_spot_timestamp: Option<bool>,
}

impl SubscribeSpotsReq {
    /// Subscribe one symbol with server timestamps enabled.
    #[must_use]
    pub fn single(ctid_trader_account_id: i64, symbol_id: i64) -> Self {
        Self {
            ctid_trader_account_id,
            symbol_id: vec![symbol_id],
            subscribe_to_spot_timestamp: Some(true),
        }
    }
}

/// Spot unsubscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeSpotsReq {
    /// Subscribed account.
    #[serde(deserialize_with = "de_i64")]
    pub ctid_trader_account_id: i64,
    /// Symbols to drop.
    #[serde(deserialize_with = "de_one_or_many")]
    pub symbol_id: Vec<i64>,
}

// =============================================================================
// Handshake Responses (Server -> Client)
// =============================================================================

/// Application auth confirmation (empty payload).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationAuthRes {}

/// One trading account reachable with the access token.
///
/// # Wire Format (JSON)
/// ```json
/// {"ctidTraderAccountId": 45211659, "isLive": false, "traderLogin": 5123}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtidTraderAccount {
    /// Account id (`accountId` is accepted as well).
    #[serde(
        default,
        alias = "accountId",
        deserialize_with = "de_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub ctid_trader_account_id: Option<i64>,
    /// Live or demo account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_live: Option<bool>,
    /// Broker login number.
    #[serde(
        default,
        deserialize_with = "de_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub trader_login: Option<i64>,
    /// Short broker name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_title_short: Option<String>,
}

/// Accounts-by-access-token response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAccountsByAccessTokenRes {
    /// Scope granted to the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_scope: Option<Value>,
    /// Accounts (`traderAccounts` is accepted as well; may be a single object).
    #[serde(default, alias = "traderAccounts", deserialize_with = "de_one_or_many")]
    pub ctid_trader_account: Vec<CtidTraderAccount>,
}

/// Account auth confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAuthRes {
    /// Authorized account.
    #[serde(
        default,
        deserialize_with = "de_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub ctid_trader_account_id: Option<i64>,
}

/// Symbol record in the symbols list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightSymbol {
    /// Numeric symbol id.
    #[serde(
        default,
        deserialize_with = "de_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub symbol_id: Option<i64>,
    /// Symbol name (`name` is accepted as well).
    #[serde(default, alias = "name", skip_serializing_if = "Option::is_none")]
    pub symbol_name: Option<String>,
    /// Display name, when the broker sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Whether the symbol is tradable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Symbols list response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolsListRes {
    /// Account the list belongs to.
    #[serde(
        default,
        deserialize_with = "de_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub ctid_trader_account_id: Option<i64>,
    /// Symbols (`symbols` is accepted as well).
    #[serde(default, alias = "symbols", deserialize_with = "de_one_or_many")]
    pub symbol: Vec<LightSymbol>,
}

/// Spot subscription confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeSpotsRes {
    /// Subscribed account.
    #[serde(
        default,
        deserialize_with = "de_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub ctid_trader_account_id: Option<i64>,
}

/// Spot unsubscription confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeSpotsRes {
    /// Unsubscribed account.
    #[serde(
        default,
        deserialize_with = "de_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub ctid_trader_account_id: Option<i64>,
}

// =============================================================================
// Unsolicited Messages
// =============================================================================

/// Spot tick pushed after a successful subscription.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "ctidTraderAccountId": 45211659,
///   "symbolId": 1,
///   "bid": 115920,
///   "ask": 115923,
///   "timestamp": 1762887809806
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotEventPayload {
    /// Account the subscription belongs to.
    #[serde(
        default,
        deserialize_with = "de_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub ctid_trader_account_id: Option<i64>,
    /// Symbol id.
    #[serde(deserialize_with = "de_i64")]
    pub symbol_id: i64,
    /// Raw bid, absent when unchanged.
    #[serde(
        default,
        deserialize_with = "de_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub bid: Option<i64>,
    /// Raw ask, absent when unchanged.
    #[serde(
        default,
        deserialize_with = "de_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub ask: Option<i64>,
    /// Previous session close.
    #[serde(
        default,
        deserialize_with = "de_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub session_close: Option<i64>,
    /// Server time in Unix ms (`time` / `timestampInMs` accepted as well).
    #[serde(
        default,
        alias = "time",
        alias = "timestampInMs",
        deserialize_with = "de_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,
}

/// Error response, used for both `ProtoOAErrorRes` and `ProtoErrorRes`.
///
/// # Wire Format (JSON)
/// ```json
/// {"errorCode": "CH_CLIENT_AUTH_FAILURE", "description": "..."}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRes {
    /// Account the error refers to.
    #[serde(
        default,
        deserialize_with = "de_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub ctid_trader_account_id: Option<i64>,
    /// Vendor error code, e.g. `CH_ACCESS_TOKEN_INVALID`.
    #[serde(default)]
    pub error_code: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// End of a maintenance window in Unix ms.
    #[serde(
        default,
        deserialize_with = "de_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub maintenance_end_timestamp: Option<i64>,
}

impl fmt::Display for ErrorRes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {description}", self.error_code),
            None => f.write_str(&self.error_code),
        }
    }
}

/// Keepalive event (empty payload), sent by both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatEvent {}

/// Server notice that it is about to drop the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDisconnectEvent {
    /// Reason given by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// =============================================================================
// Unified Message Enum
// =============================================================================

/// Every message this client sends or understands, keyed by payload type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtoMessage {
    /// `ProtoErrorRes` (50)
    CommonError(ErrorRes),
    /// `ProtoHeartbeatEvent` (51)
    Heartbeat(HeartbeatEvent),
    /// 2100
    ApplicationAuthReq(ApplicationAuthReq),
    /// 2101
    ApplicationAuthRes(ApplicationAuthRes),
    /// 2102
    AccountAuthReq(AccountAuthReq),
    /// 2103
    AccountAuthRes(AccountAuthRes),
    /// 2114
    SymbolsListReq(SymbolsListReq),
    /// 2115
    SymbolsListRes(SymbolsListRes),
    /// 2127
    SubscribeSpotsReq(SubscribeSpotsReq),
    /// 2128
    SubscribeSpotsRes(SubscribeSpotsRes),
    /// 2129
    UnsubscribeSpotsReq(UnsubscribeSpotsReq),
    /// 2130
    UnsubscribeSpotsRes(UnsubscribeSpotsRes),
    /// 2131
    SpotEvent(SpotEventPayload),
    /// `ProtoOAErrorRes` (2142)
    Error(ErrorRes),
    /// 2148
    ClientDisconnect(ClientDisconnectEvent),
    /// 2149
    GetAccountsByAccessTokenReq(GetAccountsByAccessTokenReq),
    /// 2150
    GetAccountsByAccessTokenRes(GetAccountsByAccessTokenRes),
    /// Any payload type this client does not model.
    Unknown {
        /// Raw payload type code.
        payload_type: u32,
        /// Raw payload body.
        payload: Value,
    },
}

impl ProtoMessage {
    /// Known payload type, `None` for [`ProtoMessage::Unknown`].
    #[must_use]
    pub const fn kind(&self) -> Option<PayloadType> {
        Some(match self {
            Self::CommonError(_) => PayloadType::CommonErrorRes,
            Self::Heartbeat(_) => PayloadType::HeartbeatEvent,
            Self::ApplicationAuthReq(_) => PayloadType::ApplicationAuthReq,
            Self::ApplicationAuthRes(_) => PayloadType::ApplicationAuthRes,
            Self::AccountAuthReq(_) => PayloadType::AccountAuthReq,
            Self::AccountAuthRes(_) => PayloadType::AccountAuthRes,
            Self::SymbolsListReq(_) => PayloadType::SymbolsListReq,
            Self::SymbolsListRes(_) => PayloadType::SymbolsListRes,
            Self::SubscribeSpotsReq(_) => PayloadType::SubscribeSpotsReq,
            Self::SubscribeSpotsRes(_) => PayloadType::SubscribeSpotsRes,
            Self::UnsubscribeSpotsReq(_) => PayloadType::UnsubscribeSpotsReq,
            Self::UnsubscribeSpotsRes(_) => PayloadType::UnsubscribeSpotsRes,
            Self::SpotEvent(_) => PayloadType::SpotEvent,
            Self::Error(_) => PayloadType::ErrorRes,
            Self::ClientDisconnect(_) => PayloadType::ClientDisconnectEvent,
            Self::GetAccountsByAccessTokenReq(_) => PayloadType::GetAccountsByAccessTokenReq,
            Self::GetAccountsByAccessTokenRes(_) => PayloadType::GetAccountsByAccessTokenRes,
            Self::Unknown { .. } => return None,
        })
    }

    /// Integer payload type code.
    #[must_use]
    pub fn payload_type(&self) -> u32 {
        match self {
            Self::Unknown { payload_type, .. } => *payload_type,
            known => known.kind().map_or(0, PayloadType::code),
        }
    }

    /// Error payload if this is either error response type.
    #[must_use]
    pub const fn as_error(&self) -> Option<&ErrorRes> {
        match self {
            Self::Error(err) | Self::CommonError(err) => Some(err),
            _ => None,
        }
    }

    /// Serialize the payload body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (should not happen with valid data).
    pub fn to_payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::CommonError(p) | Self::Error(p) => serde_json::to_value(p),
            Self::Heartbeat(p) => serde_json::to_value(p),
            Self::ApplicationAuthReq(p) => serde_json::to_value(p),
            Self::ApplicationAuthRes(p) => serde_json::to_value(p),
            Self::AccountAuthReq(p) => serde_json::to_value(p),
            Self::AccountAuthRes(p) => serde_json::to_value(p),
            Self::SymbolsListReq(p) => serde_json::to_value(p),
            Self::SymbolsListRes(p) => serde_json::to_value(p),
            Self::SubscribeSpotsReq(p) => serde_json::to_value(p),
            Self::SubscribeSpotsRes(p) => serde_json::to_value(p),
            Self::UnsubscribeSpotsReq(p) => serde_json::to_value(p),
            Self::UnsubscribeSpotsRes(p) => serde_json::to_value(p),
            Self::SpotEvent(p) => serde_json::to_value(p),
            Self::ClientDisconnect(p) => serde_json::to_value(p),
            Self::GetAccountsByAccessTokenReq(p) => serde_json::to_value(p),
            Self::GetAccountsByAccessTokenRes(p) => serde_json::to_value(p),
            Self::Unknown { payload, .. } => Ok(payload.clone()),
        }
    }

    /// Build a typed message from a payload type code and payload body.
    ///
    /// Unknown codes are kept as [`ProtoMessage::Unknown`].
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match the schema of a known
    /// payload type.
    pub fn from_payload(payload_type: u32, payload: Value) -> Result<Self, serde_json::Error> {
        let Ok(kind) = PayloadType::try_from(payload_type) else {
            return Ok(Self::Unknown {
                payload_type,
                payload,
            });
        };

        Ok(match kind {
            PayloadType::CommonErrorRes => Self::CommonError(serde_json::from_value(payload)?),
            PayloadType::HeartbeatEvent => Self::Heartbeat(serde_json::from_value(payload)?),
            PayloadType::ApplicationAuthReq => {
                Self::ApplicationAuthReq(serde_json::from_value(payload)?)
            }
            PayloadType::ApplicationAuthRes => {
                Self::ApplicationAuthRes(serde_json::from_value(payload)?)
            }
            PayloadType::AccountAuthReq => Self::AccountAuthReq(serde_json::from_value(payload)?),
            PayloadType::AccountAuthRes => Self::AccountAuthRes(serde_json::from_value(payload)?),
            PayloadType::SymbolsListReq => Self::SymbolsListReq(serde_json::from_value(payload)?),
            PayloadType::SymbolsListRes => Self::SymbolsListRes(serde_json::from_value(payload)?),
            PayloadType::SubscribeSpotsReq => {
                Self::SubscribeSpotsReq(serde_json::from_value(payload)?)
            }
            PayloadType::SubscribeSpotsRes => {
                Self::SubscribeSpotsRes(serde_json::from_value(payload)?)
            }
            PayloadType::UnsubscribeSpotsReq => {
                Self::UnsubscribeSpotsReq(serde_json::from_value(payload)?)
            }
            PayloadType::UnsubscribeSpotsRes => {
                Self::UnsubscribeSpotsRes(serde_json::from_value(payload)?)
            }
            PayloadType::SpotEvent => Self::SpotEvent(serde_json::from_value(payload)?),
            PayloadType::ErrorRes => Self::Error(serde_json::from_value(payload)?),
            PayloadType::ClientDisconnectEvent => {
                Self::ClientDisconnect(serde_json::from_value(payload)?)
            }
            PayloadType::GetAccountsByAccessTokenReq => {
                Self::GetAccountsByAccessTokenReq(serde_json::from_value(payload)?)
            }
            PayloadType::GetAccountsByAccessTokenRes => {
                Self::GetAccountsByAccessTokenRes(serde_json::from_value(payload)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn payload_type_codes_are_exact() {
        assert_eq!(PayloadType::CommonErrorRes.code(), 50);
        assert_eq!(PayloadType::HeartbeatEvent.code(), 51);
        assert_eq!(PayloadType::ApplicationAuthReq.code(), 2100);
        assert_eq!(PayloadType::ApplicationAuthRes.code(), 2101);
        assert_eq!(PayloadType::AccountAuthReq.code(), 2102);
        assert_eq!(PayloadType::AccountAuthRes.code(), 2103);
        assert_eq!(PayloadType::SymbolsListReq.code(), 2114);
        assert_eq!(PayloadType::SymbolsListRes.code(), 2115);
        assert_eq!(PayloadType::SubscribeSpotsReq.code(), 2127);
        assert_eq!(PayloadType::SubscribeSpotsRes.code(), 2128);
        assert_eq!(PayloadType::UnsubscribeSpotsReq.code(), 2129);
        assert_eq!(PayloadType::UnsubscribeSpotsRes.code(), 2130);
        assert_eq!(PayloadType::SpotEvent.code(), 2131);
        assert_eq!(PayloadType::ErrorRes.code(), 2142);
        assert_eq!(PayloadType::ClientDisconnectEvent.code(), 2148);
        assert_eq!(PayloadType::GetAccountsByAccessTokenReq.code(), 2149);
        assert_eq!(PayloadType::GetAccountsByAccessTokenRes.code(), 2150);
    }

    #[test]
    fn payload_type_try_from() {
        for kind in PayloadType::ALL {
            assert_eq!(PayloadType::try_from(kind.code()), Ok(kind));
        }
        assert_eq!(PayloadType::try_from(2126), Err(2126));
    }

    #[test]
    fn error_types() {
        assert!(PayloadType::ErrorRes.is_error());
        assert!(PayloadType::CommonErrorRes.is_error());
        assert!(!PayloadType::SpotEvent.is_error());
    }

    #[test]
    fn accounts_under_either_key_and_shape() {
        let canonical: GetAccountsByAccessTokenRes = serde_json::from_value(json!({
            "ctidTraderAccount": [{"ctidTraderAccountId": 45_211_659, "isLive": false}]
        }))
        .unwrap();
        let aliased: GetAccountsByAccessTokenRes = serde_json::from_value(json!({
            "traderAccounts": [{"accountId": "45211659", "isLive": false}]
        }))
        .unwrap();
        let single: GetAccountsByAccessTokenRes = serde_json::from_value(json!({
            "ctidTraderAccount": {"ctidTraderAccountId": 45_211_659, "isLive": false}
        }))
        .unwrap();

        assert_eq!(canonical, aliased);
        assert_eq!(canonical, single);
        assert_eq!(
            canonical.ctid_trader_account[0].ctid_trader_account_id,
            Some(45_211_659)
        );
    }

    #[test]
    fn accounts_missing_is_empty() {
        let res: GetAccountsByAccessTokenRes =
            serde_json::from_value(json!({"permissionScope": "SCOPE_VIEW"})).unwrap();
        assert!(res.ctid_trader_account.is_empty());
    }

    #[test]
    fn symbols_under_either_key() {
        let res: SymbolsListRes = serde_json::from_value(json!({
            "symbols": [{"symbolId": 1, "name": "EURUSD"}]
        }))
        .unwrap();
        assert_eq!(res.symbol.len(), 1);
        assert_eq!(res.symbol[0].symbol_name.as_deref(), Some("EURUSD"));
        assert_eq!(res.symbol[0].symbol_id, Some(1));
    }

    #[test]
    fn spot_event_optional_sides() {
        let spot: SpotEventPayload = serde_json::from_value(json!({
            "symbolId": 1,
            "ask": 115_923,
            "timestampInMs": 1_762_887_809_806_i64
        }))
        .unwrap();
        assert_eq!(spot.bid, None);
        assert_eq!(spot.ask, Some(115_923));
        assert_eq!(spot.timestamp, Some(1_762_887_809_806));
    }

    #[test]
    fn spot_event_requires_symbol_id() {
        let result = serde_json::from_value::<SpotEventPayload>(json!({"bid": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn subscribe_request_sends_symbol_list() {
        let req = SubscribeSpotsReq::single(45_211_659, 1);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({
                "ctidTraderAccountId": 45_211_659,
                "symbolId": [1],
                "subscribeToSpotTimestamp": true
            })
        );
    }

    #[test]
    fn request_debug_redacts_secrets() {
        let req = ApplicationAuthReq::new("client", "very_secret");
        let debug = format!("{req:?}");
        assert!(debug.contains("client"));
        assert!(!debug.contains("very_secret"));

        let req = AccountAuthReq {
            ctid_trader_account_id: 1,
            access_token: "token_value".to_string(),
        };
        assert!(!format!("{req:?}").contains("token_value"));
    }

    #[test]
    fn unknown_payload_type_is_preserved() {
        let msg = ProtoMessage::from_payload(2126, json!({"x": 1})).unwrap();
        assert_eq!(msg.payload_type(), 2126);
        assert!(msg.kind().is_none());
        assert_eq!(msg.to_payload().unwrap(), json!({"x": 1}));
    }

    #[test]
    fn error_display() {
        let err = ErrorRes {
            error_code: "CH_ACCESS_TOKEN_INVALID".to_string(),
            description: Some("Invalid access token".to_string()),
            ..Default::default()
        };
        assert_eq!(
            err.to_string(),
            "CH_ACCESS_TOKEN_INVALID: Invalid access token"
        );
    }
}
