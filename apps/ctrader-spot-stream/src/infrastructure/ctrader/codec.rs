//! Envelope Codec
//!
//! Encodes and decodes the JSON envelope the Open API uses on its
//! WebSocket endpoint:
//!
//! ```json
//! {"clientMsgId": "5d0c...", "payloadType": 2100, "payload": {"clientId": "..."}}
//! ```
//!
//! The codec is stateless. Unknown payload types decode to
//! [`ProtoMessage::Unknown`]; a known type whose payload violates its schema
//! is a [`CodecError::Payload`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::messages::ProtoMessage;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame is not valid JSON or the envelope fields have the wrong type.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame has no integer `payloadType`.
    #[error("envelope has no payloadType")]
    MissingPayloadType,

    /// Payload does not match the schema of its payload type.
    #[error("invalid payload for payload type {payload_type}: {source}")]
    Payload {
        /// Payload type code from the envelope.
        payload_type: u32,
        /// Underlying deserialization error.
        source: serde_json::Error,
    },
}

/// Wire envelope around every payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Client-chosen id, echoed by the server on responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_msg_id: Option<String>,
    /// Payload type code.
    pub payload_type: u32,
    /// Payload body; empty object when absent.
    #[serde(default = "empty_payload")]
    pub payload: Value,
}

fn empty_payload() -> Value {
    Value::Object(serde_json::Map::new())
}

/// JSON codec for the Open API envelope.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Wrap a message in an envelope with a fresh `clientMsgId`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn envelope(&self, message: &ProtoMessage) -> Result<Envelope, CodecError> {
        Ok(Envelope {
            client_msg_id: Some(Uuid::new_v4().to_string()),
            payload_type: message.payload_type(),
            payload: message.to_payload()?,
        })
    }

    /// Encode a message to a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (should not happen with valid data).
    pub fn encode(&self, message: &ProtoMessage) -> Result<String, CodecError> {
        self.encode_envelope(&self.envelope(message)?)
    }

    /// Encode a prepared envelope to a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode_envelope(&self, envelope: &Envelope) -> Result<String, CodecError> {
        Ok(serde_json::to_string(envelope)?)
    }

    /// Decode a text frame into its envelope without interpreting the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON or lacks a `payloadType`.
    pub fn decode_envelope(&self, text: &str) -> Result<Envelope, CodecError> {
        let value: Value = serde_json::from_str(text)?;

        let has_type = value
            .get("payloadType")
            .is_some_and(|t| t.as_u64().is_some());
        if !has_type {
            return Err(CodecError::MissingPayloadType);
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Interpret an envelope's payload according to its payload type.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload violates the schema of a known type.
    pub fn message(&self, envelope: &Envelope) -> Result<ProtoMessage, CodecError> {
        ProtoMessage::from_payload(envelope.payload_type, envelope.payload.clone()).map_err(
            |source| CodecError::Payload {
                payload_type: envelope.payload_type,
                source,
            },
        )
    }

    /// Decode a text frame into its envelope and typed message.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope or the payload is invalid.
    pub fn decode_frame(&self, text: &str) -> Result<(Envelope, ProtoMessage), CodecError> {
        let envelope = self.decode_envelope(text)?;
        let message = self.message(&envelope)?;
        Ok((envelope, message))
    }

    /// Decode a text frame into a typed message.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope or the payload is invalid.
    pub fn decode(&self, text: &str) -> Result<ProtoMessage, CodecError> {
        self.decode_frame(text).map(|(_, message)| message)
    }
}
