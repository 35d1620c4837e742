//! Access Token Diagnostics
//!
//! Access tokens issued by the cTrader OAuth flow are sometimes JWTs. When
//! they are, the header and a fixed subset of claims are decoded so operators
//! can spot an environment or scope mismatch. The token itself is never
//! logged or returned.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};

/// Claims safe to print.
pub const SAFE_CLAIMS: [&str; 9] = [
    "aud",
    "iss",
    "scope",
    "ctid",
    "exp",
    "iat",
    "env",
    "brokerId",
    "accountIds",
];

/// Token inspection errors.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// A segment is not valid base64url.
    #[error("invalid base64 in {segment}: {source}")]
    Base64 {
        /// `header` or `payload`.
        segment: &'static str,
        /// Decoder error.
        source: base64::DecodeError,
    },

    /// A segment is not a JSON object.
    #[error("invalid JSON in {segment}: {source}")]
    Json {
        /// `header` or `payload`.
        segment: &'static str,
        /// Parser error.
        source: serde_json::Error,
    },
}

/// Result of inspecting an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenInfo {
    /// Three-segment JWT with decoded header and safe claims.
    Jwt {
        /// Decoded header.
        header: Value,
        /// Claims from [`SAFE_CLAIMS`] present in the token.
        claims: Map<String, Value>,
    },
    /// Anything else.
    Opaque,
}

/// Inspect an access token.
///
/// # Errors
///
/// Returns an error if the token has three segments that do not decode.
pub fn inspect(token: &str) -> Result<TokenInfo, TokenError> {
    let parts: Vec<&str> = token.split('.').collect();
    let [header, payload, _signature] = parts.as_slice() else {
        return Ok(TokenInfo::Opaque);
    };

    let header = decode_segment("header", header)?;
    let payload = decode_segment("payload", payload)?;

    let claims: Map<String, Value> = SAFE_CLAIMS
        .iter()
        .filter_map(|&key| payload.get(key).map(|v| (key.to_string(), v.clone())))
        .collect();

    Ok(TokenInfo::Jwt { header, claims })
}

fn decode_segment(segment: &'static str, text: &str) -> Result<Value, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(text.trim_end_matches('='))
        .map_err(|source| TokenError::Base64 { segment, source })?;
    serde_json::from_slice(&bytes).map_err(|source| TokenError::Json { segment, source })
}

/// Log the result of [`inspect`].
pub fn log_token_diagnostics(token: &str) {
    match inspect(token) {
        Ok(TokenInfo::Jwt { header, claims }) => {
            let claims = Value::Object(claims);
            tracing::info!(
                header = %header,
                claims = %claims,
                "Access token looks like a JWT"
            );
        }
        Ok(TokenInfo::Opaque) => {
            tracing::info!("Access token is not a JWT; limited introspection available");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Token inspection failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn encode(value: &Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn test_opaque_token() {
        assert_eq!(inspect("abc123").unwrap(), TokenInfo::Opaque);
        assert_eq!(inspect("a.b").unwrap(), TokenInfo::Opaque);
    }

    #[test]
    fn test_jwt_safe_claims_only() {
        let token = format!(
            "{}.{}.sig",
            encode(&json!({"alg": "HS256", "typ": "JWT"})),
            encode(&json!({
                "aud": "openapi",
                "scope": "trading",
                "env": "demo",
                "secret_claim": "do-not-print",
                "brokerId": 7
            }))
        );

        let TokenInfo::Jwt { header, claims } = inspect(&token).unwrap() else {
            panic!("expected JWT");
        };
        assert_eq!(header["alg"], "HS256");
        assert_eq!(claims["scope"], "trading");
        assert_eq!(claims["env"], "demo");
        assert_eq!(claims["brokerId"], 7);
        assert!(!claims.contains_key("accountIds"));
        assert!(!claims.contains_key("secret_claim"));
    }

    #[test]
    fn test_absent_claims_omitted() {
        let token = format!(
            "{}.{}.sig",
            encode(&json!({"alg": "none"})),
            encode(&json!({"iss": "spotware"}))
        );

        let TokenInfo::Jwt { claims, .. } = inspect(&token).unwrap() else {
            panic!("expected JWT");
        };
        assert_eq!(claims.len(), 1);
        assert_eq!(claims["iss"], "spotware");
        for key in SAFE_CLAIMS.iter().filter(|k| **k != "iss") {
            assert!(!claims.contains_key(*key), "{key}");
        }
    }

    #[test]
    fn test_log_token_diagnostics_handles_every_shape() {
        let jwt = format!(
            "{}.{}.sig",
            encode(&json!({"alg": "none"})),
            encode(&json!({"aud": "openapi"}))
        );
        log_token_diagnostics(&jwt);
        log_token_diagnostics("opaque-token");
        log_token_diagnostics("!!!.e30.sig");
    }

    #[test]
    fn test_padded_segments_accepted() {
        let header = format!("{}==", encode(&json!({"alg": "none"})));
        let token = format!("{header}.{}.", encode(&json!({})));
        assert!(matches!(inspect(&token), Ok(TokenInfo::Jwt { .. })));
    }

    #[test]
    fn test_bad_segment_reported() {
        assert!(matches!(
            inspect("!!!.e30.sig"),
            Err(TokenError::Base64 {
                segment: "header",
                ..
            })
        ));
        let token = format!("{}.{}.sig", encode(&json!({})), URL_SAFE_NO_PAD.encode(b"nope"));
        assert!(matches!(
            inspect(&token),
            Err(TokenError::Json {
                segment: "payload",
                ..
            })
        ));
    }
}
