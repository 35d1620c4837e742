//! Session Configuration Settings
//!
//! Configuration types for the spot stream client, loaded from environment
//! variables.

use std::time::Duration;

use crate::infrastructure::ctrader::driver::DriverConfig;
use crate::infrastructure::ctrader::heartbeat::HeartbeatConfig;
use crate::infrastructure::ctrader::session::AccountSelection;

/// Live Open API endpoint.
pub const LIVE_ENDPOINT: &str = "wss://live.ctraderapi.com:5036";
/// Demo Open API endpoint.
pub const DEMO_ENDPOINT: &str = "wss://demo.ctraderapi.com:5036";

/// Open API environment (live vs demo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Live accounts.
    #[default]
    Live,
    /// Demo accounts.
    Demo,
}

impl Environment {
    /// Parse environment from string; anything but `live` selects demo.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "live" => Self::Live,
            _ => Self::Demo,
        }
    }

    /// Check if this is the live environment.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Get the environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Demo => "demo",
        }
    }

    /// WebSocket endpoint for this environment.
    #[must_use]
    pub const fn endpoint(&self) -> &'static str {
        match self {
            Self::Live => LIVE_ENDPOINT,
            Self::Demo => DEMO_ENDPOINT,
        }
    }
}

/// Open API application and account credentials.
#[derive(Clone)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
    access_token: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(client_id: String, client_secret: String, access_token: String) -> Self {
        Self {
            client_id,
            client_secret,
            access_token,
        }
    }

    /// Get the application client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Get the application client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Get the OAuth access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Handshake and streaming settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Symbol to stream.
    pub symbol: String,
    /// Account policy.
    pub account: AccountSelection,
    /// Per-step handshake timeout (zero disables).
    pub step_timeout: Duration,
    /// Outbound heartbeat interval (zero disables).
    pub heartbeat_interval: Duration,
    /// Inbound silence before a warning (zero disables).
    pub idle_warning: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            symbol: "EURUSD".to_string(),
            account: AccountSelection::First,
            step_timeout: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(10),
            idle_warning: Duration::from_secs(30),
        }
    }
}

impl SessionSettings {
    /// Driver configuration derived from these settings.
    #[must_use]
    pub const fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            step_timeout: if self.step_timeout.is_zero() {
                None
            } else {
                Some(self.step_timeout)
            },
            heartbeat: HeartbeatConfig::new(self.heartbeat_interval, self.idle_warning),
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Environment selector.
    pub environment: Environment,
    /// Credentials.
    pub credentials: Credentials,
    /// Session settings.
    pub session: SessionSettings,
    /// Prometheus listener port (0 = disabled).
    pub metrics_port: u16,
}

impl AppConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing, empty or malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_id = required(&lookup, "CTRADER_CLIENT_ID")?;
        let client_secret = required(&lookup, "CTRADER_CLIENT_SECRET")?;
        let access_token = required(&lookup, "CTRADER_ACCESS_TOKEN")?;

        let environment = lookup("CTRADER_ENV")
            .map(|s| Environment::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let defaults = SessionSettings::default();

        let symbol = lookup("CTRADER_SYMBOL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.symbol);

        let account = match lookup("CTRADER_ACCOUNT_ID")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            Some(raw) => AccountSelection::Id(raw.parse().map_err(|_| {
                ConfigError::InvalidValue {
                    key: "CTRADER_ACCOUNT_ID".to_string(),
                    value: raw.clone(),
                }
            })?),
            None => AccountSelection::First,
        };

        let session = SessionSettings {
            symbol,
            account,
            step_timeout: parse_env_duration_secs(
                &lookup,
                "CTRADER_STEP_TIMEOUT_SECS",
                defaults.step_timeout,
            ),
            heartbeat_interval: parse_env_duration_secs(
                &lookup,
                "CTRADER_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            idle_warning: parse_env_duration_secs(
                &lookup,
                "CTRADER_IDLE_WARNING_SECS",
                defaults.idle_warning,
            ),
        };

        Ok(Self {
            environment,
            credentials: Credentials::new(client_id, client_secret, access_token),
            session,
            metrics_port: parse_env_u16(&lookup, "CTRADER_METRICS_PORT", 0),
        })
    }

    /// WebSocket endpoint for the configured environment.
    #[must_use]
    pub const fn endpoint(&self) -> &'static str {
        self.environment.endpoint()
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable cannot be parsed.
    #[error("environment variable {key} has invalid value '{value}'")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_env_u16<F>(lookup: &F, key: &str, default: u16) -> u16
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}
