//! Configuration Module
//!
//! Configuration loading for the spot stream client.

mod settings;

pub use settings::{
    AppConfig, ConfigError, Credentials, DEMO_ENDPOINT, Environment, LIVE_ENDPOINT,
    SessionSettings,
};
