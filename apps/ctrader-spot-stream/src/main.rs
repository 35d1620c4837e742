//! cTrader Spot Stream Binary
//!
//! Authenticates against the Open API and prints live spot ticks for one
//! symbol until interrupted or the server closes the connection.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ctrader-spot-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `CTRADER_CLIENT_ID`: Open API application client id
//! - `CTRADER_CLIENT_SECRET`: Open API application client secret
//! - `CTRADER_ACCESS_TOKEN`: OAuth access token for the trading account
//!
//! ## Optional
//! - `CTRADER_ENV`: live | demo (default: live)
//! - `CTRADER_SYMBOL`: Symbol to stream (default: EURUSD)
//! - `CTRADER_ACCOUNT_ID`: Account to use (default: first returned)
//! - `CTRADER_STEP_TIMEOUT_SECS`: Per-step handshake timeout, 0 disables (default: 15)
//! - `CTRADER_HEARTBEAT_INTERVAL_SECS`: Heartbeat interval, 0 disables (default: 10)
//! - `CTRADER_IDLE_WARNING_SECS`: Silence before a warning, 0 disables (default: 30)
//! - `CTRADER_METRICS_PORT`: Prometheus listener port, 0 disables (default: 0)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)
//!
//! # Exit Status
//!
//! Non-zero on any handshake or transport failure; zero on Ctrl+C, SIGTERM
//! or an orderly close while streaming.

use std::process::ExitCode;

use anyhow::Context;
use ctrader_spot_stream::infrastructure::ctrader::token;
use ctrader_spot_stream::infrastructure::telemetry;
use ctrader_spot_stream::{
    AppConfig, ConsoleSink, Session, SessionDriver, SessionOutcome, WebSocketTransport,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting cTrader spot stream");

    let config = AppConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    if init_metrics(config.metrics_port).context("failed to start metrics exporter")? {
        tracing::info!(port = config.metrics_port, "Prometheus metrics listening");
    }

    token::log_token_diagnostics(config.credentials.access_token());

    let shutdown_token = CancellationToken::new();
    tokio::spawn(await_shutdown(shutdown_token.clone()));

    let transport = tokio::select! {
        () = shutdown_token.cancelled() => return Ok(ExitCode::SUCCESS),
        result = WebSocketTransport::connect(config.endpoint()) => match result {
            Ok(transport) => transport,
            Err(e) => {
                tracing::error!(error = %e, endpoint = config.endpoint(), "Connection failed");
                return Ok(ExitCode::FAILURE);
            }
        },
    };

    let session = Session::new(
        config.credentials.clone(),
        config.session.symbol.clone(),
        config.session.account,
    );
    let sink = ConsoleSink::stdout(config.session.symbol.clone());
    let mut driver =
        SessionDriver::new(session, transport, sink, config.session.driver_config());

    match driver.run(shutdown_token).await {
        Ok(SessionOutcome::Interrupted) => {
            tracing::info!("Spot stream stopped");
            Ok(ExitCode::SUCCESS)
        }
        Ok(SessionOutcome::ConnectionClosed) => {
            tracing::info!("Server closed the connection");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                history = ?driver.session().history(),
                "Session failed"
            );
            if let Some(hint) = e.hint() {
                eprintln!("{hint}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &AppConfig) {
    tracing::info!(
        environment = config.environment.as_str(),
        endpoint = config.endpoint(),
        symbol = %config.session.symbol,
        account = %config.session.account,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        credentials = ?config.credentials,
        step_timeout_secs = config.session.step_timeout.as_secs(),
        heartbeat_interval_secs = config.session.heartbeat_interval.as_secs(),
        idle_warning_secs = config.session.idle_warning.as_secs(),
        "Session settings"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
