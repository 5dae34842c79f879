//! Champion Stream Binary
//!
//! Connects to the champion event stream and keeps it open, logging trade
//! updates and balance changes and serving health and metrics.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin champion-stream
//! ```
//!
//! # Environment Variables
//!
//! - `CHAMPION_BASE_URL`: Stream gateway (default: <https://champion.mobile-bot.deriv.dev>)
//! - `CHAMPION_SSE_PATH`: SSE path (default: /champion/v1/sse)
//! - `CHAMPION_ACCOUNT_UUID`: Account the stream is scoped to
//! - `CHAMPION_TOKEN`: Bearer token (optional)
//! - `CHAMPION_API_URL`: Upstream sent in the `champion-url` header
//! - `CHAMPION_BALANCE_STREAM_URL`: Balance stream (optional)
//! - `STREAM_BACKEND`: eventsource | fetch (default: eventsource)
//! - `STREAM_RECONNECT_INTERVAL_MS`: Reconnect delay (default: 5000)
//! - `STREAM_RECONNECT_ON_END`: Reconnect when the server ends the stream
//! - `STREAM_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `RUST_LOG`: Log filter (default: `champion_stream=info`)

use std::sync::Arc;

use anyhow::Context;
use champion_stream::infrastructure::adapters::{BalanceStreamAdapter, balance_handler};
use champion_stream::infrastructure::health::{HealthServer, HealthServerState};
use champion_stream::infrastructure::telemetry;
use champion_stream::{
    ConnectRequest, StreamConfig, StreamFactory, StreamMessage, StreamStatus, Subscription,
    TradeUpdate, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv_from_ancestors();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Champion Stream");

    let _metrics_handle = init_metrics().context("installing Prometheus recorder")?;

    let config = StreamConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let factory = StreamFactory::new(config.reconnect.connect_timeout)?;

    // Main event stream
    let service = factory.service(config.reconnect.backend, config.reconnect_config());
    let status = StreamStatus::new();

    let mut request = ConnectRequest::new(config.sse_endpoint())
        .on_message(status.handler())
        .on_open(|| tracing::info!("Champion stream connected"))
        .on_error(|e| tracing::warn!(error = %e, "Champion stream error"));
    if let Some(reconnect_on_end) = config.reconnect.reconnect_on_end {
        request = request.reconnect_on_end(reconnect_on_end);
    }
    let handlers = service.connect(request);
    tracing::debug!(handlers, "Champion stream handlers registered");

    tokio::spawn(log_trade_updates(service.subscribe(), shutdown_token.clone()));

    // Balance stream, when deployed separately
    let balance = config.balance_endpoint().map(|endpoint| {
        let adapter = BalanceStreamAdapter::new(
            factory.service(config.reconnect.backend, config.reconnect_config()),
        );
        adapter.connect(
            &endpoint.url,
            balance_handler(|update| {
                tracing::info!(
                    balance = %update.balance,
                    change = %update.change,
                    currency = %update.currency,
                    contract_id = %update.contract_id,
                    "Balance updated"
                );
            }),
        );
        adapter
    });

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        service.clone(),
        status,
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Champion stream ready");

    await_shutdown(shutdown_token).await;

    service.disconnect();
    if let Some(adapter) = balance {
        adapter.handle_logout();
    }

    tracing::info!("Champion stream stopped");
    Ok(())
}

/// Log trade progress payloads until shutdown.
async fn log_trade_updates(mut subscription: Subscription, shutdown: CancellationToken) {
    loop {
        let message = tokio::select! {
            () = shutdown.cancelled() => return,
            message = subscription.recv() => message,
        };

        let payload = match message {
            Some(StreamMessage::Payload(payload)) => payload,
            Some(StreamMessage::Heartbeat) => continue,
            None => return,
        };

        match payload.parse::<TradeUpdate>() {
            Ok(update) if update.has_error() => tracing::warn!(
                login_id = %update.login_id,
                symbol = %update.symbol,
                error = %update.error,
                "Trade update reported an error"
            ),
            Ok(update) => tracing::info!(
                login_id = %update.login_id,
                symbol = %update.symbol,
                strategy = %update.strategy,
                completed = update.is_completed,
                "Trade update"
            ),
            Err(e) => tracing::debug!(error = %e, "Payload is not a trade update"),
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &StreamConfig) {
    tracing::info!(
        backend = %config.reconnect.backend,
        reconnect_interval_ms = config.reconnect.interval.as_millis(),
        health_port = config.server.health_port,
        authenticated = config.champion.token.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        sse_url = %config.sse_url(),
        balance_url = ?config.champion.balance_stream_url,
        "Stream endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

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
