//! Market Relay Binary
//!
//! Decodes an ordered game-client byte stream and forwards market orders to
//! the configured ingestion endpoints.
//!
//! # Usage
//!
//! ```bash
//! RELAY_INPUT=capture.bin cargo run --bin market-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `RELAY_INGEST_DESTINATIONS`: Comma-separated ingestion base URLs
//!
//! ## Optional
//! - `RELAY_ENABLED`: Run the pipeline at all (default: true)
//! - `RELAY_INGEST_SUBJECT`: Upload subject (default: marketorders.ingest)
//! - `RELAY_PUBLISH_TIMEOUT_MS`: Per-destination timeout (default: 5000)
//! - `RELAY_PERSISTENCE_ENABLED`: Write every order locally (default: false)
//! - `RELAY_PERSISTENCE_PATH`: JSON-lines file (default: market_orders.jsonl)
//! - `RELAY_INPUT`: Byte stream file, `-` for stdin (default: -)
//! - `RELAY_READ_CHUNK_SIZE`: Bytes per read (default: 4096)
//! - `RELAY_CHUNK_CHANNEL_CAPACITY`: Buffered chunks (default: 256)
//! - `RELAY_MAX_COMMAND_LENGTH`, `RELAY_MAX_MESSAGE_LENGTH`,
//!   `RELAY_MAX_PENDING_FRAGMENTS`, `RELAY_DUPLICATE_KEYS`: Decoder limits
//! - `RELAY_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: market-relay)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use market_relay::application::dispatch::Dispatcher;
use market_relay::application::ports::{MarketPublisher, OrderStore, TaskExecutor};
use market_relay::application::services::{MarketNormalizer, Relay, UploadFanout};
use market_relay::infrastructure::config::RelayConfig;
use market_relay::infrastructure::executor::TokioExecutor;
use market_relay::infrastructure::health::{HealthServer, HealthServerState};
use market_relay::infrastructure::ingest::HttpPublisher;
use market_relay::infrastructure::persistence::JsonLinesOrderStore;
use market_relay::infrastructure::source::ByteStreamSource;
use market_relay::infrastructure::telemetry;
use market_relay::init_metrics;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting Market Relay");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics()?;

    let config = RelayConfig::from_env()?;
    if !config.enabled {
        tracing::info!("Relay disabled, exiting");
        return Ok(());
    }
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Build the upload path
    let publishers = config
        .ingest
        .destinations
        .iter()
        .map(|url| {
            HttpPublisher::new(url.as_str(), config.ingest.publish_timeout)
                .map(|publisher| Arc::new(publisher) as Arc<dyn MarketPublisher>)
                .with_context(|| format!("failed to create publisher for {url}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let fanout = Arc::new(UploadFanout::new(
        publishers,
        config.ingest.subject.clone(),
        config.ingest.publish_timeout,
    ));

    let store = config.persistence.enabled.then(|| {
        tracing::info!(path = %config.persistence.path.display(), "Persisting market orders locally");
        Arc::new(JsonLinesOrderStore::new(config.persistence.path.clone())) as Arc<dyn OrderStore>
    });

    let executor = Arc::new(TokioExecutor::new());
    let normalizer = MarketNormalizer::new(
        fanout,
        store,
        Arc::clone(&executor) as Arc<dyn TaskExecutor>,
    );
    let relay = Relay::new(
        config.decoder_config(),
        Dispatcher::with_market_handlers(),
        normalizer,
    );

    // Spawn health server
    if config.health_enabled() {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            relay.stats(),
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
    }

    // Spawn byte-stream source
    let (chunk_tx, chunk_rx) = mpsc::channel(config.input.channel_capacity);
    let source = ByteStreamSource::new(config.input.source.clone(), config.input.read_chunk_size);
    let source_shutdown = shutdown_token.clone();
    let source_handle = tokio::spawn(async move {
        if let Err(e) = source.run(chunk_tx, source_shutdown).await {
            tracing::error!(error = %e, "Byte stream source failed");
        }
    });

    tokio::spawn(await_shutdown(shutdown_token.clone()));

    tracing::info!("Market relay ready");

    let mut processor = relay.open_stream(config.input.source.to_string(), relay.new_session());
    let result = processor.run(chunk_rx, shutdown_token.clone()).await;
    drop(processor);

    shutdown_token.cancel();
    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
    let _ = source_handle.await;
    executor.shutdown(SHUTDOWN_TIMEOUT).await;

    let stats = relay.stats().snapshot();
    tracing::info!(
        frames = stats.frames_decoded,
        frame_errors = stats.frame_errors,
        orders = stats.orders_forwarded,
        batches = stats.batches_submitted,
        "Market relay stopped"
    );

    result.map_err(Into::into)
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        destinations = config.ingest.destinations.len(),
        subject = %config.ingest.subject,
        publish_timeout_ms = config.ingest.publish_timeout.as_millis(),
        input = %config.input.source,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        max_command_length = config.decoder.max_command_length,
        max_message_length = config.decoder.max_message_length,
        max_pending_fragments = config.decoder.max_pending_fragments,
        duplicate_keys = config.decoder.duplicate_keys.as_str(),
        "Decoder limits"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
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

/// Wait for shutdown signal (SIGTERM or SIGINT), then cancel.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
        () = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();
}
