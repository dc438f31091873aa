use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use txn_anomaly_scorer::anomaly::engine::AnomalyEngine;
use txn_anomaly_scorer::config::{Config, LogFormat, DEFAULT_CONFIG_PATH};
use txn_anomaly_scorer::db::repository::{AnomalyStore, PgAnomalyStore};
use txn_anomaly_scorer::ingest::object_store::FsObjectStore;
use txn_anomaly_scorer::ingest::types::TriggerEvent;
use txn_anomaly_scorer::model::scorer::ModelScorer;
use txn_anomaly_scorer::pipeline::BatchPipeline;

fn init_tracing(format: LogFormat) {
    // Set RUST_LOG to override (default: info)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Usage: txn-anomaly-scorer [config.toml] [event.json]
    let config_path = std::env::args().nth(1);
    let event_path = std::env::args().nth(2);

    let config = Config::load(config_path.as_deref())?;
    init_tracing(config.logging.format);

    tracing::info!(
        source = %config.source.container,
        table = %config.store.table,
        threshold = %config.rules.amount_threshold,
        "Configuration loaded from {}",
        config_path.as_deref().unwrap_or(DEFAULT_CONFIG_PATH)
    );

    // Store handle is built once and connects on first use
    let pool = PgPoolOptions::new()
        .max_connections(config.store.max_connections)
        .connect_lazy(&config.store.url)
        .map_err(|e| eyre::eyre!("Invalid anomaly store URL: {}", e))?;
    let pg_store = PgAnomalyStore::new(pool, &config.store.table)?;
    pg_store
        .ensure_schema()
        .await
        .map_err(|e| eyre::eyre!("Failed to prepare anomaly table: {}", e))?;
    let store: Arc<dyn AnomalyStore> = Arc::new(pg_store);

    let scorer = ModelScorer::from_config(&config.model)?;
    let engine = AnomalyEngine::new(&config.rules, scorer);
    let objects = Arc::new(FsObjectStore::new(&config.source.root));
    let pipeline = Arc::new(BatchPipeline::new(&config, objects, engine, store));

    // One-shot invocation: process a single event file and exit
    if let Some(event_path) = event_path {
        let body = std::fs::read(&event_path)
            .map_err(|e| eyre::eyre!("Failed to read event file '{}': {}", event_path, e))?;
        let event: TriggerEvent = serde_json::from_slice(&body)
            .map_err(|e| eyre::eyre!("Failed to parse event file '{}': {}", event_path, e))?;

        let report = pipeline.handle_event(&event).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if !config.api.enabled {
        tracing::warn!("API disabled and no event file given, nothing to do");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();
    let host = config.api.host.clone();
    let port = config.api.port;
    let mut server = tokio::spawn(async move {
        txn_anomaly_scorer::api::serve(pipeline, &host, port, async move {
            server_shutdown.cancelled().await
        })
        .await
    });

    tracing::info!("Anomaly scorer started. Press Ctrl+C to stop.");

    tokio::select! {
        result = &mut server => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, draining in-flight requests...");
            shutdown.cancel();
            server.await??;
        }
    }

    tracing::info!("Anomaly scorer stopped gracefully");
    Ok(())
}
