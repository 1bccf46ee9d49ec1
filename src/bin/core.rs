use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use valor_telemetry::api::health::HealthState;
use valor_telemetry::api::routes::{router, ApiState};
use valor_telemetry::config::{Config, CHANNEL_CAPACITY, PRUNE_INTERVAL_SECS};
use valor_telemetry::db;
use valor_telemetry::error::Result;
use valor_telemetry::registry::NodeRegistry;
use valor_telemetry::types::now_secs;

#[tokio::main]
async fn main() {
    let config_path = std::env::var("VALOR_CONFIG").unwrap_or_else(|_| "valor.json".to_string());
    let cfg = Config::load(Path::new(&config_path));

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Storage: recover last-known rows ---
    let pool = db::open(&cfg.db_path).await?;
    let recovered = db::load_nodes(&pool).await?;
    let registry = Arc::new(NodeRegistry::new());
    if !recovered.is_empty() {
        info!("Recovered {} node rows from storage", recovered.len());
        registry.load(recovered);
    }

    let health = Arc::new(HealthState::new());

    // --- Persistence writer (off the request path) ---
    let (persist_tx, persist_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let writer = db::RegistryWriter::new(pool.clone(), persist_rx, Arc::clone(&health));
    tokio::spawn(async move { writer.run().await });

    // --- Pruning sweep (background, every 60s) ---
    let prune_registry = Arc::clone(&registry);
    let prune_after = cfg.prune_after_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(PRUNE_INTERVAL_SECS));
        ticker.tick().await; // skip immediate first tick; nothing can be stale yet
        loop {
            ticker.tick().await;
            let removed = prune_registry.prune(now_secs(), prune_after);
            if removed > 0 {
                info!(removed, total = prune_registry.len(), "Pruned stale node records");
            }
        }
    });

    // --- HTTP API server ---
    let state = ApiState {
        registry: Arc::clone(&registry),
        health,
        persist_tx,
        stale_after_secs: cfg.stale_after_secs,
        started_at: Instant::now(),
    };
    let app = router(state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Core listening on {bind_addr} (dashboard at /, uplink at /api/uplink)");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Interrupt received, core shutting down");
        })
        .await?;

    Ok(())
}
