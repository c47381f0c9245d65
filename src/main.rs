use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use slotkeeper::calendar::InMemoryCalendar;
use slotkeeper::config::Config;
use slotkeeper::engine::Engine;
use slotkeeper::http::{self, AppState};
use slotkeeper::maintenance;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("slotkeeper=info")),
        )
        .init();

    let config = Config::from_env()?;
    slotkeeper::observability::init(config.metrics_port)?;

    let calendar = Arc::new(InMemoryCalendar::new());
    let engine = if config.ephemeral {
        Engine::ephemeral(calendar.clone())
    } else {
        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;
        Engine::open(&config.wal_path(), calendar.clone())?
    };
    let engine = Arc::new(engine);

    let compactor_engine = engine.clone();
    let threshold = config.compact_threshold;
    tokio::spawn(async move {
        maintenance::run_compactor(compactor_engine, threshold).await;
    });

    let app = http::router(AppState {
        engine: engine.clone(),
        calendar,
        settings: config.settings.clone(),
    });

    let addr = SocketAddr::new(config.bind, config.port);
    let listener = TcpListener::bind(addr).await?;
    info!("slotkeeper listening on {addr}");
    info!(
        "  storage: {}",
        if engine.is_durable() {
            config.wal_path().display().to_string()
        } else {
            "in-memory".to_string()
        }
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );
    info!(
        "  slot minutes: {} (urgent {})",
        config.settings.default_slot_minutes, config.settings.urgent_slot_minutes
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = engine.compact().await {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("slotkeeper stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, draining requests");
}
