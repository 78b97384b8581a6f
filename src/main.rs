//! trickd - two-player video trick challenges
//!
//! A TCP server that arbitrates S.K.8 games: every set, judgement and
//! response is validated and committed by the server.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use trickd_core::{GameEngine, GameStore, MemoryStore};
use trickd_server::{
    run_metrics_server, CommandHandler, Config, Metrics, Server, ServerConfig, UpdateBroadcaster,
};
use trickd_storage::DurableStore;

/// How often idle rate-limit counters are dropped.
const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // File from TRICKD_CONFIG if set, then env overrides, then validation.
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Starting trickd server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    if config.auth.required {
        tracing::info!(
            "  Authentication: token identities ({} configured)",
            config.auth.identities.len()
        );
    } else {
        tracing::info!("  Authentication: trusted tokens (development mode)");
    }

    let store: Arc<dyn GameStore> = if config.storage.persist {
        tracing::info!("  Data directory: {}", config.storage.data_dir.display());
        Arc::new(DurableStore::open(&config.storage.data_dir)?)
    } else {
        tracing::warn!("  Persistence disabled, games are kept in memory only");
        Arc::new(MemoryStore::new())
    };

    let limiter = Arc::new(config.build_rate_limiter());
    let engine = Arc::new(
        GameEngine::new(store)
            .with_config(config.to_engine_config())
            .with_rate_limiter(limiter.clone()),
    );

    let broadcaster = Arc::new(UpdateBroadcaster::new(config.game.broadcast_capacity));
    let mut handler = CommandHandler::new(engine)
        .with_identities(config.identity_provider()?, config.auth.required)
        .with_broadcaster(broadcaster);
    let mut server_config = ServerConfig::from_config(&config);

    let metrics = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new()?);
        handler = handler.with_metrics(metrics.clone());
        server_config = server_config.with_metrics(metrics.clone());
        Some(metrics)
    } else {
        None
    };

    let server = Arc::new(Server::new(server_config, handler));
    let shutdown = server.shutdown_sender();

    if let Some(metrics) = metrics {
        server.handler().update_gauge_metrics();
        let addr = config.metrics.bind_addr;
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, metrics, rx).await {
                tracing::error!("Metrics server failed: {}", e);
            }
        });
    }

    // Drop rate-limit windows that have expired.
    {
        let mut rx = shutdown.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let pruned = limiter.prune(Instant::now());
                        if pruned > 0 {
                            tracing::debug!(pruned, "pruned rate limit windows");
                        }
                    }
                    _ = rx.recv() => break,
                }
            }
        });
    }

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
