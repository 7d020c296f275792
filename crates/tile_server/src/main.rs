//! Main application entry point for the tile server.
//!
//! Loads configuration, wires the SQLite store, the in-memory cache and the
//! static token table into a [`GameServer`], and runs it until a shutdown
//! signal arrives.

mod cli;
mod config;
mod logging;
mod signals;

use anyhow::{anyhow, Context, Result};
use board_engine::TileEngine;
use game_server::{
    Collaborators, GameServer, MemoryCache, SqliteStore, StaticTokenVerifier, VolatileCache,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Duration};
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::AppConfig;

/// How often the live connection count is logged.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// How long the accept loop gets to wind down after a signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Configuration is loaded before logging so CLI overrides apply to it
    let mut config = AppConfig::load_from_file(&args.config_path).await?;
    config.apply_cli(&args);
    config
        .validate()
        .map_err(|e| anyhow!("Configuration validation failed: {e}"))?;

    logging::setup_logging(&config.logging)?;
    display_banner();
    info!("📂 Config: {}", args.config_path.display());

    if let Err(e) = run(config).await {
        error!("❌ Application error: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(config: AppConfig) -> Result<()> {
    let server_config = config.to_server_config()?;

    let database = config.database_path();
    let store = SqliteStore::open(&database)
        .with_context(|| format!("Failed to open database {}", database.display()))?;

    let memory_cache = config.cache.enabled.then(|| Arc::new(MemoryCache::new()));
    let cache = memory_cache
        .clone()
        .map(|cache| cache as Arc<dyn VolatileCache>);

    let verifier: StaticTokenVerifier = config
        .auth
        .users
        .iter()
        .map(|user| (user.token.clone(), user.identity()))
        .collect();
    if verifier.is_empty() {
        warn!("⚠️ No [[auth.users]] configured, every connection will be rejected");
    }

    let engine = match config.game.seed {
        Some(seed) => {
            info!("🎲 Tile generator seeded with {}", seed);
            TileEngine::from_seed(seed)
        }
        None => TileEngine::from_os_rng(),
    };

    info!("📋 Configuration Summary:");
    info!("  🌐 Bind address: {}", server_config.bind_address);
    info!("  💾 Database: {}", database.display());
    info!(
        "  ⚡ Session cache: {}",
        if memory_cache.is_some() { "memory" } else { "disabled" }
    );
    info!("  👥 Max connections: {}", server_config.max_connections);
    info!("  🏆 Victory tile: {}", server_config.victory_tile);
    info!("  🔑 Known tokens: {}", verifier.len());

    let server = Arc::new(GameServer::new(
        server_config,
        Collaborators {
            store: Arc::new(store),
            cache,
            verifier: Arc::new(verifier),
            engine,
        },
    ));

    let mut server_task = tokio::spawn({
        let server = server.clone();
        async move { server.start().await }
    });

    let mut background = vec![spawn_status_monitor(server.clone())];
    if let Some(cache) = memory_cache {
        let period = Duration::from_secs(config.cache.purge_interval_secs);
        background.push(spawn_cache_purger(cache, period));
    }

    info!("✅ Tile server is running, press Ctrl+C to shut down");

    let outcome = tokio::select! {
        signal = signals::wait_for_shutdown() => {
            signal?;
            info!("🛑 Shutdown signal received, initiating graceful shutdown...");
            server.shutdown();
            match timeout(SHUTDOWN_GRACE, &mut server_task).await {
                Ok(joined) => joined
                    .context("Server task panicked")?
                    .context("Server stopped with an error"),
                Err(_) => {
                    warn!("Server did not stop within {:?}, aborting", SHUTDOWN_GRACE);
                    server_task.abort();
                    Ok(())
                }
            }
        }
        joined = &mut server_task => {
            joined
                .context("Server task panicked")?
                .context("Server stopped unexpectedly")
        }
    };

    for task in background {
        task.abort();
    }

    if outcome.is_ok() {
        info!("👋 Tile server shutdown complete");
    }
    outcome
}

fn spawn_status_monitor(server: Arc<GameServer>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(STATUS_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!(
                "📊 Status - {} live connection(s)",
                server.connection_count().await
            );
        }
    })
}

fn spawn_cache_purger(cache: Arc<MemoryCache>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                debug!("🧹 Purged {} expired cache entries, {} remain", purged, cache.len());
            }
        }
    })
}

fn display_banner() {
    info!("╔══════════════════════════════════════════╗");
    info!("║              🧩 TILE SERVER              ║");
    info!("║  v{:<39}║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════════╝");
}
