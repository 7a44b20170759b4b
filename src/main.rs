//! Cache Governor server binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache_governor::api::{create_router, AppState};
use cache_governor::cache::{DistributedStore, RedisStore};
use cache_governor::config::Config;
use cache_governor::tasks::{spawn_cleanup_task, spawn_distributed_connector};

/// First wait before retrying a distributed store that was down at startup.
const REDIS_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect to Redis when `REDIS_URL` is set
/// 4. Build the cache, governor, monitor and circuit registry
/// 5. Start the background expiry reaper, and the Redis connector if
///    Redis was configured but unreachable
/// 6. Serve HTTP until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_governor=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cache governor");

    let config = Config::from_env();
    info!(
        max_entries = config.max_entries,
        default_ttl = config.default_ttl,
        port = config.server_port,
        cleanup_interval = config.cleanup_interval,
        max_query_depth = config.max_query_depth,
        max_query_complexity = config.max_query_complexity,
        "configuration loaded"
    );

    let l2 = connect_distributed(&config).await;
    let state = AppState::from_config(&config, l2);

    let mut background = vec![spawn_cleanup_task(state.cache.clone(), config.cleanup_interval)];
    if let Some(url) = config.redis_url.clone() {
        if !state.cache.has_distributed() {
            let prefix = config.redis_key_prefix.clone();
            background.push(spawn_distributed_connector(
                state.cache.clone(),
                REDIS_RETRY_DELAY,
                move || {
                    let url = url.clone();
                    let prefix = prefix.clone();
                    async move {
                        RedisStore::connect(&url, &prefix)
                            .await
                            .map(|store| Arc::new(store) as Arc<dyn DistributedStore>)
                    }
                },
            ));
        }
    }

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(background))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Connects the distributed layer. A missing URL leaves the server on L1
/// only; a failed connection leaves it on L1 until the background
/// connector gets through.
async fn connect_distributed(config: &Config) -> Option<Arc<dyn DistributedStore>> {
    let Some(url) = config.redis_url.as_deref() else {
        warn!("REDIS_URL not set, running with the in-process layer only");
        return None;
    };

    match RedisStore::connect(url, &config.redis_key_prefix).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(error = %e, "redis unavailable at startup, serving from the in-process layer until it connects");
            None
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the background tasks and allows graceful shutdown.
async fn shutdown_signal(background: Vec<tokio::task::JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
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
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for handle in &background {
        handle.abort();
    }
    warn!(tasks = background.len(), "background tasks aborted");
}
