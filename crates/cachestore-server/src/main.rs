//! Cachestore Server
//!
//! Serves user profiles over HTTP from a durable SQL store fronted by a
//! cache (cache-aside: reads fill the cache on a miss, writes go to the
//! database first and then to the cache).

mod config;
mod handlers;
mod services;
mod storage;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cachestore_core::{CacheStore, DurableStore};
use crate::config::{config_path, AppConfig, CacheBackend, LoggingConfig, SqlBackend};
use crate::services::{StoreCoordinator, StoreTimeouts};
use crate::storage::{MemoryCache, MySqlDatabase, RedisCache, SqliteDatabase};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<StoreCoordinator>,
}

#[tokio::main]
async fn main() {
    // Set up panic hook to log crashes
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()));
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("[PANIC] at {:?}: {}", location, payload);
        tracing::error!("PANIC at {:?}: {}", location, payload);
    }));

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[FATAL] Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("[FATAL] Failed to initialize logging: {:#}", e);
        std::process::exit(1);
    }

    info!("Starting Cachestore Server v{}", env!("CARGO_PKG_VERSION"));
    info!("PID: {}", std::process::id());

    let config_file = config_path();
    if !config_file.exists() {
        warn!(
            "Config file {} not found, using defaults and environment",
            config_file.display()
        );
    }

    if let Err(e) = run_server(config).await {
        error!("Server failed: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    if !config.enable {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level: {}", config.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    Ok(())
}

async fn run_server(config: AppConfig) -> Result<()> {
    info!(
        "Config loaded: bind={}, sql={:?}, cache={:?}, ttl={:?}",
        config.server.bind_address,
        config.sql.backend,
        config.redis.backend,
        config.redis.ttl()
    );

    // The service cannot run without its source of truth
    info!("Initializing durable store...");
    let db: Arc<dyn DurableStore> = match config.sql.backend {
        SqlBackend::Mysql => Arc::new(MySqlDatabase::new(&config.sql)?),
        SqlBackend::Sqlite => Arc::new(SqliteDatabase::new(&config.sql)?),
    };
    db.ensure_schema()
        .await
        .context("Failed to initialize database schema")?;
    info!("Durable store initialized");

    // The cache may be down at startup; it connects on first use
    let cache: Arc<dyn CacheStore> = match config.redis.backend {
        CacheBackend::Redis => Arc::new(RedisCache::new(&config.redis)?),
        CacheBackend::Memory => {
            info!("Using in-memory cache");
            Arc::new(MemoryCache::new())
        }
    };

    let coordinator = Arc::new(StoreCoordinator::new(
        db,
        cache,
        config.redis.ttl(),
        StoreTimeouts {
            durable: config.sql.op_timeout(),
            cache: config.redis.op_timeout(),
        },
    ));

    let state = AppState {
        coordinator: coordinator.clone(),
    };

    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .context("Failed to parse bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Server listening on {}", addr);

    let server = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    let grace = config.server.graceful_term();
    tokio::select! {
        result = server => result.context("Server error")?,
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!("In-flight requests did not drain within {:?}, exiting", grace);
        }
    }

    info!("Server stopped: {:?}", coordinator.stats());
    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        // Liveness
        .route("/", get(handlers::live))
        .route("/add", post(handlers::profiles::add).get(handlers::profiles::add))
        .route("/search/:key", get(handlers::profiles::search))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections...");
}
