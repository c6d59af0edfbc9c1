//! mlib-catalog - Main entry point
//!
//! Music score catalog microservice: cached, deadline-guarded listings and
//! admin management of entries and their uploaded files.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use mlib_catalog::config::{Args, ServiceConfig};
use mlib_catalog::{build_router, build_service, AppState};
use mlib_common::config::TomlConfig;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing starts so the file can set the level
    let toml_config = TomlConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    let config = ServiceConfig::resolve(&args, &toml_config);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("mlib_catalog={0},mlib_common={0},tower_http=info", config.log_level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting mlib-catalog v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
    );
    info!("Root folder: {}", config.root_folder.display());

    let db_path = config.database_path();
    let pool = mlib_common::db::init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let service = build_service(pool, &config);
    service
        .assets()
        .ensure_roots()
        .await
        .context("Failed to create asset storage folders")?;

    let sweeper = service.cache().spawn_sweeper(config.cache_sweep_interval);
    info!(
        cache_ttl_secs = config.cache_ttl.as_secs(),
        query_timeout_ms = config.query_timeout.as_millis() as u64,
        "Catalog service initialized"
    );

    if config.admin_token.is_none() {
        warn!("No admin token configured, admin routes are unauthenticated");
    }

    let state = AppState::new(service, config.admin_token.clone(), config.slow_request);
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.bind_address, config.port
            )
        })?;

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
