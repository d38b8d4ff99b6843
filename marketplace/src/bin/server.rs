//! Gigbook HTTP server.
//!
//! Loads `.env`, validates configuration, connects to Postgres and serves the
//! marketplace until SIGINT/SIGTERM, then drains in-flight requests for up to
//! `SHUTDOWN_TIMEOUT` seconds.

use anyhow::Context;
use gigbook::{build_router, AppState, Config};
use gigbook_postgres::PoolConfig;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine in production
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gigbook=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gigbook");

    // Load configuration
    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        site_url = %config.server.site_url,
        auth_url = %config.auth.url,
        deposit_cents = config.deposit.amount_cents,
        currency = %config.deposit.currency,
        "Configuration loaded"
    );

    // Connect to the database
    let pool = gigbook_postgres::connect(
        &PoolConfig::new(&config.database.url)
            .with_max_connections(config.database.max_connections)
            .with_acquire_timeout(Duration::from_secs(config.database.acquire_timeout)),
    )
    .await
    .context("connecting to Postgres")?;
    info!("Database connected");

    if config.database.run_migrations {
        gigbook_postgres::migrate(&pool).await.context("running migrations")?;
        info!("Migrations applied");
    }

    let state = AppState::from_config(&config, pool)?;
    let app = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(address = %addr, "Server listening");

    // Run server with graceful shutdown, bounded by the configured timeout
    let stop = Arc::new(Notify::new());
    let server = axum::serve(listener, app)
        .with_graceful_shutdown({
            let stop = stop.clone();
            async move { stop.notified().await }
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result?,
        () = shutdown_signal() => {
            stop.notify_one();
            let grace = Duration::from_secs(config.server.shutdown_timeout);
            match tokio::time::timeout(grace, server).await {
                Ok(result) => result?,
                Err(_) => warn!(seconds = grace.as_secs(), "Shutdown timed out, dropping open connections"),
            }
        },
    }

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!(%error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(error) => {
                warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
