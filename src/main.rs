use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use campus_requests::api::{auth::ensure_admin_user, metrics::init_metrics};
use campus_requests::cli::{run_command, Cli};
use campus_requests::config::Config;
use campus_requests::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !cli.starts_server() {
        return run_command(&cli, &config).await;
    }

    serve(config).await
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting campus-requests v{}", env!("CARGO_PKG_VERSION"));

    for problem in config.validate() {
        tracing::warn!("Configuration: {}", problem);
    }

    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.server.data_dir.display()
        )
    })?;

    let db = campus_requests::db::init(&config.server.data_dir).await?;

    if let (Some(email), Some(password)) = (&config.auth.admin_email, &config.auth.admin_password) {
        ensure_admin_user(&db, email, password).await?;
    }

    let metrics_handle = init_metrics()?;
    let state = Arc::new(AppState::new(config.clone(), db).with_metrics(metrics_handle));

    let app = campus_requests::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);
    if config.auth.admin_email.is_none() {
        tracing::info!("Admin token: {}", config.auth.admin_token);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received");
}
