//! Tenantry server
//!
//! Serves the per-tenant dynamic configuration API behind the tenant
//! resolution middleware.
//!
//! Usage:
//! ```bash
//! tenantry-server --config tenantry.yaml
//! TENANTRY_MULTITENANCY_ENABLED=true tenantry-server
//! ```

mod app;
mod settings;

use clap::Parser;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::Application;
use crate::settings::ServerSettings;

/// Tenantry Server - multi-tenant dynamic configuration
#[derive(Parser)]
#[command(name = "tenantry-server")]
#[command(about = "Multi-tenant dynamic configuration server", long_about = None)]
struct Cli {
    /// Path to settings file (YAML or TOML)
    #[arg(short, long, value_name = "FILE", env = "TENANTRY_CONFIG")]
    config: Option<String>,

    /// Override the listen port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => ServerSettings::from_file(path)?,
        None => ServerSettings::default(),
    };
    settings.merge_env();
    if let Some(port) = cli.port {
        settings.port = port;
    }
    settings.validate()?;

    init_tracing(&settings);

    match &cli.config {
        Some(path) => info!("Loaded settings from {}", path),
        None => info!("Using default settings"),
    }

    let app = Application::build(&settings).await?;
    let refresh_task = app
        .config_service
        .spawn_refresh_task(settings.dynamic_config.refresh_interval());

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Tenantry listening on http://{}", addr);
    info!("   - Config API:   http://{}/config/all", addr);
    info!("   - Health check: http://{}/healthz", addr);
    if settings.multitenancy.enabled {
        info!(
            "   Multitenancy enabled (standalone: {})",
            settings.multitenancy.standalone
        );
    }

    axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    refresh_task.shutdown().await;
    info!(
        "Server stopped ({} tenant contexts cached)",
        app.loader.cached_entries()
    );

    Ok(())
}

fn init_tracing(settings: &ServerSettings) {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.to_lowercase()));

    if !settings.logging.log_sql_queries {
        match "sqlx=warn".parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => warn!("Failed to set sqlx log filter: {}", e),
        }
    }

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    use tokio::signal;

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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
