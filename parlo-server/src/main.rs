//! parlo-server - Main entry point
//!
//! Wires configuration, the event bus, the session controller, and the HTTP
//! server together, then serves until interrupted. An active session is
//! stopped before the process exits so no stage is left holding a provider
//! connection.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parlo_common::events::EventBus;
use parlo_server::api::{create_router, AppContext};
use parlo_server::config::Config;
use parlo_server::providers::ConfigStageFactory;
use parlo_server::session::{transcript, SessionController, TranscriptLog};

/// Command-line arguments for parlo-server
#[derive(Parser, Debug)]
#[command(name = "parlo-server")]
#[command(about = "Speech-to-speech translation service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "PARLO_PORT")]
    port: Option<u16>,

    /// Path to the TOML configuration file
    #[arg(short, long, env = "PARLO_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlo_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Configuration (and credentials, in remote mode) are validated here;
    // a bad setup fails the process before anything is listening.
    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    let config = Arc::new(config);

    info!(
        "Starting parlo server: {} -> {} at {} Hz",
        config.languages.source, config.languages.target, config.audio.sample_rate
    );

    let bus = Arc::new(EventBus::new(256));

    let transcript_log = Arc::new(TranscriptLog::new(512));
    transcript::spawn_collector(transcript_log.clone(), &bus);

    let factory = Arc::new(ConfigStageFactory::new(config.clone()));
    let controller = Arc::new(SessionController::new(
        config.clone(),
        factory,
        bus.clone(),
    ));

    let ctx = AppContext {
        controller: controller.clone(),
        bus,
        transcript: transcript_log,
        config: config.clone(),
    };
    let app = create_router(ctx);

    let ip: IpAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    let addr = SocketAddr::new(ip, config.server.port);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Release any active session before exiting.
    controller.stop().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
