use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::Serialized;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use slide_relay::config::{DEFAULT_CONFIG_FILE, FileConfig, RelayConfig, load_config};
use slide_relay::{AppState, router};

#[derive(Parser)]
#[command(name = "slide-relay")]
#[command(about = "Remote-control relay for browser slide presentations")]
struct Cli {
    /// Config file (TOML); missing files are ignored
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Address to bind (overrides config and HOST)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the web server (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "slide_relay=debug,tower_http=debug,info"
    } else {
        "slide_relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let mut figment = load_config(&cli.config);
    if let Some(host) = &cli.host {
        figment = figment.merge(Serialized::default("server.host", host));
    }
    if let Some(port) = cli.port {
        figment = figment.merge(Serialized::default("server.port", port));
    }
    let file_config: FileConfig = figment
        .extract()
        .with_context(|| format!("Invalid configuration ({})", cli.config.display()))?;
    let config = RelayConfig::from_file(&file_config);

    info!("Starting Slide Relay");
    if config.heartbeat.timeout.is_none() {
        warn!("Heartbeat timeout disabled; dead connections are only reaped on TCP close");
    }

    let shutdown = CancellationToken::new();
    let state = AppState::new(&config, shutdown.clone());
    let app = router(state);

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Slide Relay listening on http://{}", actual_addr);
    info!("  GET    /ws            - Host and remote WebSocket");
    info!("  GET    /api/health    - Health check");
    info!("  GET    /metrics       - Relay metrics");

    // Create shutdown signal handler
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, closing connections...");
        shutdown.cancel();
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Slide Relay stopped");
    Ok(())
}
