use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ratekeeper::config::{LoggingConfig, RatekeeperConfig};
use ratekeeper::http::{AppState, HttpServer};
use ratekeeper::ratelimit::{Limiter, Reclaimer};

/// In-process fixed-window rate limiter exposed as an HTTP admission service.
#[derive(Debug, Parser)]
#[command(name = "ratekeeper", version, about)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "RATEKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Policy table overriding or extending the presets
    #[arg(short, long)]
    policies: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = RatekeeperConfig::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(policies) = cli.policies {
        config.limiter.policies_path = Some(policies);
    }

    init_tracing(&config.logging);

    info!("Starting Ratekeeper");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    let policies = config.limiter.policy_table()?;
    info!(policies = policies.len(), "Policy table loaded");

    let limiter = Arc::new(Limiter::new());
    let reclaimer = Reclaimer::spawn(Arc::clone(&limiter), config.limiter.reclaim_interval())?;

    let server = HttpServer::new(
        config.server.listen_addr,
        AppState::new(Arc::clone(&limiter), policies),
    );
    let served = server.serve_with_shutdown(shutdown_signal()).await;

    reclaimer.stop().await;
    served?;

    info!("Ratekeeper stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
