#![forbid(unsafe_code)]

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use throttle_proxy_lib::config::{load_dotenv, load_from_env};
use throttle_proxy_lib::telemetry::{init_metrics, init_tracing, start_observability_server};
use throttle_proxy_lib::ProxyContext;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Rate limiting reverse proxy with webhook notifications")]
struct Cli {
    /// Dotenv file to load before reading the environment (defaults to ./.env if present)
    #[arg(long, value_name = "FILE", env = "ENV_FILE")]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load before tracing so LOG_LEVEL can come from the file
    let dotenv = load_dotenv(cli.env_file.as_deref());

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    if let Err(e) = init_tracing(&log_level) {
        eprintln!("Failed to initialize tracing: {e}");
        std::process::exit(1);
    }

    match dotenv {
        Ok(Some(path)) => info!(path = %path.display(), "Loaded env file"),
        Ok(None) => debug!("No .env file found, using process environment"),
        Err(e) => {
            error!(error = %e, "Failed to load env file");
            std::process::exit(1);
        }
    }

    let config = match load_from_env() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    info!(
        backend = %config.backend_url,
        rate_limit = config.rate_limit,
        container_id = %config.container_id,
        webhook = config.webhook_url.is_some(),
        "Starting reverse proxy"
    );

    let (metrics, prometheus_registry) = match config.metrics_port {
        Some(_) => match init_metrics() {
            Ok((m, r)) => (Some(m), Some(r)),
            Err(e) => {
                error!(error = %e, "Failed to initialize metrics");
                std::process::exit(1);
            }
        },
        None => (None, None),
    };

    let ctx = match ProxyContext::new(Arc::clone(&config), metrics) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            error!(error = %e, "Failed to build proxy");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if let (Some(port), Some(registry)) = (config.metrics_port, prometheus_registry) {
        let clients = Arc::clone(&ctx.registry);
        let rx = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_observability_server(port, registry, clients, rx).await {
                error!(error = %e, port, "Observability server failed");
            }
        });
    }

    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    if let Err(e) = throttle_proxy_lib::run(ctx, shutdown_rx).await {
        error!(error = %e, "Proxy exited with error");
        std::process::exit(1);
    }
}

async fn wait_for_signal() {
    let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Failed to setup SIGTERM handler, relying on Ctrl-C only");
            let _ = signal::ctrl_c().await;
            info!("Received SIGINT, initiating graceful shutdown");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
        _ = signal::ctrl_c() => info!("Received SIGINT, initiating graceful shutdown"),
    }
}
