use std::env;
use std::path::PathBuf;
use std::process;

use conn_core::{Server, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(log_level)).init();

    let config_path = env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match ServerConfig::load_from_path(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!(path = %config_path.display(), %err, "failed to load configuration");
            process::exit(1);
        }
    };

    let server = match Server::new(config) {
        Ok(server) => server,
        Err(err) => {
            error!(%err, "failed to initialize server");
            process::exit(1);
        }
    };

    if let Err(err) = server.start().await {
        error!(%err, "failed to start server");
        process::exit(1);
    }
    info!("server started; awaiting shutdown signal");

    shutdown_signal().await;
    server.stop().await;
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
