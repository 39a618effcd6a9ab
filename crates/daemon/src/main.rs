// SPDX-License-Identifier: MIT

//! `inferd`: the daemon binary. Loads config, initializes tracing to a
//! rolling file under `<root>/log/`, wires the scheduler and its
//! collaborators, and serves the HTTP surface until a shutdown signal
//! arrives.
//!
//! Exits `0` on graceful shutdown, nonzero on a fatal init error (storage
//! not writable, port in use, catalog schema mismatch).

mod config;
mod http;
mod install_request;
mod state;

use std::path::PathBuf;

use state::AppState;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "/etc/inferd/inferd.toml";

#[tokio::main]
async fn main() {
    let config_path =
        std::env::var("INFERD_CONFIG").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = match config::Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("inferd: failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    let log_dir = config.root_dir.join("log");
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("inferd: storage root {} is not writable: {e}", config.root_dir.display());
        std::process::exit(1);
    }
    let file_appender = tracing_appender::rolling::never(&log_dir, "daemon.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    tracing::info!(root = %config.root_dir.display(), bind = %config.bind_addr, "starting inferd");

    let state = match AppState::bootstrap(&config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "fatal error during daemon startup");
            std::process::exit(1);
        }
    };

    let app = http::router(state);

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %config.bind_addr, error = %e, "failed to bind HTTP listener");
            std::process::exit(1);
        }
    };

    tracing::info!(addr = %config.bind_addr, "inferd listening");

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        tracing::error!(error = %e, "HTTP server exited with an error");
        std::process::exit(1);
    }

    tracing::info!("inferd shut down gracefully");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
}
