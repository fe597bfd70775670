use std::process::ExitCode;

use tokio::net::TcpListener;
use tokio::signal;
use weekday::config::Configuration;
use weekday::{app, initialize_state, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    // read configuration file.  let it in memory.
    let config = match Configuration::default().read() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        },
    };

    let guard = match telemetry::init_tracing(&config.telemetry) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("cannot initialize logging: {err}");
            return ExitCode::FAILURE;
        },
    };

    match config.loaded_from() {
        Some(path) => tracing::info!(path = %path.display(), "configuration loaded"),
        None => tracing::warn!("`config.yaml` not found, using default configuration"),
    }

    let state = match initialize_state(config.clone()).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "cannot initialize application state");
            guard.shutdown();
            return ExitCode::FAILURE;
        },
    };

    let listener = match TcpListener::bind(&config.address).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(address = %config.address, error = %err, "cannot bind address");
            guard.shutdown();
            return ExitCode::FAILURE;
        },
    };

    tracing::info!(
        address = %config.address,
        version = config.version(),
        "server listening"
    );

    let result = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(err) = &result {
        tracing::error!(error = %err, "server error");
    }

    tracing::info!("flushing telemetry");
    guard.shutdown();

    if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
