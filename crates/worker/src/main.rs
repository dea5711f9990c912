//! Worker entry point.

use std::sync::Arc;

use saga::ReturnWindowPolicy;
use tasks::LogNotifier;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use worker::config::{Config, LogFormat};
use worker::scheduler::{Intervals, Scheduler};
use worker::{AppState, Engine};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
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
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(&config);

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let (repositories, pool) = worker::connect(&config)
        .await
        .expect("failed to open storage");
    if pool.is_none() {
        tracing::warn!("DATABASE_URL is not set, using in-memory storage");
    }

    let return_window =
        chrono::Duration::from_std(config.return_window).expect("return window out of range");
    let engine = Engine::new(
        repositories,
        &worker::in_memory_collaborators(),
        Arc::new(ReturnWindowPolicy::new(return_window)),
        Arc::new(LogNotifier),
    );

    let intervals = Intervals::from_config(&config).expect("sweep interval out of range");
    let scheduler = Scheduler::new(
        engine.runtime.clone(),
        engine.services.exporter.clone(),
        intervals,
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loops = scheduler.spawn(shutdown_rx);

    let storage = if pool.is_some() { "postgres" } else { "memory" };
    let state = Arc::new(AppState::new(&engine, storage));
    let app = worker::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting inspection server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Loops finish their current tick before exiting.
    let _ = shutdown_tx.send(true);
    for handle in loops {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "scheduler loop panicked");
        }
    }

    if let Some(pool) = pool {
        pool.close().await;
    }
    tracing::info!("worker shut down gracefully");
}
