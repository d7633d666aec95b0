use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use voxbridge_app::config::Cli;
use voxbridge_app::server;
use voxbridge_foundation::shutdown::ShutdownHandler;
use voxbridge_foundation::state::{AppState, StateManager};
use voxbridge_telemetry::RelayMetrics;

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "voxbridge.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(guard);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration is validated before any socket is opened.
    let config = Cli::parse().into_config()?;

    init_logging().map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;
    tracing::info!("Starting VoxBridge relay");

    let state_manager = StateManager::new();
    let shutdown = ShutdownHandler::new().install().await;
    let metrics = Arc::new(RelayMetrics::default());

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;

    state_manager.transition(AppState::Running)?;
    tracing::info!("Application state: {:?}", state_manager.current());

    // Periodic relay stats, independent of any session.
    let stats_metrics = metrics.clone();
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        interval.tick().await;
        loop {
            interval.tick().await;
            let snap = stats_metrics.snapshot();
            tracing::info!(
                active_sessions = snap.active_sessions,
                sessions_started = snap.sessions_started,
                frames_in = snap.telephony_frames_in,
                frames_out = snap.telephony_frames_out,
                events = snap.translation_events,
                dropped = snap.audio_payloads_dropped,
                cancellations = snap.cancellations,
                decode_errors = snap.decode_errors,
                remote_errors = snap.remote_errors,
                "Relay stats"
            );
        }
    });

    server::serve(listener, config.session.clone(), metrics.clone(), &shutdown).await;

    tracing::info!("Beginning graceful shutdown");
    state_manager.transition(AppState::Stopping)?;

    stats_handle.abort();
    let _ = stats_handle.await;

    state_manager.transition(AppState::Stopped)?;
    tracing::info!("Shutdown complete");

    Ok(())
}
