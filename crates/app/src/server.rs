//! Telephony-side listener: one websocket per call, one session per socket.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use voxbridge_foundation::shutdown::ShutdownGuard;
use voxbridge_telemetry::RelayMetrics;

use crate::config::SessionConfig;
use crate::session;

/// Accept telephony media-stream connections until shutdown is requested.
///
/// Sessions are fully independent; each accepted socket gets its own task
/// and shares nothing but the metrics counters.
pub async fn serve(
    listener: TcpListener,
    config: Arc<SessionConfig>,
    metrics: Arc<RelayMetrics>,
    shutdown: &ShutdownGuard,
) {
    match listener.local_addr() {
        Ok(addr) => info!("Listening for telephony media streams on {}", addr),
        Err(_) => info!("Listening for telephony media streams"),
    }

    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                info!("Stopping listener");
                break;
            }
            accepted = listener.accept() => {
                let (tcp, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        continue;
                    }
                };
                let config = config.clone();
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    match tokio_tungstenite::accept_async(tcp).await {
                        Ok(socket) => {
                            session::run_session(socket, config, metrics).await;
                        }
                        Err(e) => {
                            warn!("Websocket handshake from {} failed: {}", peer, e);
                        }
                    }
                });
            }
        }
    }
}
