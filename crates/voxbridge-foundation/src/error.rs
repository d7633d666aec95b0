use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol decode error: {0}")]
    Decode(#[from] ProtocolDecodeError),

    #[error("Remote service error (code: {code:?}): {message}")]
    RemoteService {
        code: Option<String>,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

/// Which of the two per-call sockets an error originated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketSide {
    Telephony,
    Translation,
}

impl fmt::Display for SocketSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketSide::Telephony => write!(f, "telephony"),
            SocketSide::Translation => write!(f, "translation"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open {side} socket: {reason}")]
    ConnectFailed { side: SocketSide, reason: String },

    #[error("{side} connection not ready within {timeout:?}")]
    ReadyTimeout { side: SocketSide, timeout: Duration },

    #[error("{side} socket closed unexpectedly")]
    Closed { side: SocketSide },

    #[error("Write to {side} socket failed: {reason}")]
    WriteFailed { side: SocketSide, reason: String },
}

#[derive(Error, Debug)]
pub enum ProtocolDecodeError {
    #[error("Malformed {side} message: {detail}")]
    Malformed { side: SocketSide, detail: String },

    #[error("Audio payload is not valid base64: {0}")]
    Payload(String),
}

/// What the session loop does with a classified error.
///
/// No error is ever retried: calls are not resumed mid-stream, so the
/// choice is between continuing the stream and tearing it down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Close both sockets and end the session.
    TeardownSession,
    /// Log and keep the session running.
    LogAndContinue,
    /// Unrecoverable at process level.
    Fatal,
}

impl AppError {
    pub fn disposition(&self) -> Disposition {
        match self {
            AppError::Transport(_) => Disposition::TeardownSession,
            AppError::Decode(_) => Disposition::LogAndContinue,
            AppError::RemoteService { .. } => Disposition::LogAndContinue,
            AppError::Config(_) | AppError::Fatal(_) => Disposition::Fatal,
            AppError::ShutdownRequested => Disposition::TeardownSession,
        }
    }
}
