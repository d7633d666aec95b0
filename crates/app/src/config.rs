use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use voxbridge_foundation::error::AppError;
use voxbridge_translate::config::{ConnectorConfig, DEFAULT_ENDPOINT};

const DEFAULT_INSTRUCTIONS: &str =
    "You are a simultaneous interpreter. Translate everything the caller says \
     into English and speak only the translation.";

/// Process configuration, supplied via flags or environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "voxbridge", about = "Telephony media stream to realtime speech translation relay")]
pub struct Cli {
    /// Address to listen on for telephony media-stream connections
    #[arg(long, env = "VOXBRIDGE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "VOXBRIDGE_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Translation model identifier
    #[arg(long, env = "OPENAI_MODEL")]
    pub model: String,

    /// Bearer credential for the translation service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Realtime endpoint of the translation service
    #[arg(long, env = "OPENAI_REALTIME_URL", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Instructions given to the translation session
    #[arg(long, env = "VOXBRIDGE_INSTRUCTIONS", default_value = DEFAULT_INSTRUCTIONS)]
    pub instructions: String,

    /// Synthesis voice
    #[arg(long, env = "VOXBRIDGE_VOICE", default_value = "alloy")]
    pub voice: String,

    /// Seconds to wait for the translation connector to become ready
    #[arg(long, env = "VOXBRIDGE_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,
}

/// Validated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub session: Arc<SessionConfig>,
}

/// Per-session configuration shared by all call sessions.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connector: ConnectorConfig,
    pub connect_timeout: Duration,
}

impl Cli {
    /// Validate and convert into the runtime configuration. Fails before
    /// any socket is opened.
    pub fn into_config(self) -> Result<AppConfig, AppError> {
        if self.model.trim().is_empty() {
            return Err(AppError::Config("model identifier is empty".into()));
        }
        if self.api_key.trim().is_empty() {
            return Err(AppError::Config("translation credential is empty".into()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(AppError::Config("connect timeout must be nonzero".into()));
        }

        let mut connector =
            ConnectorConfig::new(self.model, self.api_key, self.instructions, self.voice);
        connector.endpoint = self.endpoint;

        Ok(AppConfig {
            host: self.host,
            port: self.port,
            session: Arc::new(SessionConfig {
                connector,
                connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(model: &str, key: &str) -> Cli {
        Cli::parse_from([
            "voxbridge",
            "--model",
            model,
            "--api-key",
            key,
        ])
    }

    #[test]
    fn valid_configuration_passes_through() {
        let config = cli("realtime-translate-1", "sk-test").into_config().unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.session.connector.model, "realtime-translate-1");
        assert_eq!(config.session.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn empty_credential_is_a_configuration_error() {
        let err = cli("realtime-translate-1", "  ").into_config().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn empty_model_is_a_configuration_error() {
        let err = cli("", "sk-test").into_config().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
