use crate::protocol::{SessionSettings, TranscriptionSettings, TurnDetection};

/// Default realtime endpoint of the translation service.
pub const DEFAULT_ENDPOINT: &str = "wss://api.openai.com/v1/realtime";

/// Protocol-version header required by the service at connect time.
pub const PROTOCOL_HEADER_NAME: &str = "openai-beta";
pub const PROTOCOL_HEADER_VALUE: &str = "realtime=v1";

/// Everything needed to open and configure one translation session.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Base websocket endpoint, without the model query parameter.
    pub endpoint: String,
    /// Model identifier appended as a query parameter.
    pub model: String,
    /// Bearer credential sent at connect time.
    pub api_key: String,
    /// Session configuration pushed once after the socket opens.
    pub session: SessionSettings,
}

impl ConnectorConfig {
    pub fn new(model: String, api_key: String, instructions: String, voice: String) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model,
            api_key,
            session: Self::default_session_settings(instructions, voice),
        }
    }

    pub fn url(&self) -> String {
        format!("{}?model={}", self.endpoint, self.model)
    }

    /// Session settings matching the telephony leg: companded 8 kHz audio in
    /// both directions (no transcoding anywhere in the relay) and
    /// server-driven turn detection.
    pub fn default_session_settings(instructions: String, voice: String) -> SessionSettings {
        SessionSettings {
            modalities: vec!["text".to_string(), "audio".to_string()],
            instructions,
            voice,
            input_audio_format: "g711_ulaw".to_string(),
            output_audio_format: "g711_ulaw".to_string(),
            input_audio_transcription: TranscriptionSettings {
                model: "whisper-1".to_string(),
            },
            turn_detection: TurnDetection::default(),
        }
    }
}
