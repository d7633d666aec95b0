//! Wire protocol for the realtime translation service.
//!
//! JSON text frames, tagged by a `type` field on both directions. The
//! inbound taxonomy below covers the events the relay reacts to; anything
//! else decodes to [`ServerEvent::Unknown`] and is discarded by the reader.

use serde::{Deserialize, Serialize};

/// Events sent to the translation service.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Sent exactly once, immediately after the socket opens.
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionSettings },

    /// One base64 audio payload appended to the remote input buffer.
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend { audio: String },

    /// Cancel the in-flight synthesis (barge-in).
    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

/// Session configuration carried by the one-time `session.update`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    pub modalities: Vec<String>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub input_audio_transcription: TranscriptionSettings,
    pub turn_detection: TurnDetection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionSettings {
    pub model: String,
}

/// Server-driven voice activity detection parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self {
            kind: "server_vad".to_string(),
            threshold: 0.2,
            prefix_padding_ms: 300,
            silence_duration_ms: 800,
        }
    }
}

/// Events received from the translation service.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated,

    #[serde(rename = "session.updated")]
    SessionUpdated,

    /// Synthesis started.
    #[serde(rename = "response.created")]
    ResponseCreated,

    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        #[serde(default)]
        item: Option<ConversationItem>,
    },

    /// One undecoded synthesized audio chunk.
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta {
        #[serde(default)]
        delta: Option<String>,
    },

    #[serde(rename = "response.audio_transcript.delta")]
    ResponseTranscriptDelta {
        #[serde(default)]
        delta: Option<String>,
    },

    #[serde(rename = "response.audio_transcript.done")]
    ResponseTranscriptDone {
        #[serde(default)]
        transcript: Option<String>,
    },

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted {
        #[serde(default)]
        transcript: Option<String>,
    },

    /// Synthesis completed.
    #[serde(rename = "response.done")]
    ResponseDone,

    /// Synthesis cancelled (barge-in acknowledgment).
    #[serde(rename = "response.cancelled")]
    ResponseCancelled,

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: Option<RemoteError>,
    },

    /// Unrecognized event kind; logged at debug level and discarded.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConversationItem {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteError {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
