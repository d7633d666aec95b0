use serde::{Deserialize, Serialize};

use voxbridge_foundation::error::{ProtocolDecodeError, SocketSide};

/// Inbound control/media messages from the telephony provider.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyMessage {
    /// Socket-level hello, sent once before `start`.
    Connected,

    /// Media stream opened; carries the identifiers this session runs under.
    Start {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        start: StartMeta,
    },

    /// One audio frame, roughly every 20 ms.
    Media { media: MediaPayload },

    /// Media stream ended.
    Stop,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StartMeta {
    #[serde(rename = "callSid")]
    pub call_sid: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MediaPayload {
    /// Base64-encoded companded audio.
    pub payload: String,
}

/// Outbound messages to the telephony provider.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundMessage {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundPayload,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutboundPayload {
    pub payload: String,
}

impl OutboundMessage {
    pub fn media(stream_sid: String, payload: String) -> Self {
        Self::Media {
            stream_sid,
            media: OutboundPayload { payload },
        }
    }
}

/// Decode one inbound text frame. Malformed frames are reported as decode
/// errors for the caller to log and discard; they never end the stream.
pub fn decode_message(text: &str) -> Result<TelephonyMessage, ProtocolDecodeError> {
    serde_json::from_str(text).map_err(|e| ProtocolDecodeError::Malformed {
        side: SocketSide::Telephony,
        detail: e.to_string(),
    })
}
