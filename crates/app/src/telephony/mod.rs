//! Telephony media-stream wire protocol.
//!
//! JSON text frames over one duplex websocket per call. The message kinds
//! and field names are a binary contract with the telephony provider and
//! are reproduced exactly; unknown fields inside known kinds are ignored.

pub mod messages;

pub use messages::{
    decode_message, MediaPayload, OutboundMessage, OutboundPayload, StartMeta, TelephonyMessage,
};
