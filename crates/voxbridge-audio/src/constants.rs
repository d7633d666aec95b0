/// Decoded bytes per telephony media message (20 ms of 8 kHz companded audio).
pub const FRAME_SIZE_BYTES: usize = 160;

/// Audio carried by one frame, in milliseconds.
pub const FRAME_DURATION_MS: u32 = 20;

/// Native sample rate of the telephony transport.
pub const SAMPLE_RATE_HZ: u32 = 8_000;
