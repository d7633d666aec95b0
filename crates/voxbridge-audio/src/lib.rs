pub mod chunker;
pub mod constants;

pub use chunker::FrameChunker;
pub use constants::{FRAME_DURATION_MS, FRAME_SIZE_BYTES, SAMPLE_RATE_HZ};
