use crate::constants::FRAME_SIZE_BYTES;

/// Splits decoded audio buffers into fixed-size wire frames.
///
/// Pure and stateless: the returned iterator borrows the buffer, yields
/// frames in order, and the final frame is short when the buffer length is
/// not an exact multiple of the frame length. No padding is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameChunker {
    frame_len: usize,
}

impl Default for FrameChunker {
    fn default() -> Self {
        Self::new(FRAME_SIZE_BYTES)
    }
}

impl FrameChunker {
    /// `frame_len` is the transport frame size in decoded bytes.
    ///
    /// # Panics
    ///
    /// Panics if `frame_len` is zero; the frame size comes from transport
    /// constants, so a zero here is a programming error.
    pub fn new(frame_len: usize) -> Self {
        assert!(frame_len > 0, "frame length must be nonzero");
        Self { frame_len }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Number of frames `frames` will yield for a buffer of `buf_len` bytes.
    pub fn frame_count(&self, buf_len: usize) -> usize {
        buf_len.div_ceil(self.frame_len)
    }

    /// Lazy, restartable iterator over the frames of `buf`.
    pub fn frames<'a>(&self, buf: &'a [u8]) -> std::slice::Chunks<'a, u8> {
        buf.chunks(self.frame_len)
    }
}
