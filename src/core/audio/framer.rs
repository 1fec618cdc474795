//! Fixed-size framing of the inbound audio chunk stream.
//!
//! Clients send raw PCM in whatever chunk sizes their capture pipeline
//! produces. Amazon Transcribe is fed fixed 1024-byte frames, so the chunk
//! stream is re-sliced here: bytes accumulate in a residual buffer and full
//! frames are split off as soon as enough bytes are available.

use bytes::{Bytes, BytesMut};

use crate::core::FRAME_SIZE;

/// Accumulates arbitrarily-sized audio chunks and slices off fixed-size
/// frames in arrival order.
///
/// Any residue shorter than [`FRAME_SIZE`] stays buffered for the next
/// chunk. When the session ends the residue is dropped with the buffer —
/// trailing sub-frame audio is never sent upstream, and frames are never
/// padded.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    residual: BytesMut,
}

impl FrameBuffer {
    /// Create an empty frame buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and split off every complete frame it unlocks.
    ///
    /// Frames are returned in byte order. The returned `Bytes` are detached
    /// from the internal buffer, so callers may hold them as long as needed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.residual.extend_from_slice(chunk);

        let mut frames = Vec::with_capacity(self.residual.len() / FRAME_SIZE);
        while self.residual.len() >= FRAME_SIZE {
            frames.push(self.residual.split_to(FRAME_SIZE).freeze());
        }
        frames
    }

    /// Number of buffered bytes not yet forming a complete frame.
    pub fn residual_len(&self) -> usize {
        self.residual.len()
    }
}
