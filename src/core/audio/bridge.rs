//! Push-to-pull bridge between the WebSocket receive loop and the upstream
//! audio stream.
//!
//! Audio chunks arrive whenever the client sends them; the recognition
//! service consumes a pull-based stream of fixed-size frames. The bridge is
//! an explicit bounded queue: the connection handler pushes chunks through a
//! [`ChunkSender`], and the consumer side re-frames them and yields frames
//! in arrival order. A dedicated shutdown signal ends the stream promptly
//! even when the client has gone silent, so teardown never waits on future
//! input.

use bytes::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::framer::FrameBuffer;

/// Channel buffer size for audio chunks (bounded for backpressure).
const CHUNK_CHANNEL_BUFFER_SIZE: usize = 32;

/// Push side of the bridge, held by the connection handler.
pub struct ChunkSender {
    chunk_tx: mpsc::Sender<Bytes>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ChunkSender {
    /// Queue one audio chunk for framing.
    ///
    /// Applies backpressure when the upstream consumer falls behind. Fails
    /// once the stream has terminated; late chunks are the caller's to drop.
    pub async fn send(&self, chunk: Bytes) -> Result<(), ChunkSendError> {
        self.chunk_tx
            .send(chunk)
            .await
            .map_err(|_| ChunkSendError::Terminated)
    }

    /// Signal the consumer to end the frame sequence.
    ///
    /// Chunks already queued are still framed and yielded; the stream ends
    /// right after the queue drains. Dropping the sender without calling
    /// `close` has the same effect.
    pub fn close(mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

/// Error returned when pushing a chunk into a terminated bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChunkSendError {
    /// The frame stream has ended; the chunk was dropped.
    #[error("audio bridge terminated")]
    Terminated,
}

/// Create a bridge, returning the push handle and the pull stream.
///
/// The stream yields frames of exactly [`crate::core::FRAME_SIZE`] bytes in
/// the order the underlying bytes arrived, and ends cleanly (no error item)
/// on shutdown or when the sender is dropped. Any sub-frame residue held at
/// that point is discarded.
pub fn channel() -> (ChunkSender, impl Stream<Item = Bytes> + Send + 'static) {
    let (chunk_tx, mut chunk_rx) = mpsc::channel::<Bytes>(CHUNK_CHANNEL_BUFFER_SIZE);
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let frames = async_stream::stream! {
        let mut framer = FrameBuffer::new();
        loop {
            tokio::select! {
                // Queued chunks drain before a termination signal is
                // honored, so the end of the stream is deterministic.
                biased;

                maybe_chunk = chunk_rx.recv() => {
                    match maybe_chunk {
                        Some(chunk) => {
                            for frame in framer.push(&chunk) {
                                yield frame;
                            }
                        }
                        None => break,
                    }
                }
                _ = &mut shutdown_rx => break,
            }
        }
        if framer.residual_len() > 0 {
            debug!(
                residual_bytes = framer.residual_len(),
                "discarding sub-frame audio residue on stream end"
            );
        }
    };

    (
        ChunkSender {
            chunk_tx,
            shutdown_tx: Some(shutdown_tx),
        },
        frames,
    )
}
