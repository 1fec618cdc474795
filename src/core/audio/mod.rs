//! Audio plumbing between the client connection and the recognition service:
//! fixed-size framing and the push-to-pull stream bridge.

pub mod bridge;
mod framer;

pub use bridge::{ChunkSendError, ChunkSender};
pub use framer::FrameBuffer;
