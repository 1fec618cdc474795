//! Transcription WebSocket: protocol types, the per-connection state
//! machine, and the axum handler that wires them to a socket.

mod handler;
pub mod messages;
pub mod session;

pub use handler::transcribe_handler;
