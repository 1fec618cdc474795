//! Wire protocol for the transcription WebSocket.
//!
//! Control traffic is JSON text frames; microphone audio arrives as binary
//! frames and never appears here.

use serde::{Deserialize, Serialize};

/// Incoming control messages from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    /// Begin a transcription session. Ignored while one is active.
    #[serde(rename = "start_transcription")]
    StartTranscription,

    /// End the active transcription session. Ignored while idle.
    #[serde(rename = "stop_transcription")]
    StopTranscription,
}

/// Outgoing messages to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    /// Incremental transcript update.
    #[serde(rename = "transcription")]
    Transcription {
        /// New text since the previous update (full utterance when final).
        text: String,
        /// Whether this update closes the utterance.
        is_final: bool,
    },

    /// Session or service failure. The session is torn down; the client
    /// must send `start_transcription` again to resume.
    #[serde(rename = "error")]
    Error {
        /// Human-readable description.
        message: String,
    },
}

/// Routing envelope for the connection's writer task.
pub enum MessageRoute {
    /// JSON text message.
    Outgoing(OutgoingMessage),
    /// Close the connection.
    Close,
}
