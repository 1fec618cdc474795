//! Common types and the provider seam for streaming speech recognition.
//!
//! The relay only ever talks to one recognition backend at a time, but the
//! backend sits behind the [`SpeechClient`] trait so the per-connection
//! session logic can be exercised against a scripted stand-in.

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::SAMPLE_RATE_HERTZ;

/// Pull-based sequence of fixed-size audio frames fed to the recognizer.
///
/// `Sync` as well as `Send`: the AWS Transcribe event-stream sender requires
/// the audio stream to be `Send + Sync`, so the boxed stream carries both.
pub type AudioFrames = Pin<Box<dyn Stream<Item = Bytes> + Send + Sync + 'static>>;

/// Inbound recognition events for one streaming session.
///
/// The channel ends (recv returns `None`) when the remote stream closes; a
/// stream-level failure is delivered as a final `Err` item.
pub type TranscriptEvents = mpsc::Receiver<Result<TranscriptEvent, SttError>>;

/// One recognition event from the service.
///
/// `transcript` is the service's cumulative candidate for the current
/// utterance: later events may replace earlier text, not merely extend it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    /// Cumulative transcript of the utterance so far.
    pub transcript: String,
    /// Whether the service has finalized this utterance.
    pub is_final: bool,
}

/// Audio encoding of the upstream stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MediaEncoding {
    /// PCM 16-bit signed little-endian (what browser capture delivers).
    #[default]
    #[serde(rename = "pcm")]
    Pcm,
    /// FLAC lossless compression.
    #[serde(rename = "flac")]
    Flac,
    /// OPUS encoded audio in an OGG container.
    #[serde(rename = "ogg-opus")]
    OggOpus,
}

impl MediaEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm => "pcm",
            Self::Flac => "flac",
            Self::OggOpus => "ogg-opus",
        }
    }
}

/// Parameters of one streaming recognition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionConfig {
    /// BCP-47 language code, e.g. `en-US`.
    pub language_code: String,
    /// Sample rate of the inbound PCM stream.
    pub sample_rate_hertz: u32,
    /// Encoding of the inbound audio.
    pub encoding: MediaEncoding,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language_code: "en-US".to_string(),
            sample_rate_hertz: SAMPLE_RATE_HERTZ,
            encoding: MediaEncoding::Pcm,
        }
    }
}

/// Errors surfaced by a recognition backend.
///
/// All variants are service-level failures from the connection's point of
/// view: they end the active session and are reported to the client as one
/// `error` message. Nothing here is retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SttError {
    /// Invalid or incomplete provider configuration.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Opening the streaming request failed (network, auth, timeout).
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The service reported an error mid-stream.
    #[error("provider error: {0}")]
    ProviderError(String),
}

/// A speech recognition backend able to serve one streaming session.
///
/// `start_stream` consumes the frame stream until it ends and returns the
/// event channel for the same session. Opening failures are returned
/// directly; mid-stream failures arrive as an `Err` event.
#[async_trait::async_trait]
pub trait SpeechClient: Send + Sync {
    async fn start_stream(
        &self,
        config: &RecognitionConfig,
        audio: AudioFrames,
    ) -> Result<TranscriptEvents, SttError>;
}
