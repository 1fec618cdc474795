//! Streaming speech recognition: the provider seam and the Amazon
//! Transcribe backend.

pub mod aws_transcribe;
mod base;

pub use aws_transcribe::{AwsRegion, AwsTranscribeClient, AwsTranscribeConfig};
pub use base::{
    AudioFrames, MediaEncoding, RecognitionConfig, SpeechClient, SttError, TranscriptEvent,
    TranscriptEvents,
};
