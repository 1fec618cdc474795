//! Amazon Transcribe Streaming recognition backend.
//!
//! Uses the AWS SDK for Rust to open one bidirectional streaming request
//! per transcription session. Audio is sent as fixed 1024-byte frames and
//! transcript results are received as they become available.
//!
//! # Limitations
//!
//! - One stream per HTTP/2 session
//! - PCM audio must be 16-bit signed little-endian

mod client;
mod config;

pub use client::AwsTranscribeClient;
pub use config::{AwsRegion, AwsTranscribeConfig, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
