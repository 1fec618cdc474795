//! Route configuration.

pub mod transcribe;

pub use transcribe::create_transcribe_router;
