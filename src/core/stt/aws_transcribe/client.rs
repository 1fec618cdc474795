//! Amazon Transcribe Streaming client.
//!
//! Implements [`SpeechClient`] on top of the AWS SDK's bidirectional
//! event stream. One call to `start_stream` opens one
//! `StartStreamTranscription` request: the outbound side is fed by the
//! audio frame stream, the inbound transcript results are flattened into
//! [`TranscriptEvent`]s and forwarded over a channel until either side
//! closes.
//!
//! # Audio format requirements
//!
//! - PCM: 16-bit signed little-endian, mono
//! - Sample rate: 8,000 Hz to 48,000 Hz
//!
//! # Authentication
//!
//! Static credentials from configuration when present, otherwise the SDK
//! default chain (environment variables, shared credentials file, IAM
//! instance profiles).

use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_transcribestreaming::Client as TranscribeClient;
use aws_sdk_transcribestreaming::types::{
    AudioEvent, AudioStream, LanguageCode, MediaEncoding as AwsMediaEncoding,
    PartialResultsStability, TranscriptResultStream,
};
use aws_smithy_types::Blob;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::config::{AwsTranscribeConfig, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
use crate::core::stt::base::{
    AudioFrames, MediaEncoding, RecognitionConfig, SpeechClient, SttError, TranscriptEvent,
    TranscriptEvents,
};

/// Timeout for opening the streaming request.
const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Channel buffer size for inbound transcript events.
const EVENT_CHANNEL_BUFFER_SIZE: usize = 32;

/// Streaming speech-to-text via Amazon Transcribe.
pub struct AwsTranscribeClient {
    config: AwsTranscribeConfig,
}

impl AwsTranscribeClient {
    /// Create a client with the given configuration.
    pub fn new(config: AwsTranscribeConfig) -> Result<Self, SttError> {
        config.validate().map_err(SttError::ConfigurationError)?;
        Ok(Self { config })
    }

    /// Map the relay's encoding to the AWS SDK type.
    fn convert_media_encoding(encoding: MediaEncoding) -> AwsMediaEncoding {
        match encoding {
            MediaEncoding::Pcm => AwsMediaEncoding::Pcm,
            MediaEncoding::Flac => AwsMediaEncoding::Flac,
            MediaEncoding::OggOpus => AwsMediaEncoding::OggOpus,
        }
    }

    /// Map a language code string to the AWS SDK enum.
    fn convert_language_code(language: &str) -> LanguageCode {
        match language.to_lowercase().as_str() {
            "en-us" | "en_us" => LanguageCode::EnUs,
            "en-gb" | "en_gb" => LanguageCode::EnGb,
            "en-au" | "en_au" => LanguageCode::EnAu,
            "es-us" | "es_us" => LanguageCode::EsUs,
            "es-es" | "es_es" => LanguageCode::EsEs,
            "fr-fr" | "fr_fr" => LanguageCode::FrFr,
            "fr-ca" | "fr_ca" => LanguageCode::FrCa,
            "de-de" | "de_de" => LanguageCode::DeDe,
            "it-it" | "it_it" => LanguageCode::ItIt,
            "pt-br" | "pt_br" => LanguageCode::PtBr,
            "ja-jp" | "ja_jp" => LanguageCode::JaJp,
            "ko-kr" | "ko_kr" => LanguageCode::KoKr,
            "zh-cn" | "zh_cn" => LanguageCode::ZhCn,
            "hi-in" | "hi_in" => LanguageCode::HiIn,
            other => {
                warn!("unsupported language code '{}', defaulting to en-US", other);
                LanguageCode::EnUs
            }
        }
    }

    /// Build the SDK configuration, preferring static credentials.
    async fn load_aws_config(&self) -> aws_config::SdkConfig {
        let region = aws_config::Region::new(self.config.region.as_str());

        if let (Some(access_key_id), Some(secret_access_key)) = (
            self.config.access_key_id.clone(),
            self.config.secret_access_key.clone(),
        ) {
            let credentials = aws_credential_types::Credentials::new(
                access_key_id,
                secret_access_key,
                self.config.session_token.clone(),
                None,
                "caption-relay",
            );

            aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .credentials_provider(credentials)
                .load()
                .await
        } else {
            aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await
        }
    }
}

#[async_trait::async_trait]
impl SpeechClient for AwsTranscribeClient {
    async fn start_stream(
        &self,
        config: &RecognitionConfig,
        audio: AudioFrames,
    ) -> Result<TranscriptEvents, SttError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&config.sample_rate_hertz) {
            return Err(SttError::ConfigurationError(format!(
                "sample rate must be between {} and {} Hz, got {}",
                MIN_SAMPLE_RATE, MAX_SAMPLE_RATE, config.sample_rate_hertz
            )));
        }

        let aws_config = self.load_aws_config().await;
        let client = TranscribeClient::new(&aws_config);

        // One AudioEvent per fixed-size frame; the request body ends when the
        // frame stream does.
        let audio_stream = async_stream::stream! {
            let mut frames = audio;
            while let Some(frame) = frames.next().await {
                let audio_event = AudioEvent::builder()
                    .audio_chunk(Blob::new(frame.to_vec()))
                    .build();
                yield Ok(AudioStream::AudioEvent(audio_event));
            }
            debug!("outbound audio stream ended");
        };

        let mut request = client
            .start_stream_transcription()
            .language_code(Self::convert_language_code(&config.language_code))
            .media_sample_rate_hertz(config.sample_rate_hertz as i32)
            .media_encoding(Self::convert_media_encoding(config.encoding));

        if self.config.partial_results_stabilization {
            request = request
                .enable_partial_results_stabilization(true)
                .partial_results_stability(PartialResultsStability::High);
        }

        let output = tokio::time::timeout(
            Duration::from_secs(CONNECTION_TIMEOUT_SECS),
            request.audio_stream(audio_stream.into()).send(),
        )
        .await
        .map_err(|_| SttError::ConnectionFailed("connection timeout".to_string()))?
        .map_err(|e| {
            SttError::ConnectionFailed(format!("failed to start Amazon Transcribe stream: {e}"))
        })?;

        if let Some(session_id) = output.session_id() {
            info!(session_id = %session_id, "Amazon Transcribe session started");
        }

        let (event_tx, event_rx) =
            mpsc::channel::<Result<TranscriptEvent, SttError>>(EVENT_CHANNEL_BUFFER_SIZE);

        tokio::spawn(async move {
            let mut result_stream = output.transcript_result_stream;
            loop {
                match result_stream.recv().await {
                    Ok(Some(TranscriptResultStream::TranscriptEvent(transcript_event))) => {
                        let Some(transcript) = transcript_event.transcript else {
                            continue;
                        };
                        for result in transcript.results.unwrap_or_default() {
                            if let Some(alternatives) = result.alternatives
                                && let Some(alternative) = alternatives.first()
                                && let Some(text) = &alternative.transcript
                            {
                                // The service emits empty transcripts while
                                // listening to silence; skip them.
                                if text.trim().is_empty() {
                                    continue;
                                }

                                let event = TranscriptEvent {
                                    transcript: text.clone(),
                                    is_final: !result.is_partial,
                                };
                                if event_tx.send(Ok(event)).await.is_err() {
                                    debug!("transcript consumer gone, closing result stream");
                                    return;
                                }
                            }
                        }
                    }
                    Ok(Some(_)) => {
                        debug!("ignoring unknown event type from Transcribe");
                    }
                    Ok(None) => {
                        info!("Transcribe result stream ended");
                        break;
                    }
                    Err(e) => {
                        let stt_error =
                            SttError::ProviderError(format!("Amazon Transcribe stream error: {e}"));
                        error!("{stt_error}");
                        let _ = event_tx.send(Err(stt_error)).await;
                        break;
                    }
                }
            }
        });

        Ok(event_rx)
    }
}
