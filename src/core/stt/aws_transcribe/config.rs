//! Configuration for the Amazon Transcribe Streaming client.

use serde::{Deserialize, Serialize};

/// AWS regions where Amazon Transcribe Streaming is available.
///
/// Pick the region closest to your users for lowest latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AwsRegion {
    /// US East (N. Virginia)
    #[default]
    #[serde(rename = "us-east-1")]
    UsEast1,
    /// US East (Ohio)
    #[serde(rename = "us-east-2")]
    UsEast2,
    /// US West (Oregon)
    #[serde(rename = "us-west-2")]
    UsWest2,
    /// Canada (Central)
    #[serde(rename = "ca-central-1")]
    CaCentral1,
    /// Europe (Frankfurt)
    #[serde(rename = "eu-central-1")]
    EuCentral1,
    /// Europe (Ireland)
    #[serde(rename = "eu-west-1")]
    EuWest1,
    /// Europe (London)
    #[serde(rename = "eu-west-2")]
    EuWest2,
    /// Asia Pacific (Mumbai)
    #[serde(rename = "ap-south-1")]
    ApSouth1,
    /// Asia Pacific (Singapore)
    #[serde(rename = "ap-southeast-1")]
    ApSoutheast1,
    /// Asia Pacific (Sydney)
    #[serde(rename = "ap-southeast-2")]
    ApSoutheast2,
    /// Asia Pacific (Tokyo)
    #[serde(rename = "ap-northeast-1")]
    ApNortheast1,
    /// South America (Sao Paulo)
    #[serde(rename = "sa-east-1")]
    SaEast1,
}

impl AwsRegion {
    /// Convert to the AWS region string.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UsEast1 => "us-east-1",
            Self::UsEast2 => "us-east-2",
            Self::UsWest2 => "us-west-2",
            Self::CaCentral1 => "ca-central-1",
            Self::EuCentral1 => "eu-central-1",
            Self::EuWest1 => "eu-west-1",
            Self::EuWest2 => "eu-west-2",
            Self::ApSouth1 => "ap-south-1",
            Self::ApSoutheast1 => "ap-southeast-1",
            Self::ApSoutheast2 => "ap-southeast-2",
            Self::ApNortheast1 => "ap-northeast-1",
            Self::SaEast1 => "sa-east-1",
        }
    }

    /// Parse from string, with fallback to the default (us-east-1).
    pub fn from_str_or_default(s: &str) -> Self {
        let lowered = s.to_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|region| region.as_str() == lowered)
            .unwrap_or_default()
    }

    /// All supported regions.
    pub fn all() -> &'static [AwsRegion] {
        &[
            Self::UsEast1,
            Self::UsEast2,
            Self::UsWest2,
            Self::CaCentral1,
            Self::EuCentral1,
            Self::EuWest1,
            Self::EuWest2,
            Self::ApSouth1,
            Self::ApSoutheast1,
            Self::ApSoutheast2,
            Self::ApNortheast1,
            Self::SaEast1,
        ]
    }
}

impl std::fmt::Display for AwsRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Amazon Transcribe accepts 8 kHz up to 48 kHz input.
pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 48_000;

/// Client configuration for Amazon Transcribe Streaming.
///
/// When the static credentials are absent the SDK's default credential
/// chain is used (environment, shared credentials file, IAM role).
#[derive(Debug, Clone, Default)]
pub struct AwsTranscribeConfig {
    /// Region the streaming endpoint is reached in.
    pub region: AwsRegion,
    /// Static AWS access key id.
    pub access_key_id: Option<String>,
    /// Static AWS secret access key.
    pub secret_access_key: Option<String>,
    /// Optional session token for temporary credentials.
    pub session_token: Option<String>,
    /// Ask the service to stabilize partial results for live captioning.
    pub partial_results_stabilization: bool,
}

impl AwsTranscribeConfig {
    /// Validate credential pairing.
    pub fn validate(&self) -> Result<(), String> {
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(
                "AWS access key id and secret access key must be provided together".to_string(),
            );
        }
        Ok(())
    }
}
