//! Server configuration.
//!
//! Configuration is assembled from three sources with the priority
//! YAML file > environment variables > defaults. `.env` files are loaded
//! into the environment by the binary before this module runs.
//!
//! # Example
//! ```rust,no_run
//! use caption_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // YAML file on top of the environment
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use zeroize::Zeroize;

use crate::core::SAMPLE_RATE_HERTZ;
use crate::core::stt::{AwsRegion, AwsTranscribeConfig, MediaEncoding, RecognitionConfig};

/// Errors produced while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid YAML.
    #[error("failed to parse configuration file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// TLS configuration for HTTPS and WSS.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format).
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format).
    pub key_path: PathBuf,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// AWS region for Amazon Transcribe (e.g. "us-east-1").
    pub aws_region: Option<String>,
    /// Static AWS access key id; falls back to the SDK credential chain.
    pub aws_access_key_id: Option<String>,
    /// Static AWS secret access key.
    pub aws_secret_access_key: Option<String>,
    /// Session token for temporary credentials.
    pub aws_session_token: Option<String>,

    /// Language transcribed for every connection.
    pub language_code: String,
    /// Ask the service to stabilize partial results.
    pub partial_results_stabilization: bool,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all).
    /// Default: None (same-origin only).
    pub cors_allowed_origins: Option<String>,

    // Connection limits
    /// Maximum concurrent WebSocket connections. Default: None (unlimited).
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address. Default: 100.
    pub max_connections_per_ip: u32,
}

/// Zeroize credential material when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        if let Some(ref mut key) = self.aws_access_key_id {
            key.zeroize();
        }
        if let Some(ref mut secret) = self.aws_secret_access_key {
            secret.zeroize();
        }
        if let Some(ref mut token) = self.aws_session_token {
            token.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables and defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let tls = match (env_var("TLS_CERT_PATH"), env_var("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid(
                    "TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string(),
                ));
            }
        };

        let config = Self {
            host: env_var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_env("PORT")?.unwrap_or(3000),
            tls,
            aws_region: env_var("AWS_REGION"),
            aws_access_key_id: env_var("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: env_var("AWS_SECRET_ACCESS_KEY"),
            aws_session_token: env_var("AWS_SESSION_TOKEN"),
            language_code: env_var("TRANSCRIBE_LANGUAGE_CODE")
                .unwrap_or_else(|| "en-US".to_string()),
            partial_results_stabilization: parse_env("TRANSCRIBE_PARTIAL_STABILIZATION")?
                .unwrap_or(true),
            cors_allowed_origins: env_var("CORS_ALLOWED_ORIGINS"),
            max_websocket_connections: parse_env("MAX_WEBSOCKET_CONNECTIONS")?,
            max_connections_per_ip: parse_env("MAX_CONNECTIONS_PER_IP")?.unwrap_or(100),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, overriding environment values.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let yaml: YamlConfig = serde_yaml::from_str(&contents)?;

        let mut config = Self::from_env()?;

        if let Some(server) = yaml.server {
            if let Some(host) = server.host {
                config.host = host;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
            if let Some(tls) = server.tls {
                match (tls.cert_path, tls.key_path) {
                    (Some(cert), Some(key)) => {
                        config.tls = Some(TlsConfig {
                            cert_path: PathBuf::from(cert),
                            key_path: PathBuf::from(key),
                        });
                    }
                    (None, None) => {}
                    _ => {
                        return Err(ConfigError::Invalid(
                            "tls.cert_path and tls.key_path must be set together".to_string(),
                        ));
                    }
                }
            }
        }

        if let Some(transcribe) = yaml.transcribe {
            if let Some(region) = transcribe.region {
                config.aws_region = Some(region);
            }
            if let Some(access_key_id) = transcribe.access_key_id {
                config.aws_access_key_id = Some(access_key_id);
            }
            if let Some(secret_access_key) = transcribe.secret_access_key {
                config.aws_secret_access_key = Some(secret_access_key);
            }
            if let Some(session_token) = transcribe.session_token {
                config.aws_session_token = Some(session_token);
            }
            if let Some(language_code) = transcribe.language_code {
                config.language_code = language_code;
            }
            if let Some(stabilization) = transcribe.partial_results_stabilization {
                config.partial_results_stabilization = stabilization;
            }
        }

        if let Some(security) = yaml.security {
            if let Some(origins) = security.cors_allowed_origins {
                config.cors_allowed_origins = Some(origins);
            }
            if let Some(max) = security.max_websocket_connections {
                config.max_websocket_connections = Some(max);
            }
            if let Some(max) = security.max_connections_per_ip {
                config.max_connections_per_ip = max;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Socket address string the server binds to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether TLS termination is configured.
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Recognition parameters shared by every connection.
    ///
    /// Sample rate and encoding are fixed contract constants with the
    /// client capture pipeline; only the language is configurable.
    pub fn recognition(&self) -> RecognitionConfig {
        RecognitionConfig {
            language_code: self.language_code.clone(),
            sample_rate_hertz: SAMPLE_RATE_HERTZ,
            encoding: MediaEncoding::Pcm,
        }
    }

    /// Amazon Transcribe client configuration.
    pub fn transcribe(&self) -> AwsTranscribeConfig {
        AwsTranscribeConfig {
            region: AwsRegion::from_str_or_default(self.aws_region.as_deref().unwrap_or_default()),
            access_key_id: self.aws_access_key_id.clone(),
            secret_access_key: self.aws_secret_access_key.clone(),
            session_token: self.aws_session_token.clone(),
            partial_results_stabilization: self.partial_results_stabilization,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.language_code.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "language code must not be empty".to_string(),
            ));
        }
        if self.max_connections_per_ip == 0 {
            return Err(ConfigError::Invalid(
                "max connections per IP must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env_var(name) {
        Some(value) => value.parse::<T>().map(Some).map_err(|_| {
            ConfigError::Invalid(format!("environment variable {name} has an invalid value"))
        }),
        None => Ok(None),
    }
}

/// YAML configuration file structure.
///
/// All fields are optional so a file may override only what it needs.
///
/// # Example
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3000
///   tls:
///     cert_path: "/etc/caption-relay/cert.pem"
///     key_path: "/etc/caption-relay/key.pem"
///
/// transcribe:
///   region: "eu-west-1"
///   language_code: "en-GB"
///
/// security:
///   cors_allowed_origins: "https://app.example.com"
///   max_websocket_connections: 5000
///   max_connections_per_ip: 20
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct YamlConfig {
    server: Option<ServerYaml>,
    transcribe: Option<TranscribeYaml>,
    security: Option<SecurityYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct ServerYaml {
    host: Option<String>,
    port: Option<u16>,
    tls: Option<TlsYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct TlsYaml {
    cert_path: Option<String>,
    key_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct TranscribeYaml {
    region: Option<String>,
    language_code: Option<String>,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    session_token: Option<String>,
    partial_results_stabilization: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct SecurityYaml {
    cors_allowed_origins: Option<String>,
    max_websocket_connections: Option<usize>,
    max_connections_per_ip: Option<u32>,
}
