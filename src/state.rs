//! Shared application state.
//!
//! One `AppState` is built at startup and shared by every connection. All
//! transcription state is per-connection; the only cross-connection data
//! here is the connection accounting used to enforce capacity limits.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::config::ServerConfig;
use crate::core::stt::{AwsTranscribeClient, SpeechClient, SttError};

/// Reason a new WebSocket connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    /// The global connection cap is reached.
    GlobalLimitReached,
    /// This IP already holds its maximum number of connections.
    PerIpLimitReached,
}

/// Application-wide shared state.
pub struct AppState {
    /// Server configuration.
    pub config: ServerConfig,
    /// Recognition backend shared by all connections. Each session opens
    /// its own upstream stream; the client itself holds no per-session
    /// state.
    pub speech: Arc<dyn SpeechClient>,

    /// Number of currently open WebSocket connections.
    active_connections: AtomicUsize,
    /// Open connections per client IP.
    connections_per_ip: DashMap<IpAddr, u32>,
}

impl AppState {
    /// Build state with the Amazon Transcribe backend from configuration.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, SttError> {
        let speech = Arc::new(AwsTranscribeClient::new(config.transcribe())?);
        Ok(Self::with_speech_client(config, speech))
    }

    /// Build state around an explicit recognition backend.
    pub fn with_speech_client(config: ServerConfig, speech: Arc<dyn SpeechClient>) -> Arc<Self> {
        Arc::new(Self {
            config,
            speech,
            active_connections: AtomicUsize::new(0),
            connections_per_ip: DashMap::new(),
        })
    }

    /// Reserve a connection slot for `ip`.
    ///
    /// Counts are reserved before the WebSocket upgrade completes and must
    /// be returned through [`release_connection`] when the connection ends.
    ///
    /// [`release_connection`]: Self::release_connection
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        if let Some(max) = self.config.max_websocket_connections
            && self.active_connections.load(Ordering::Acquire) >= max
        {
            return Err(ConnectionLimitError::GlobalLimitReached);
        }

        {
            let mut per_ip = self.connections_per_ip.entry(ip).or_insert(0);
            if *per_ip >= self.config.max_connections_per_ip {
                return Err(ConnectionLimitError::PerIpLimitReached);
            }
            *per_ip += 1;
        }

        self.active_connections.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Return a connection slot previously acquired for `ip`.
    pub fn release_connection(&self, ip: IpAddr) {
        if let Some(mut per_ip) = self.connections_per_ip.get_mut(&ip) {
            *per_ip = per_ip.saturating_sub(1);
            let drained = *per_ip == 0;
            drop(per_ip);
            if drained {
                self.connections_per_ip.remove_if(&ip, |_, count| *count == 0);
            }
        }

        let _ = self
            .active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
    }

    /// Currently open WebSocket connections.
    pub fn active_connection_count(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }
}
