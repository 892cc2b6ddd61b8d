use std::collections::BTreeSet;
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::discovery::Resolution;
use crate::protocol::cast::{CodecError, DecodeError};
use crate::types::ChannelKind;

/// Errors that can occur while discovering, connecting to or monitoring
/// Cast devices
#[derive(Debug, Error)]
pub enum CastError {
    // ===== Discovery Errors =====
    /// mDNS discovery failed
    #[error("discovery failed: {message}")]
    DiscoveryFailed {
        /// Description of the failure
        message: String,
        /// The underlying source of the error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Not every requested device was announced before the deadline
    #[error("discovery timed out; unresolved: {}", format_names(.partial.unresolved.iter()))]
    DiscoveryTimeout {
        /// Devices that did resolve, plus the names that did not
        partial: Resolution,
    },

    /// No requested device could be resolved and opened
    #[error(
        "no devices available; unmatched: {}, failed: {failed}",
        format_names(.unmatched.iter())
    )]
    NoDevicesAvailable {
        /// Requested names discovery never saw
        unmatched: BTreeSet<String>,
        /// Number of resolved devices whose session failed to open
        failed: usize,
    },

    // ===== Connection Errors =====
    /// Failed to establish connection to device
    #[error("connection failed to {device_name}: {message}")]
    ConnectionFailed {
        /// The name of the device
        device_name: String,
        /// Description of the failure
        message: String,
        /// The underlying source of the error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// TCP/TLS connection attempt timed out
    #[error("connection to {device_name} timed out after {duration:?}")]
    ConnectionTimeout {
        /// The name of the device
        device_name: String,
        /// The duration of the timeout
        duration: Duration,
    },

    /// Device did not report its status in time
    #[error("handshake with {device_name} timed out after {duration:?}")]
    HandshakeTimeout {
        /// The name of the device
        device_name: String,
        /// The duration of the timeout
        duration: Duration,
    },

    // ===== Protocol Errors =====
    /// A frame could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The frame stream itself is broken
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    // ===== Listener Errors =====
    /// A listener is already attached to the channel
    #[error("{channel} listener already registered for {device_name}")]
    ListenerAlreadyRegistered {
        /// The name of the device
        device_name: String,
        /// The occupied channel
        channel: ChannelKind,
    },

    // ===== State Errors =====
    /// Operation not valid in current state
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the state is invalid
        message: String,
        /// The current state
        current_state: String,
    },

    /// Invalid parameter provided
    #[error("invalid parameter: {name} - {message}")]
    InvalidParameter {
        /// The name of the parameter
        name: String,
        /// Description of the error
        message: String,
    },

    // ===== I/O Errors =====
    /// Network I/O error
    #[error("network error: {0}")]
    NetworkError(#[from] io::Error),

    /// General I/O error
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the error
        message: String,
        /// The underlying source of the error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CastError {
    /// Check if this error is recoverable by retrying
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::HandshakeTimeout { .. }
                | Self::DiscoveryTimeout { .. }
                | Self::NetworkError(_)
                | Self::Decode(_)
        )
    }

    /// Check if this error indicates connection loss
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::ConnectionTimeout { .. }
        )
    }
}

fn format_names<'a>(names: impl IntoIterator<Item = &'a String>) -> String {
    names
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, CastError>;
