//! # Error Types
//!
//! Custom error types for FreeD Reader using `thiserror`.
//!
//! Per-packet validation failures live in [`DecodeError`] and never end a
//! session. Everything else is a [`FreedError`].

use std::net::SocketAddr;

use thiserror::Error;

/// Validation failure for a single datagram
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Datagram shorter than a D1 frame
    #[error("packet too small: {len} bytes (expected {expected})")]
    TooShort { len: usize, expected: usize },

    /// First byte is not the D1 tag
    #[error("invalid message type: 0x{found:02X} (expected 0x{expected:02X})")]
    WrongMessageType { found: u8, expected: u8 },

    /// Checksum mismatch while checksums are configured fatal
    #[error("checksum mismatch: got 0x{actual:02X}, expected 0x{expected:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// Main error type for FreeD Reader
#[derive(Debug, Error)]
pub enum FreedError {
    /// Configuration value out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Calibration table rejected at load time
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// Timecode frame rate unusable
    #[error("Invalid timecode frame rate: {0}")]
    InvalidFps(f64),

    /// Socket could not be created or bound
    #[error("Failed to bind UDP socket to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Socket failed while the receive loop was running
    #[error("Transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// Receive worker terminated abnormally
    #[error("Receive worker failed: {0}")]
    Worker(String),

    /// Lifecycle operation not allowed in the current state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Frame could not be serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FreedError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a calibration error
    pub fn calibration(msg: impl Into<String>) -> Self {
        Self::Calibration(msg.into())
    }

    /// Create a bind error for a socket address
    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.to_string(),
            source,
        }
    }
}

/// Result type alias for FreeD Reader
pub type Result<T> = std::result::Result<T, FreedError>;
