//! Domain-specific error types for the debug transport.
//!
//! Fallible operations return `Result<T, DebugError>`. Stream EOF and
//! stream errors are not surfaced here: they end a single writer and are
//! reported through its terminal outcome
//! ([`CloseReason`](crate::writer::CloseReason)) instead.

use thiserror::Error;

/// The canonical error type for the debug transport.
#[derive(Debug, Error)]
pub enum DebugError {
    // ── Frame Errors ─────────────────────────────────────────────
    /// Fewer bytes are available than the frame header announces.
    #[error("frame truncated: need {needed} bytes, have {available}")]
    FrameTruncated { needed: usize, available: usize },

    /// The first byte of a frame is not the frame marker.
    #[error("invalid frame marker: {0:#04x}")]
    InvalidMarker(u8),

    /// The payload does not fit the length field or a decoder limit.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    // ── Encoding Errors ──────────────────────────────────────────
    /// Snapshot capture, state serialization or event serialization failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    // ── Connection Errors ────────────────────────────────────────
    /// The I/O layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The browse backend could not be started.
    #[error("discovery error: {0}")]
    Discovery(String),

    // ── Configuration Errors ─────────────────────────────────────
    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<Box<bincode::ErrorKind>> for DebugError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        DebugError::Encoding(e.to_string())
    }
}

impl From<serde_json::Error> for DebugError {
    fn from(e: serde_json::Error) -> Self {
        DebugError::Encoding(e.to_string())
    }
}

impl From<toml::de::Error> for DebugError {
    fn from(e: toml::de::Error) -> Self {
        DebugError::Config(e.to_string())
    }
}
