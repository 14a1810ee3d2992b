//! Writer lifecycle and stream notification types.
//!
//! ```text
//!   Open ◄──────► Draining
//!     │               │
//!     ▼               ▼
//!   Closed(Eof | Error | Shutdown)     (terminal)
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

// ── CloseReason ──────────────────────────────────────────────────

/// Why a writer reached its terminal state.
#[derive(Debug, Clone)]
pub enum CloseReason {
    /// The stream accepted zero bytes for a non-empty write.
    Eof,
    /// The stream reported an I/O error.
    Error(Arc<io::Error>),
    /// The owner closed the writer, or every handle was dropped.
    Shutdown,
}

impl CloseReason {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// The error kind, if the writer failed.
    pub fn error_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Error(e) => Some(e.kind()),
            _ => None,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eof => write!(f, "EOF"),
            Self::Error(e) => write!(f, "error: {e}"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

// ── WriterState ──────────────────────────────────────────────────

/// The current phase of a buffered writer.
#[derive(Debug, Clone, Default)]
pub enum WriterState {
    /// Idle with an empty buffer, ready to drain.
    #[default]
    Open,
    /// Buffered bytes are waiting for the stream.
    Draining,
    /// Terminal. No transition leaves this state.
    Closed(CloseReason),
}

impl WriterState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    pub fn close_reason(&self) -> Option<&CloseReason> {
        match self {
            Self::Closed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Whether `self` and `other` are the same phase, ignoring the
    /// close reason's payload.
    pub(crate) fn same_phase(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Draining => write!(f, "Draining"),
            Self::Closed(reason) => write!(f, "Closed({reason})"),
        }
    }
}

// ── StreamEvent ──────────────────────────────────────────────────

/// Notifications observed on the underlying stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The stream is open and the writer has started.
    Ready,
    /// The stream accepted bytes again after reporting no space.
    SpaceAvailable,
    /// The stream failed.
    Error(Arc<io::Error>),
    /// The stream reached end-of-stream.
    Closed,
}

impl fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "Ready"),
            Self::SpaceAvailable => write!(f, "SpaceAvailable"),
            Self::Error(e) => write!(f, "Error({e})"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
