//! Debug event payloads and the collaborators that produce them.
//!
//! A [`DebugEvent`] is built once per debugger write from an action
//! label, the serialized application state and a snapshot image, then
//! serialized with the configured [`EventFormat`] into a frame payload.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DebugError;

/// Error type returned by snapshot providers.
pub type SnapshotError = Box<dyn std::error::Error + Send + Sync>;

// ── DebugEvent ───────────────────────────────────────────────────

/// One debug event as carried in a frame payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugEvent {
    /// Label of the action that produced this state.
    pub action: String,
    /// Opaque serialized application state.
    pub state: Vec<u8>,
    /// Opaque encoded snapshot image.
    #[serde(rename = "imageData")]
    pub image_data: Vec<u8>,
}

impl DebugEvent {
    pub fn new(action: impl Into<String>, state: Vec<u8>, image_data: Vec<u8>) -> Self {
        Self {
            action: action.into(),
            state,
            image_data,
        }
    }

    /// Capture a snapshot and serialize `state` into a new event.
    ///
    /// State is serialized as JSON. Any failure is reported as
    /// [`DebugError::Encoding`].
    pub fn capture<S, P>(action: &str, state: &S, snapshot: &P) -> Result<Self, DebugError>
    where
        S: Serialize + ?Sized,
        P: SnapshotProvider + ?Sized,
    {
        let image_data = snapshot
            .capture()
            .map_err(|e| DebugError::Encoding(format!("snapshot capture failed: {e}")))?;
        let state = serde_json::to_vec(state)
            .map_err(|e| DebugError::Encoding(format!("state serialization failed: {e}")))?;
        Ok(Self::new(action, state, image_data))
    }
}

// ── EventFormat ──────────────────────────────────────────────────

/// Serialization used for frame payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventFormat {
    /// Compact binary encoding.
    #[default]
    Bincode,
    /// JSON object with `action`, `state` and `imageData` fields.
    Json,
}

impl EventFormat {
    pub fn encode(&self, event: &DebugEvent) -> Result<Vec<u8>, DebugError> {
        match self {
            EventFormat::Bincode => Ok(bincode::serialize(event)?),
            EventFormat::Json => Ok(serde_json::to_vec(event)?),
        }
    }

    pub fn decode(&self, payload: &[u8]) -> Result<DebugEvent, DebugError> {
        match self {
            EventFormat::Bincode => Ok(bincode::deserialize(payload)?),
            EventFormat::Json => Ok(serde_json::from_slice(payload)?),
        }
    }
}

impl fmt::Display for EventFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFormat::Bincode => write!(f, "bincode"),
            EventFormat::Json => write!(f, "json"),
        }
    }
}

// ── SnapshotProvider ─────────────────────────────────────────────

/// Produces the encoded snapshot image attached to each event.
///
/// Rendering a view into an image is the host's business; the debugger
/// only asks for the resulting bytes.
pub trait SnapshotProvider {
    fn capture(&self) -> Result<Vec<u8>, SnapshotError>;
}

impl<F> SnapshotProvider for F
where
    F: Fn() -> Result<Vec<u8>, SnapshotError>,
{
    fn capture(&self) -> Result<Vec<u8>, SnapshotError> {
        self()
    }
}

/// A pre-rendered image.
impl SnapshotProvider for [u8] {
    fn capture(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(self.to_vec())
    }
}

impl SnapshotProvider for Vec<u8> {
    fn capture(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(self.clone())
    }
}

// ── Tests ────────────────────────────────────────────────────────
