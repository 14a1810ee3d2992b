//! Configuration for the debug listener.

use std::path::{Path, PathBuf};

use dbgwire_core::{EventFormat, MAX_PAYLOAD_SIZE};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// How incoming events are decoded.
    pub events: EventsConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to accept debugger streams on.
    pub bind: String,
    /// Largest accepted frame payload in bytes.
    pub max_payload: usize,
}

/// Event handling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Payload format the debuggers use: "bincode" or "json".
    pub format: EventFormat,
    /// Directory for snapshot images. Empty disables writing.
    pub snapshot_dir: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:7400".into(),
            max_payload: 64 * 1024 * 1024,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            format: EventFormat::default(),
            snapshot_dir: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ListenerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Payload limit, capped at what a frame header can express.
    pub fn max_payload(&self) -> usize {
        self.network.max_payload.min(MAX_PAYLOAD_SIZE)
    }

    pub fn snapshot_dir(&self) -> Option<PathBuf> {
        let dir = self.events.snapshot_dir.trim();
        (!dir.is_empty()).then(|| PathBuf::from(dir))
    }
}

// ── Tests ────────────────────────────────────────────────────────
