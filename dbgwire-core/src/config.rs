//! Debugger configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::{DEFAULT_DOMAIN, DEFAULT_SERVICE_TYPE, Endpoint};
use crate::error::DebugError;
use crate::event::EventFormat;

/// Top-level configuration for the debugger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Listener discovery.
    pub discovery: DiscoveryConfig,
    /// Event payload encoding.
    pub encoding: EncodingConfig,
}

/// Discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Advertised service type to browse for. Only read by the mDNS
    /// browser; without the `mdns` feature, `endpoints` is used instead.
    pub service_type: String,
    /// Browse scope. Only read by the mDNS browser.
    pub domain: String,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Fixed `host:port` listeners, tried in order.
    pub endpoints: Vec<String>,
    /// Browse over multicast DNS (requires the `mdns` feature).
    pub mdns: bool,
}

/// Event encoding settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// `bincode` or `json`.
    pub format: EventFormat,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_type: DEFAULT_SERVICE_TYPE.into(),
            domain: DEFAULT_DOMAIN.into(),
            connect_timeout_ms: 5000,
            endpoints: Vec::new(),
            mdns: cfg!(feature = "mdns"),
        }
    }
}

impl DiscoveryConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Parse the configured static endpoints.
    pub fn static_endpoints(&self) -> Result<Vec<Endpoint>, DebugError> {
        self.endpoints.iter().map(|e| Endpoint::parse(e)).collect()
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl DebuggerConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, DebugError> {
        Ok(toml::from_str(text)?)
    }
}

// ── Tests ────────────────────────────────────────────────────────
