//! Sources of debug listener endpoints.

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::DebugError;

/// Service type debug listeners advertise.
pub const DEFAULT_SERVICE_TYPE: &str = "_debug._tcp";

/// Browse scope.
pub const DEFAULT_DOMAIN: &str = "local";

/// Fully qualified browse name, e.g. `_debug._tcp.local.`.
pub fn service_query(service_type: &str, domain: &str) -> String {
    format!(
        "{}.{}.",
        service_type.trim_end_matches('.'),
        domain.trim_matches('.')
    )
}

// ── Endpoint ─────────────────────────────────────────────────────

/// A discovered listener instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    name: String,
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port` or `[v6addr]:port`. The name is the input text.
    pub fn parse(text: &str) -> Result<Self, DebugError> {
        let (host, port) = text
            .rsplit_once(':')
            .ok_or_else(|| DebugError::Config(format!("endpoint {text:?} has no port")))?;
        let port: u16 = port
            .parse()
            .map_err(|_| DebugError::Config(format!("endpoint {text:?} has an invalid port")))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(DebugError::Config(format!("endpoint {text:?} has no host")));
        }
        Ok(Self::new(text, host, port))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{} ([{}]:{})", self.name, self.host, self.port)
        } else {
            write!(f, "{} ({}:{})", self.name, self.host, self.port)
        }
    }
}

// ── ServiceBrowser ───────────────────────────────────────────────

/// Yields listener instances as they are discovered.
#[async_trait]
pub trait ServiceBrowser: Send {
    /// The next discovered instance, or `None` once browsing has ended.
    async fn next_endpoint(&mut self) -> Option<Endpoint>;
}

#[async_trait]
impl ServiceBrowser for Box<dyn ServiceBrowser> {
    async fn next_endpoint(&mut self) -> Option<Endpoint> {
        (**self).next_endpoint().await
    }
}

// ── StaticBrowser ────────────────────────────────────────────────

/// Reports a fixed list of endpoints once each, in order.
#[derive(Debug, Default)]
pub struct StaticBrowser {
    endpoints: VecDeque<Endpoint>,
}

impl StaticBrowser {
    pub fn new(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        Self {
            endpoints: endpoints.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ServiceBrowser for StaticBrowser {
    async fn next_endpoint(&mut self) -> Option<Endpoint> {
        self.endpoints.pop_front()
    }
}

// ── ChannelBrowser ───────────────────────────────────────────────

/// Endpoints pushed by the host, e.g. from its own service browser.
#[derive(Debug)]
pub struct ChannelBrowser {
    rx: mpsc::Receiver<Endpoint>,
}

impl ChannelBrowser {
    /// Browsing ends when every sender is dropped.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Endpoint>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl ServiceBrowser for ChannelBrowser {
    async fn next_endpoint(&mut self) -> Option<Endpoint> {
        self.rx.recv().await
    }
}

// ── Tests ────────────────────────────────────────────────────────
