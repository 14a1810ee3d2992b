//! Public entry point: ship debug events to the current listener.
//!
//! ```no_run
//! # use dbgwire_core::{Debugger, DebuggerConfig};
//! # async fn example() -> Result<(), dbgwire_core::DebugError> {
//! let debugger = Debugger::start(&DebuggerConfig::default())?;
//!
//! let screenshot: Vec<u8> = vec![/* encoded image */];
//! debugger.write("increment", &serde_json::json!({ "count": 1 }), &screenshot)?;
//!
//! debugger.stop().await;
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use tracing::debug;

use crate::config::DebuggerConfig;
use crate::discovery::{
    Connector, DiscoveryHandle, DiscoveryService, DiscoveryStats, ServiceBrowser, StaticBrowser,
    TcpConnector,
};
use crate::error::DebugError;
use crate::event::{DebugEvent, EventFormat, SnapshotProvider};
use crate::frame;
use crate::slot::WriterSlot;

/// Builds debug events and forwards them to the current writer.
#[derive(Debug)]
pub struct Debugger {
    slot: WriterSlot,
    format: EventFormat,
    discovery: Option<DiscoveryHandle>,
}

impl Debugger {
    /// Start discovery as configured, connecting over TCP.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(config: &DebuggerConfig) -> Result<Self, DebugError> {
        let browser = browser_for(config)?;
        let connector = TcpConnector::new(config.discovery.connect_timeout());
        Ok(Self::with_discovery(
            browser,
            connector,
            config.encoding.format,
        ))
    }

    /// Start discovery with a custom browser and connector.
    pub fn with_discovery<B, C>(browser: B, connector: C, format: EventFormat) -> Self
    where
        B: ServiceBrowser + 'static,
        C: Connector,
    {
        let slot = WriterSlot::new();
        let discovery = DiscoveryService::start(browser, connector, slot.clone());
        Self {
            slot,
            format,
            discovery: Some(discovery),
        }
    }

    /// A debugger without discovery; writers are installed through
    /// [`slot`](Self::slot).
    pub fn detached(format: EventFormat) -> Self {
        Self {
            slot: WriterSlot::new(),
            format,
            discovery: None,
        }
    }

    pub fn slot(&self) -> &WriterSlot {
        &self.slot
    }

    pub fn format(&self) -> EventFormat {
        self.format
    }

    /// Whether a writer is currently installed.
    pub fn is_connected(&self) -> bool {
        self.slot.is_occupied()
    }

    pub fn discovery_stats(&self) -> Option<&DiscoveryStats> {
        self.discovery.as_ref().map(DiscoveryHandle::stats)
    }

    /// Frame one debug event and queue it on the current writer.
    ///
    /// Without a current writer this does nothing: no snapshot is taken
    /// and no frame is built. Delivery after queueing is best-effort and
    /// unconfirmed; stream failures never surface here.
    pub fn write<S, P>(&self, action: &str, state: &S, snapshot: &P) -> Result<(), DebugError>
    where
        S: Serialize + ?Sized,
        P: SnapshotProvider + ?Sized,
    {
        let Some(writer) = self.slot.current() else {
            return Ok(());
        };

        let event = DebugEvent::capture(action, state, snapshot)?;
        let payload = self.format.encode(&event)?;
        let frame = frame::encode(&payload)?;
        let len = frame.len();

        if writer.enqueue(frame) {
            debug!(writer = %writer.id(), action, bytes = len, "debug event queued");
        } else {
            debug!(writer = %writer.id(), action, "writer closed; debug event dropped");
        }
        Ok(())
    }

    /// Stop discovery and close the current writer.
    pub async fn stop(mut self) {
        match self.discovery.take() {
            Some(discovery) => discovery.stop().await,
            None => self.slot.close(),
        }
    }
}

/// Dropping the debugger cancels discovery and closes the current
/// writer without waiting for either.
impl Drop for Debugger {
    fn drop(&mut self) {
        self.slot.close();
    }
}

#[cfg(not(feature = "mdns"))]
fn browser_for(config: &DebuggerConfig) -> Result<Box<dyn ServiceBrowser>, DebugError> {
    let discovery = &config.discovery;
    if discovery.mdns {
        tracing::warn!(
            service_type = %discovery.service_type,
            domain = %discovery.domain,
            "mdns discovery requested but the `mdns` feature is disabled; using static endpoints"
        );
    }
    Ok(Box::new(StaticBrowser::new(discovery.static_endpoints()?)))
}

#[cfg(feature = "mdns")]
fn browser_for(config: &DebuggerConfig) -> Result<Box<dyn ServiceBrowser>, DebugError> {
    let discovery = &config.discovery;
    if discovery.mdns {
        let browser =
            crate::discovery::MdnsBrowser::new(&discovery.service_type, &discovery.domain)?;
        return Ok(Box::new(browser));
    }
    Ok(Box::new(StaticBrowser::new(discovery.static_endpoints()?)))
}

// ── Tests ────────────────────────────────────────────────────────
