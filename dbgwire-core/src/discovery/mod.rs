//! Discovery-to-connection lifecycle.
//!
//! A background task pulls endpoints from a [`ServiceBrowser`], opens a
//! stream to each with a [`Connector`], and installs a fresh writer in
//! the shared [`WriterSlot`]:
//!
//! ```text
//! browser ──► Endpoint ──► connector ──► stream ──► writer ──► slot
//!                              │                       │
//!                        (failure: skip)     (terminal: clear slot
//!                                             if still current)
//! ```
//!
//! The task runs until [`DiscoveryHandle::stop`] is called. A browser
//! that runs dry leaves the task idle; it does not stop the service.

pub mod browser;
pub mod connector;
#[cfg(feature = "mdns")]
pub mod mdns;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::slot::WriterSlot;
use crate::writer::WriterBuilder;

pub use browser::{
    ChannelBrowser, DEFAULT_DOMAIN, DEFAULT_SERVICE_TYPE, Endpoint, ServiceBrowser, StaticBrowser,
    service_query,
};
pub use connector::{Connector, DEFAULT_CONNECT_TIMEOUT, TcpConnector};
#[cfg(feature = "mdns")]
pub use mdns::MdnsBrowser;

// ── DiscoveryStats ───────────────────────────────────────────────

/// Counters updated by the discovery task.
#[derive(Debug, Default)]
pub struct DiscoveryStats {
    discovered: AtomicU64,
    connect_failures: AtomicU64,
    installed: AtomicU64,
}

impl DiscoveryStats {
    /// Instances reported by the browser.
    pub fn discovered(&self) -> u64 {
        self.discovered.load(Ordering::Acquire)
    }

    /// Instances whose stream could not be opened.
    pub fn connect_failures(&self) -> u64 {
        self.connect_failures.load(Ordering::Acquire)
    }

    /// Writers installed as current.
    pub fn installed(&self) -> u64 {
        self.installed.load(Ordering::Acquire)
    }
}

// ── DiscoveryService ─────────────────────────────────────────────

/// Browse loop state. Owned by its task; see [`DiscoveryService::start`].
pub struct DiscoveryService<B, C> {
    browser: B,
    connector: C,
    slot: WriterSlot,
    stats: Arc<DiscoveryStats>,
    cancel: CancellationToken,
}

impl<B, C> DiscoveryService<B, C>
where
    B: ServiceBrowser + 'static,
    C: Connector,
{
    /// Spawn the browse loop, installing writers into `slot`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(browser: B, connector: C, slot: WriterSlot) -> DiscoveryHandle {
        let cancel = CancellationToken::new();
        let stats = Arc::new(DiscoveryStats::default());
        let service = Self {
            browser,
            connector,
            slot: slot.clone(),
            stats: Arc::clone(&stats),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(service.run());

        DiscoveryHandle {
            cancel,
            task: Some(task),
            slot,
            stats,
        }
    }

    async fn run(mut self) {
        info!("discovery started");
        loop {
            let endpoint = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = self.browser.next_endpoint() => match next {
                    Some(endpoint) => endpoint,
                    None => {
                        debug!("browser exhausted; idling until stopped");
                        self.cancel.cancelled().await;
                        break;
                    }
                },
            };
            self.stats.discovered.fetch_add(1, Ordering::AcqRel);
            info!(%endpoint, "debug listener found");

            let opened = tokio::select! {
                _ = self.cancel.cancelled() => break,
                opened = self.connector.connect(&endpoint) => opened,
            };
            match opened {
                Ok(stream) => self.install(stream, &endpoint),
                Err(e) => {
                    self.stats.connect_failures.fetch_add(1, Ordering::AcqRel);
                    warn!(%endpoint, "could not open stream: {e}");
                }
            }
        }
        info!("discovery stopped");
    }

    fn install(&self, stream: C::Stream, endpoint: &Endpoint) {
        let builder = WriterBuilder::new(stream);
        let id = builder.id();
        let slot = self.slot.downgrade();
        let writer = builder
            .on_terminal(move |reason| {
                if slot.clear_if(id) {
                    info!(writer = %id, %reason, "current writer closed");
                }
            })
            .spawn();

        if let Some(old) = self.slot.replace(writer.clone()) {
            debug!(writer = %old, "writer replaced");
        }
        // A writer that died before it was installed never clears itself.
        if writer.is_closed() {
            self.slot.clear_if(id);
        }
        self.stats.installed.fetch_add(1, Ordering::AcqRel);
        info!(writer = %id, %endpoint, "writer installed");
    }
}

// ── DiscoveryHandle ──────────────────────────────────────────────

/// Controls a running discovery task. Dropping it cancels browsing.
#[derive(Debug)]
pub struct DiscoveryHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    slot: WriterSlot,
    stats: Arc<DiscoveryStats>,
}

impl DiscoveryHandle {
    pub fn stats(&self) -> &DiscoveryStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop browsing, wait for the task, then close the current writer.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("discovery task ended abnormally: {e}");
            }
        }
        self.slot.close();
    }
}

impl Drop for DiscoveryHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Tests ────────────────────────────────────────────────────────
