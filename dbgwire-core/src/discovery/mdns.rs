//! Multicast DNS browsing via `mdns-sd`.
//!
//! The daemon delivers events on its own thread; a forwarding thread
//! turns resolved instances into [`Endpoint`]s on a Tokio channel.

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::browser::{Endpoint, ServiceBrowser, service_query};
use crate::error::DebugError;

/// Browses `<service_type>.<domain>.` for as long as it lives.
pub struct MdnsBrowser {
    daemon: ServiceDaemon,
    query: String,
    rx: mpsc::UnboundedReceiver<Endpoint>,
}

impl MdnsBrowser {
    pub fn new(service_type: &str, domain: &str) -> Result<Self, DebugError> {
        let daemon = ServiceDaemon::new().map_err(|e| DebugError::Discovery(e.to_string()))?;
        let query = service_query(service_type, domain);
        let events = daemon
            .browse(&query)
            .map_err(|e| DebugError::Discovery(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("dbgwire-mdns".into())
            .spawn(move || {
                while let Ok(event) = events.recv() {
                    match event {
                        ServiceEvent::ServiceResolved(info) => {
                            let Some(addr) = info.get_addresses().iter().next() else {
                                continue;
                            };
                            let endpoint =
                                Endpoint::new(info.get_fullname(), addr.to_string(), info.get_port());
                            if tx.send(endpoint).is_err() {
                                break;
                            }
                        }
                        other => trace!(?other, "mdns event"),
                    }
                }
            })
            .map_err(DebugError::Connection)?;

        debug!(%query, "mdns browse started");
        Ok(Self { daemon, query, rx })
    }
}

#[async_trait]
impl ServiceBrowser for MdnsBrowser {
    async fn next_endpoint(&mut self) -> Option<Endpoint> {
        self.rx.recv().await
    }
}

impl Drop for MdnsBrowser {
    fn drop(&mut self) {
        let _ = self.daemon.stop_browse(&self.query);
        let _ = self.daemon.shutdown();
    }
}
