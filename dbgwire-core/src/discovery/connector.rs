//! Opening outbound streams to discovered endpoints.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tracing::debug;

use super::browser::Endpoint;

/// Default time allowed for a connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the stream a writer will own.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncWrite + Unpin + Send + 'static;

    async fn connect(&self, endpoint: &Endpoint) -> io::Result<Self::Stream>;
}

// ── TcpConnector ─────────────────────────────────────────────────

/// Plain TCP with `TCP_NODELAY` and a connect timeout.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, endpoint: &Endpoint) -> io::Result<TcpStream> {
        let target = (endpoint.host(), endpoint.port());
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(target))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.timeout),
                )
            })??;
        stream.set_nodelay(true)?;
        debug!(%endpoint, local = ?stream.local_addr().ok(), "stream opened");
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_to_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let endpoint = Endpoint::new("local", addr.ip().to_string(), addr.port());

        let connector = TcpConnector::default();
        let (stream, accepted) = tokio::join!(connector.connect(&endpoint), listener.accept());
        let stream = stream.unwrap();
        let (_peer, peer_addr) = accepted.unwrap();
        assert_eq!(stream.local_addr().unwrap(), peer_addr);
        assert!(stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Endpoint::new("gone", addr.ip().to_string(), addr.port());
        assert!(TcpConnector::default().connect(&endpoint).await.is_err());
    }
}
