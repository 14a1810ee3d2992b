//! Debug listener service core logic.
//!
//! Accepts debugger streams, splits them into frames and decodes each
//! payload into a [`DebugEvent`]. One task per peer; a peer whose
//! stream turns out to be malformed is dropped without affecting the
//! others.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dbgwire_core::{DebugError, DebugEvent, EventFormat, FrameCodec};
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ListenerConfig;

/// A decoded event together with where it came from.
#[derive(Debug, Clone)]
pub struct ReceivedEvent {
    pub peer: SocketAddr,
    /// Listener-wide arrival number, starting at 1.
    pub seq: u64,
    pub event: DebugEvent,
}

// ── ListenerService ──────────────────────────────────────────────

/// The top-level listener service.
pub struct ListenerService {
    listener: TcpListener,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    sink: Option<mpsc::UnboundedSender<ReceivedEvent>>,
}

/// Settings and counters shared with peer tasks.
struct Shared {
    max_payload: usize,
    format: EventFormat,
    snapshot_dir: Option<PathBuf>,
    seq: AtomicU64,
}

impl ListenerService {
    /// Bind the configured address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, DebugError> {
        Self::bind_addr(&config.network.bind, config).await
    }

    /// Bind `addr`, taking everything else from `config`.
    pub async fn bind_addr(addr: &str, config: &ListenerConfig) -> Result<Self, DebugError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                max_payload: config.max_payload(),
                format: config.events.format,
                snapshot_dir: config.snapshot_dir(),
                seq: AtomicU64::new(0),
            }),
            cancel: CancellationToken::new(),
            sink: None,
        })
    }

    /// Also deliver every decoded event on `tx`.
    pub fn with_sink(mut self, tx: mpsc::UnboundedSender<ReceivedEvent>) -> Self {
        self.sink = Some(tx);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DebugError> {
        Ok(self.listener.local_addr()?)
    }

    /// Token that stops the accept loop and every peer task.
    pub fn stop_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Accept peers until stopped, then wait for their tasks.
    pub async fn run(self) -> Result<(), DebugError> {
        if let Some(dir) = &self.shared.snapshot_dir {
            tokio::fs::create_dir_all(dir).await?;
            info!("writing snapshots to {}", dir.display());
        }
        info!(
            "debug listener on {} ({} payloads)",
            self.local_addr()?,
            self.shared.format
        );

        let mut peers = JoinSet::new();
        loop {
            let accept = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.listener.accept() => result,
                Some(_) = peers.join_next(), if !peers.is_empty() => continue,
            };

            let (stream, peer) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!(%peer, "set_nodelay failed: {e}");
            }

            info!(%peer, "debugger connected");
            peers.spawn(serve_peer(
                stream,
                peer,
                Arc::clone(&self.shared),
                self.sink.clone(),
                self.cancel.child_token(),
            ));
        }

        while peers.join_next().await.is_some() {}
        info!("debug listener stopped");
        Ok(())
    }
}

// ── Per-peer ─────────────────────────────────────────────────────

async fn serve_peer(
    stream: TcpStream,
    peer: SocketAddr,
    shared: Arc<Shared>,
    sink: Option<mpsc::UnboundedSender<ReceivedEvent>>,
    cancel: CancellationToken,
) {
    let mut frames = FramedRead::new(stream, FrameCodec::with_max_payload(shared.max_payload));

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = frames.next() => next,
        };
        let payload = match next {
            Some(Ok(payload)) => payload,
            Some(Err(e)) => {
                warn!(%peer, "dropping stream: {e}");
                break;
            }
            None => break,
        };

        let event = match shared.format.decode(&payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(%peer, bytes = payload.len(), "undecodable event: {e}");
                continue;
            }
        };
        let seq = shared.seq.fetch_add(1, Ordering::AcqRel) + 1;
        info!(
            %peer,
            seq,
            action = %event.action,
            state_bytes = event.state.len(),
            image_bytes = event.image_data.len(),
            "debug event"
        );

        if let Some(dir) = &shared.snapshot_dir {
            let path = snapshot_path(dir, seq, &event.action);
            if let Err(e) = tokio::fs::write(&path, &event.image_data).await {
                warn!("could not write {}: {e}", path.display());
            }
        }

        if let Some(tx) = &sink {
            let _ = tx.send(ReceivedEvent { peer, seq, event });
        }
    }

    info!(%peer, "debugger disconnected");
}

/// `<dir>/<seq>-<action>.img`, with the action reduced to safe file-name
/// characters.
pub fn snapshot_path(dir: &Path, seq: u64, action: &str) -> PathBuf {
    let mut name: String = action
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if name.is_empty() {
        name.push_str("event");
    }
    dir.join(format!("{seq:06}-{name}.img"))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use futures::SinkExt;
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::FramedWrite;

    use super::*;

    async fn start(config: ListenerConfig) -> (
        SocketAddr,
        CancellationToken,
        mpsc::UnboundedReceiver<ReceivedEvent>,
        tokio::task::JoinHandle<Result<(), DebugError>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = ListenerService::bind_addr("127.0.0.1:0", &config)
            .await
            .unwrap()
            .with_sink(tx);
        let addr = service.local_addr().unwrap();
        let stop = service.stop_handle();
        let task = tokio::spawn(service.run());
        (addr, stop, rx, task)
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<ReceivedEvent>) -> ReceivedEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout")
            .expect("sink closed")
    }

    fn payload(format: EventFormat, action: &str) -> Bytes {
        let event = DebugEvent::new(action, b"{}".to_vec(), vec![1, 2, 3]);
        Bytes::from(format.encode(&event).unwrap())
    }

    #[test]
    fn snapshot_path_sanitizes_action() {
        let path = snapshot_path(Path::new("/tmp/snaps"), 7, "user/login tap");
        assert_eq!(path, Path::new("/tmp/snaps/000007-user_login_tap.img"));
        let empty = snapshot_path(Path::new("d"), 1, "");
        assert_eq!(empty, Path::new("d/000001-event.img"));
    }

    #[tokio::test]
    async fn decodes_frames_in_order() {
        let (addr, stop, mut rx, task) = start(ListenerConfig::default()).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut framed = FramedWrite::new(stream, FrameCodec::new());
        for action in ["first", "second", "third"] {
            framed
                .send(payload(EventFormat::Bincode, action))
                .await
                .unwrap();
        }

        for (i, action) in ["first", "second", "third"].into_iter().enumerate() {
            let got = recv(&mut rx).await;
            assert_eq!(got.event.action, action);
            assert_eq!(got.seq, i as u64 + 1);
            assert_eq!(got.event.image_data, vec![1, 2, 3]);
        }

        stop.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bad_marker_drops_only_that_peer() {
        let (addr, stop, mut rx, task) = start(ListenerConfig::default()).await;

        let mut bad = TcpStream::connect(addr).await.unwrap();
        bad.write_all(&[0x00, 1, 0, 0, 0, 9]).await.unwrap();

        let good = TcpStream::connect(addr).await.unwrap();
        let mut framed = FramedWrite::new(good, FrameCodec::new());
        framed
            .send(payload(EventFormat::Bincode, "still-here"))
            .await
            .unwrap();

        assert_eq!(recv(&mut rx).await.event.action, "still-here");
        stop.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn writes_snapshots_when_configured() {
        let dir = std::env::temp_dir().join(format!("dbgwire-snaps-{}", std::process::id()));
        let mut config = ListenerConfig::default();
        config.events.snapshot_dir = dir.display().to_string();
        config.events.format = EventFormat::Json;
        let (addr, stop, mut rx, task) = start(config).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut framed = FramedWrite::new(stream, FrameCodec::new());
        framed.send(payload(EventFormat::Json, "save")).await.unwrap();

        let got = recv(&mut rx).await;
        let written = std::fs::read(snapshot_path(&dir, got.seq, "save")).unwrap();
        assert_eq!(written, vec![1, 2, 3]);

        stop.cancel();
        task.await.unwrap().unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }
}
