//! Buffered stream writer.
//!
//! Each writer owns one output stream and runs as its own Tokio task,
//! which is the only place its buffer and stream are touched. Producers
//! talk to it through a cloneable [`WriterHandle`]:
//!
//! ```text
//! Producer 1 ─┐
//! Producer 2 ─┼─► UnboundedSender<Command> ─► writer task ─► stream
//! Producer N ─┘         (arrival order)        (≤ 1024 B per write)
//! ```
//!
//! The task drains whenever a command arrives or the stream signals
//! write readiness. A stream that accepts zero bytes is end-of-stream;
//! a stream error is fatal. Either one, or an explicit
//! [`close`](WriterHandle::close), moves the writer to
//! [`WriterState::Closed`] and fires the terminal callback exactly once.
//! Bytes still buffered at that point are dropped.

pub mod state;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::VecDeque;
use std::fmt;
use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

pub use state::{CloseReason, StreamEvent, WriterState};

// ── Constants ────────────────────────────────────────────────────

/// Upper bound on the bytes handed to the stream in one write.
pub const CHUNK_SIZE: usize = 1024;

/// How long a terminal shutdown may wait on the stream.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

static NEXT_WRITER_ID: AtomicU64 = AtomicU64::new(1);

type TerminalCallback = Box<dyn FnOnce(CloseReason) + Send + 'static>;

// ── WriterId ─────────────────────────────────────────────────────

/// Process-unique identity of a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WriterId(u64);

impl WriterId {
    fn next() -> Self {
        Self(NEXT_WRITER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "writer-{}", self.0)
    }
}

// ── WriterStats ──────────────────────────────────────────────────

/// Counters updated by the writer task.
#[derive(Debug, Default)]
pub struct WriterStats {
    accepted: AtomicU64,
    delivered: AtomicU64,
    discarded: AtomicU64,
    buffered: AtomicUsize,
    writes: AtomicU64,
}

impl WriterStats {
    /// Bytes appended to the outbound buffer.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Acquire)
    }

    /// Bytes the stream reported as written.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    /// Bytes dropped when the writer closed.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Acquire)
    }

    /// Bytes currently waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    /// Completed write calls, including a final zero-byte or failed one.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }
}

// ── Command ──────────────────────────────────────────────────────

enum Command {
    Enqueue(Bytes),
    Flush(oneshot::Sender<()>),
    Close,
}

// ── WriterBuilder ────────────────────────────────────────────────

/// Configures and spawns a writer over one stream.
pub struct WriterBuilder<S> {
    id: WriterId,
    stream: S,
    on_terminal: Option<TerminalCallback>,
    events: Option<mpsc::UnboundedSender<StreamEvent>>,
}

impl<S> WriterBuilder<S>
where
    S: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        Self {
            id: WriterId::next(),
            stream,
            on_terminal: None,
            events: None,
        }
    }

    /// The id the spawned writer will carry.
    pub fn id(&self) -> WriterId {
        self.id
    }

    /// Register the callback invoked once when the writer closes.
    pub fn on_terminal<F>(mut self, f: F) -> Self
    where
        F: FnOnce(CloseReason) + Send + 'static,
    {
        self.on_terminal = Some(Box::new(f));
        self
    }

    /// Forward stream notifications to `tx`.
    pub fn stream_events(mut self, tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Spawn the writer task on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn(self) -> WriterHandle {
        let id = self.id;
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(WriterState::Open);
        let stats = Arc::new(WriterStats::default());

        let driver = Driver {
            id,
            stream: self.stream,
            rx,
            buffer: BytesMut::new(),
            state_tx,
            stats: Arc::clone(&stats),
            events: self.events,
            flush_waiters: VecDeque::new(),
            accepted_total: 0,
            delivered_total: 0,
            stalled: false,
        };
        tokio::spawn(driver.run(self.on_terminal));

        WriterHandle {
            id,
            tx,
            state: state_rx,
            stats,
        }
    }
}

/// Spawn a writer over `stream` that reports its terminal outcome to
/// `on_terminal`.
pub fn spawn_writer<S, F>(stream: S, on_terminal: F) -> WriterHandle
where
    S: AsyncWrite + Unpin + Send + 'static,
    F: FnOnce(CloseReason) + Send + 'static,
{
    WriterBuilder::new(stream).on_terminal(on_terminal).spawn()
}

// ── WriterHandle ─────────────────────────────────────────────────

/// Cheaply cloneable handle to a running writer.
///
/// Dropping every handle closes the writer with
/// [`CloseReason::Shutdown`].
#[derive(Clone)]
pub struct WriterHandle {
    id: WriterId,
    tx: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<WriterState>,
    stats: Arc<WriterStats>,
}

impl WriterHandle {
    pub fn id(&self) -> WriterId {
        self.id
    }

    /// Append `bytes` to the outbound buffer.
    ///
    /// Never blocks. Returns `false`, without side effects, once the
    /// writer has closed.
    pub fn enqueue(&self, bytes: impl Into<Bytes>) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send(Command::Enqueue(bytes.into())).is_ok()
    }

    /// Wait until every byte enqueued before this call has been written
    /// to the stream.
    ///
    /// Returns `false` if the writer closed first.
    pub async fn flush(&self) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(ack_tx)).is_err() {
            return false;
        }
        ack_rx.await.is_ok()
    }

    /// Ask the writer to drop its buffer and shut the stream down.
    pub fn close(&self) {
        let _ = self.tx.send(Command::Close);
    }

    pub fn state(&self) -> WriterState {
        self.state.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().is_closed()
    }

    /// Wait for the terminal state.
    pub async fn closed(&self) -> CloseReason {
        let mut rx = self.state.clone();
        let reason = match rx.wait_for(WriterState::is_closed).await {
            Ok(state) => state.close_reason().cloned(),
            Err(_) => None,
        };
        reason
            .or_else(|| self.state.borrow().close_reason().cloned())
            .unwrap_or(CloseReason::Shutdown)
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }
}

impl fmt::Debug for WriterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterHandle")
            .field("id", &self.id)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

// ── Driver ───────────────────────────────────────────────────────

/// Task-side state of one writer.
struct Driver<S> {
    id: WriterId,
    stream: S,
    rx: mpsc::UnboundedReceiver<Command>,
    buffer: BytesMut,
    state_tx: watch::Sender<WriterState>,
    stats: Arc<WriterStats>,
    events: Option<mpsc::UnboundedSender<StreamEvent>>,
    /// Pending flushes, keyed by the accepted-byte offset they wait for.
    flush_waiters: VecDeque<(u64, oneshot::Sender<()>)>,
    accepted_total: u64,
    delivered_total: u64,
    /// The last write attempt found no space.
    stalled: bool,
}

impl<S> Driver<S>
where
    S: AsyncWrite + Unpin,
{
    async fn run(mut self, on_terminal: Option<TerminalCallback>) {
        debug!(writer = %self.id, "writer started");
        self.emit(StreamEvent::Ready);

        let reason = poll_fn(|cx| self.poll_drive(cx)).await;
        self.finish(reason, on_terminal).await;
    }

    /// Take in queued commands, then write chunks until the buffer is
    /// empty or the stream has no space.
    fn poll_drive(&mut self, cx: &mut Context<'_>) -> Poll<CloseReason> {
        loop {
            while let Poll::Ready(cmd) = self.rx.poll_recv(cx) {
                match cmd {
                    Some(Command::Enqueue(bytes)) => self.append(&bytes),
                    Some(Command::Flush(ack)) => self.register_flush(ack),
                    Some(Command::Close) | None => return Poll::Ready(CloseReason::Shutdown),
                }
            }

            if self.buffer.is_empty() {
                self.set_state(WriterState::Open);
                return Poll::Pending;
            }
            self.set_state(WriterState::Draining);

            let len = self.buffer.len().min(CHUNK_SIZE);
            match Pin::new(&mut self.stream).poll_write(cx, &self.buffer[..len]) {
                Poll::Pending => {
                    self.stalled = true;
                    return Poll::Pending;
                }
                Poll::Ready(Ok(0)) => {
                    self.stats.writes.fetch_add(1, Ordering::AcqRel);
                    return Poll::Ready(CloseReason::Eof);
                }
                Poll::Ready(Ok(written)) => self.consume(written.min(len)),
                Poll::Ready(Err(e)) => {
                    self.stats.writes.fetch_add(1, Ordering::AcqRel);
                    return Poll::Ready(CloseReason::Error(Arc::new(e)));
                }
            }
        }
    }

    fn append(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(bytes);
        self.accepted_total += bytes.len() as u64;
        self.stats
            .accepted
            .fetch_add(bytes.len() as u64, Ordering::AcqRel);
        self.stats.buffered.store(self.buffer.len(), Ordering::Release);
    }

    fn consume(&mut self, written: usize) {
        self.buffer.advance(written);
        self.delivered_total += written as u64;
        self.stats
            .delivered
            .fetch_add(written as u64, Ordering::AcqRel);
        self.stats.writes.fetch_add(1, Ordering::AcqRel);
        self.stats.buffered.store(self.buffer.len(), Ordering::Release);

        if self.stalled {
            self.stalled = false;
            self.emit(StreamEvent::SpaceAvailable);
        }

        while let Some((target, _)) = self.flush_waiters.front() {
            if *target > self.delivered_total {
                break;
            }
            if let Some((_, ack)) = self.flush_waiters.pop_front() {
                let _ = ack.send(());
            }
        }
    }

    fn register_flush(&mut self, ack: oneshot::Sender<()>) {
        if self.delivered_total >= self.accepted_total {
            let _ = ack.send(());
        } else {
            self.flush_waiters.push_back((self.accepted_total, ack));
        }
    }

    fn set_state(&self, next: WriterState) {
        self.state_tx.send_if_modified(|current| {
            if current.same_phase(&next) {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn emit(&self, event: StreamEvent) {
        debug!(writer = %self.id, %event, "stream event");
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Terminal transition: runs exactly once per writer.
    async fn finish(mut self, reason: CloseReason, on_terminal: Option<TerminalCallback>) {
        self.rx.close();
        self.flush_waiters.clear();

        let discarded = self.buffer.len();
        self.buffer.clear();
        self.stats.buffered.store(0, Ordering::Release);
        self.stats
            .discarded
            .fetch_add(discarded as u64, Ordering::AcqRel);

        match &reason {
            CloseReason::Eof => self.emit(StreamEvent::Closed),
            CloseReason::Error(e) => self.emit(StreamEvent::Error(Arc::clone(e))),
            CloseReason::Shutdown => {}
        }

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.stream.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(writer = %self.id, "stream shutdown failed: {e}"),
            Err(_) => debug!(writer = %self.id, "stream shutdown timed out"),
        }

        self.state_tx
            .send_replace(WriterState::Closed(reason.clone()));

        match &reason {
            CloseReason::Error(e) => {
                warn!(writer = %self.id, discarded, "writer closed on stream error: {e}")
            }
            CloseReason::Eof => info!(writer = %self.id, discarded, "writer reached end of stream"),
            CloseReason::Shutdown => debug!(writer = %self.id, discarded, "writer shut down"),
        }

        if let Some(callback) = on_terminal {
            callback(reason);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::testing::{ScriptedStream, Step, TerminalLog};
    use super::*;

    fn spawn_logged(stream: &ScriptedStream) -> (WriterHandle, TerminalLog) {
        let log = TerminalLog::default();
        let handle = spawn_writer(stream.clone(), log.callback());
        (handle, log)
    }

    #[tokio::test]
    async fn single_small_write() {
        let stream = ScriptedStream::new();
        let (writer, log) = spawn_logged(&stream);

        assert!(writer.enqueue(&b"hello"[..]));
        assert!(writer.flush().await);

        assert_eq!(stream.attempts(), vec![5]);
        assert_eq!(stream.data(), b"hello");
        assert_eq!(writer.stats().buffered(), 0);
        assert!(matches!(writer.state(), WriterState::Open));
        assert_eq!(log.count(), 0);
    }

    #[tokio::test]
    async fn order_preserved_with_partial_writes() {
        let stream = ScriptedStream::new();
        stream.push(Step::Accept(300));
        stream.push(Step::Accept(1));
        stream.push(Step::Accept(700));
        let (writer, _log) = spawn_logged(&stream);

        let mut expected = Vec::new();
        for i in 0..20u8 {
            let chunk = vec![i; 173 + i as usize * 41];
            expected.extend_from_slice(&chunk);
            assert!(writer.enqueue(chunk));
        }
        assert!(writer.flush().await);

        assert_eq!(stream.data(), expected);
        assert!(stream.attempts().iter().all(|&n| n <= CHUNK_SIZE));
        assert_eq!(writer.stats().delivered(), expected.len() as u64);
    }

    #[tokio::test]
    async fn large_enqueue_split_into_chunks() {
        let stream = ScriptedStream::new();
        let (writer, _log) = spawn_logged(&stream);

        writer.enqueue(vec![0xAB; 4000]);
        assert!(writer.flush().await);

        assert_eq!(stream.attempts(), vec![1024, 1024, 1024, 928]);
    }

    #[tokio::test]
    async fn zero_write_is_eof() {
        let stream = ScriptedStream::new();
        stream.push(Step::Zero);
        let (writer, log) = spawn_logged(&stream);

        writer.enqueue(&b"hello"[..]);
        let reason = writer.closed().await;

        assert!(matches!(reason, CloseReason::Eof));
        assert_eq!(log.count(), 1);
        assert!(matches!(log.reasons()[0], CloseReason::Eof));
        assert_eq!(stream.attempts(), vec![5]);
        assert_eq!(stream.shutdowns(), 1);
        assert_eq!(writer.stats().discarded(), 5);

        assert!(!writer.enqueue(&b"more"[..]));
        assert!(!writer.flush().await);
        tokio::task::yield_now().await;
        assert_eq!(stream.attempts(), vec![5]);
        assert_eq!(writer.stats().buffered(), 0);
        assert_eq!(log.count(), 1);
    }

    #[tokio::test]
    async fn stream_error_is_terminal() {
        let stream = ScriptedStream::new();
        stream.push(Step::Accept(2));
        stream.push(Step::Fail(std::io::ErrorKind::BrokenPipe));
        let (writer, log) = spawn_logged(&stream);

        writer.enqueue(&b"abcdef"[..]);
        let reason = writer.closed().await;

        assert_eq!(reason.error_kind(), Some(std::io::ErrorKind::BrokenPipe));
        assert_eq!(stream.data(), b"ab");
        assert_eq!(log.count(), 1);
        assert!(!writer.enqueue(&b"x"[..]));
    }

    #[tokio::test]
    async fn resumes_when_space_available() {
        let stream = ScriptedStream::new();
        stream.push(Step::Block);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let writer = WriterBuilder::new(stream.clone())
            .stream_events(events_tx)
            .spawn();

        writer.enqueue(&b"first "[..]);
        stream.wait_blocked().await;
        assert!(matches!(writer.state(), WriterState::Draining));
        assert!(stream.data().is_empty());

        writer.enqueue(&b"second"[..]);
        stream.unblock();
        assert!(writer.flush().await);
        assert_eq!(stream.data(), b"first second");

        assert!(matches!(events_rx.recv().await, Some(StreamEvent::Ready)));
        assert!(matches!(
            events_rx.recv().await,
            Some(StreamEvent::SpaceAvailable)
        ));
    }

    #[tokio::test]
    async fn close_discards_buffer_and_fires_once() {
        let stream = ScriptedStream::new();
        stream.push(Step::Block);
        let (writer, log) = spawn_logged(&stream);

        writer.enqueue(&b"never delivered"[..]);
        stream.wait_blocked().await;
        writer.close();
        writer.close();

        assert!(matches!(writer.closed().await, CloseReason::Shutdown));
        assert_eq!(log.count(), 1);
        assert_eq!(stream.shutdowns(), 1);
        assert!(stream.data().is_empty());
        assert_eq!(writer.stats().discarded(), 15);
    }

    #[tokio::test]
    async fn dropping_handles_shuts_down() {
        let stream = ScriptedStream::new();
        let log = TerminalLog::default();
        let writer = spawn_writer(stream.clone(), log.callback());
        let mut state = writer.state.clone();
        drop(writer);

        let closed = state.wait_for(WriterState::is_closed).await.map(|s| (*s).clone());
        assert!(matches!(
            closed,
            Ok(WriterState::Closed(CloseReason::Shutdown))
        ));
        assert_eq!(log.count(), 1);
    }

    #[tokio::test]
    async fn concurrent_producers_keep_their_own_order() {
        let stream = ScriptedStream::new();
        stream.push(Step::Accept(64));
        let (writer, _log) = spawn_logged(&stream);

        let mut tasks = Vec::new();
        for producer in 0..4u8 {
            let w = writer.clone();
            tasks.push(tokio::spawn(async move {
                for seq in 0..50u8 {
                    w.enqueue(vec![producer, seq]);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert!(writer.flush().await);

        let data = stream.data();
        assert_eq!(data.len(), 4 * 50 * 2);
        let mut next = [0u8; 4];
        for pair in data.chunks(2) {
            let producer = pair[0] as usize;
            assert_eq!(pair[1], next[producer]);
            next[producer] += 1;
        }
    }

    #[tokio::test]
    async fn writer_ids_are_unique() {
        let a = spawn_writer(ScriptedStream::new(), |_| {});
        let b = spawn_writer(ScriptedStream::new(), |_| {});
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn frames_reach_mock_stream_intact() {
        let frame = crate::frame::encode(&[7u8; 1500]).unwrap();
        let mock = tokio_test::io::Builder::new()
            .write(&frame[..CHUNK_SIZE])
            .write(&frame[CHUNK_SIZE..])
            .build();
        let log = TerminalLog::default();
        let writer = spawn_writer(mock, log.callback());

        writer.enqueue(frame.clone());
        assert!(writer.flush().await);
        writer.close();
        assert!(matches!(writer.closed().await, CloseReason::Shutdown));
        assert_eq!(log.count(), 1);
    }

    #[tokio::test]
    async fn mock_write_error_reaches_callback() {
        let mock = tokio_test::io::Builder::new()
            .write(b"ab")
            .write_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let log = TerminalLog::default();
        let writer = spawn_writer(mock, log.callback());

        writer.enqueue(&b"abcd"[..]);
        let reason = writer.closed().await;
        assert_eq!(reason.error_kind(), Some(std::io::ErrorKind::ConnectionReset));
        assert_eq!(writer.stats().delivered(), 2);
    }
}
