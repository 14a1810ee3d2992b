//! In-memory stream with scripted write outcomes, for writer tests.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use tokio::io::AsyncWrite;

use super::CloseReason;

/// Outcome of one write call.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    /// Accept at most this many bytes.
    Accept(usize),
    /// Report end-of-stream.
    Zero,
    /// Fail with this error kind.
    Fail(io::ErrorKind),
    /// Report no space until [`ScriptedStream::unblock`].
    Block,
}

#[derive(Default)]
struct Script {
    steps: VecDeque<Step>,
    attempts: Vec<usize>,
    data: Vec<u8>,
    shutdowns: usize,
    blocked: bool,
    waker: Option<Waker>,
}

/// Records every write; once the script runs out, accepts everything.
#[derive(Clone, Default)]
pub(crate) struct ScriptedStream {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedStream {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, step: Step) {
        self.lock().steps.push_back(step);
    }

    /// Sizes of the buffers handed to completed write calls.
    pub(crate) fn attempts(&self) -> Vec<usize> {
        self.lock().attempts.clone()
    }

    /// Concatenation of every accepted byte.
    pub(crate) fn data(&self) -> Vec<u8> {
        self.lock().data.clone()
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.lock().shutdowns
    }

    pub(crate) fn unblock(&self) {
        let waker = {
            let mut script = self.lock();
            script.blocked = false;
            script.waker.take()
        };
        if let Some(w) = waker {
            w.wake();
        }
    }

    /// Wait until a write call has hit a [`Step::Block`].
    pub(crate) async fn wait_blocked(&self) {
        for _ in 0..1000 {
            if self.lock().blocked {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("stream never blocked");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.inner.lock().unwrap()
    }
}

impl AsyncWrite for ScriptedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut script = self.lock();
        if script.blocked {
            script.waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        match script.steps.pop_front() {
            Some(Step::Block) => {
                script.blocked = true;
                script.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Some(Step::Zero) => {
                script.attempts.push(buf.len());
                Poll::Ready(Ok(0))
            }
            Some(Step::Fail(kind)) => {
                script.attempts.push(buf.len());
                Poll::Ready(Err(io::Error::from(kind)))
            }
            Some(Step::Accept(max)) => {
                script.attempts.push(buf.len());
                let n = buf.len().min(max);
                script.data.extend_from_slice(&buf[..n]);
                Poll::Ready(Ok(n))
            }
            None => {
                script.attempts.push(buf.len());
                script.data.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.lock().shutdowns += 1;
        Poll::Ready(Ok(()))
    }
}

/// Collects terminal callbacks.
#[derive(Clone, Default)]
pub(crate) struct TerminalLog {
    reasons: Arc<Mutex<Vec<CloseReason>>>,
}

impl TerminalLog {
    pub(crate) fn callback(&self) -> impl FnOnce(CloseReason) + Send + 'static {
        let reasons = Arc::clone(&self.reasons);
        move |reason| reasons.lock().unwrap().push(reason)
    }

    pub(crate) fn count(&self) -> usize {
        self.reasons.lock().unwrap().len()
    }

    pub(crate) fn reasons(&self) -> Vec<CloseReason> {
        self.reasons.lock().unwrap().clone()
    }
}
