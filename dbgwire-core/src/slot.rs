//! The "current writer" slot shared by discovery and the debugger.
//!
//! Last-installed wins. Replacing or clearing a writer closes it, so an
//! abandoned connection never lingers until its peer hangs up.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use crate::writer::{WriterHandle, WriterId};

/// Guarded reference to at most one current writer.
#[derive(Debug, Clone, Default)]
pub struct WriterSlot {
    inner: Arc<Mutex<Option<WriterHandle>>>,
}

impl WriterSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle to the current writer, if any.
    pub fn current(&self) -> Option<WriterHandle> {
        self.lock().clone()
    }

    pub fn current_id(&self) -> Option<WriterId> {
        self.lock().as_ref().map(WriterHandle::id)
    }

    pub fn is_occupied(&self) -> bool {
        self.lock().is_some()
    }

    /// Install `writer`, closing the one it replaces.
    ///
    /// Returns the id of the replaced writer.
    pub fn replace(&self, writer: WriterHandle) -> Option<WriterId> {
        let previous = self.lock().replace(writer);
        previous.map(|old| {
            debug!(writer = %old.id(), "closing replaced writer");
            old.close();
            old.id()
        })
    }

    /// Clear the slot only if it still holds writer `id`.
    pub fn clear_if(&self, id: WriterId) -> bool {
        let mut guard = self.lock();
        if guard.as_ref().map(WriterHandle::id) == Some(id) {
            *guard = None;
            true
        } else {
            false
        }
    }

    /// Remove the current writer without closing it.
    pub fn take(&self) -> Option<WriterHandle> {
        self.lock().take()
    }

    /// Remove and close the current writer.
    pub fn close(&self) {
        if let Some(writer) = self.take() {
            writer.close();
        }
    }

    /// A reference that does not keep the slot, or its writer, alive.
    pub fn downgrade(&self) -> WeakSlot {
        WeakSlot {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<WriterHandle>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Non-owning counterpart of [`WriterSlot`].
///
/// Held by a writer's own terminal callback, which must not keep the
/// writer's handle alive.
#[derive(Debug, Clone)]
pub struct WeakSlot {
    inner: Weak<Mutex<Option<WriterHandle>>>,
}

impl WeakSlot {
    pub fn upgrade(&self) -> Option<WriterSlot> {
        self.inner.upgrade().map(|inner| WriterSlot { inner })
    }

    /// [`WriterSlot::clear_if`] on the slot, if it still exists.
    pub fn clear_if(&self, id: WriterId) -> bool {
        self.upgrade().is_some_and(|slot| slot.clear_if(id))
    }
}

// ── Tests ────────────────────────────────────────────────────────
