//! Worker contexts.
//!
//! A [`Worker`] is one logical thread of the runtime. It owns the passes it
//! begins and is the only context allowed to record into them. Workers are
//! `Send` but not `Sync`: move one to its thread and keep it there.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gpubridge_core::{ArenaPtr, Handle, profile_function};

use crate::command::FrozenStream;
use crate::error::GraphicsError;
use crate::pass::{PassEntry, PassKind, PassRecorder};
use crate::resources::{ResourceTable, resolve_pass};

use super::Runtime;

/// Identifies a worker for ownership checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u32);

impl WorkerId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker#{}", self.0)
    }
}

/// A worker context bound to one runtime.
///
/// Created by [`Runtime::spawn_worker`]; retired by [`Worker::destroy`].
pub struct Worker {
    id: WorkerId,
    runtime: Arc<Runtime>,
    alive: Arc<AtomicBool>,
    local_storage: ArenaPtr,
    _not_sync: PhantomData<Cell<()>>,
}

impl Worker {
    pub(crate) fn new(
        id: WorkerId,
        runtime: Arc<Runtime>,
        alive: Arc<AtomicBool>,
        local_storage: ArenaPtr,
    ) -> Self {
        Self {
            id,
            runtime,
            alive,
            local_storage,
            _not_sync: PhantomData,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Arena offset of this worker's local storage block.
    pub fn local_storage(&self) -> ArenaPtr {
        self.local_storage
    }

    /// False once the worker has been destroyed or the runtime torn down.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn ensure_alive(&self) -> Result<(), GraphicsError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(GraphicsError::InvalidState(format!(
                "{} has been destroyed",
                self.id
            )))
        }
    }

    pub fn begin_compute_pass(&self, label: Option<&str>) -> Result<Handle, GraphicsError> {
        self.begin(PassKind::Compute, label)
    }

    pub fn begin_render_pass(&self, label: Option<&str>) -> Result<Handle, GraphicsError> {
        self.begin(PassKind::Render, label)
    }

    /// Begin recording a render bundle.
    pub fn begin_bundle(&self, label: Option<&str>) -> Result<Handle, GraphicsError> {
        self.begin(PassKind::Bundle, label)
    }

    fn begin(&self, kind: PassKind, label: Option<&str>) -> Result<Handle, GraphicsError> {
        self.ensure_alive()?;
        let label = label.map(str::to_owned);

        let mut recorder = PassRecorder::new(self.runtime.limits().clone());
        recorder.begin(kind, label.clone())?;
        let entry = Arc::new(PassEntry::new(self.id, kind, label, recorder));

        let handle = self.runtime.adopt_pass(self.id, entry)?;
        log::debug!("{} began {kind} pass {handle}", self.id);
        Ok(handle)
    }

    fn owned_pass(&self, pass: Handle) -> Result<Arc<PassEntry>, GraphicsError> {
        self.ensure_alive()?;
        let entry = resolve_pass(self.runtime.table(), pass)?;
        if entry.owner() != self.id {
            return Err(GraphicsError::InvalidOwner {
                pass,
                owner: entry.owner(),
                caller: self.id,
            });
        }
        Ok(entry)
    }

    /// Run a recording call against one of this worker's passes.
    ///
    /// ```ignore
    /// worker.record(pass, |rec, table| rec.set_pipeline(table, pipeline))?;
    /// worker.record(pass, |rec, _| rec.dispatch_workgroups(64, 1, 1))?;
    /// ```
    pub fn record<R>(
        &self,
        pass: Handle,
        f: impl FnOnce(&mut PassRecorder, &ResourceTable) -> Result<R, GraphicsError>,
    ) -> Result<R, GraphicsError> {
        let entry = self.owned_pass(pass)?;
        let mut recorder = entry.lock();
        f(&mut *recorder, self.runtime.table())
    }

    /// Finish a pass. Bundles become available to `execute_bundles`.
    pub fn end_pass(&self, pass: Handle) -> Result<Arc<FrozenStream>, GraphicsError> {
        profile_function!();
        let entry = self.owned_pass(pass)?;
        let stream = entry.lock().end_pass(self.runtime.table())?;
        entry.publish(Arc::clone(&stream));
        Ok(stream)
    }

    /// Retire this worker, releasing its local storage.
    ///
    /// Fails with `InUse` while any pass it owns is still recording; the
    /// worker stays usable in that case.
    pub fn destroy(&self) -> Result<(), GraphicsError> {
        self.runtime.thread_destroy(self.id, self.local_storage)
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .field("local_storage", &self.local_storage)
            .finish()
    }
}

static_assertions::assert_impl_all!(Worker: Send);
static_assertions::assert_not_impl_any!(Worker: Sync);
