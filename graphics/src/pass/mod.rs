//! Pass recording.
//!
//! A pass is one of three kinds:
//!
//! - [`PassKind::Compute`]: pipelines, bind groups, push constants and
//!   dispatches
//! - [`PassKind::Render`]: draws plus fixed-function state and bundle
//!   execution
//! - [`PassKind::Bundle`]: a reusable subset of render state and draws that
//!   a render pass replays inline
//!
//! Each pass lives in the handle table as a [`PassEntry`] owned by the worker
//! that began it. Only the owner may record into it.

mod debug;
mod indirect;
mod recorder;
mod state;

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, MutexGuard};

use crate::command::FrozenStream;
use crate::runtime::WorkerId;

pub use debug::{ActiveQuery, DebugState};
pub use indirect::{IndirectCount, IndirectRef, IndirectResolver};
pub use recorder::PassRecorder;
pub use state::{
    BindingState, BoundBindGroup, BoundPipeline, IndexBinding, VertexBinding,
};

/// Kind of recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Compute,
    Render,
    Bundle,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compute => "compute",
            Self::Render => "render",
            Self::Bundle => "bundle",
        })
    }
}

/// Lifecycle of a [`PassRecorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassState {
    Idle,
    Recording(PassKind),
    Finished,
    Aborted,
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Recording(kind) => write!(f, "recording ({kind})"),
            Self::Finished => f.write_str("finished"),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}

/// A pass as stored in the handle table.
pub struct PassEntry {
    owner: WorkerId,
    kind: PassKind,
    label: Option<String>,
    recorder: Mutex<PassRecorder>,
    finished: OnceLock<Arc<FrozenStream>>,
}

impl PassEntry {
    pub(crate) fn new(
        owner: WorkerId,
        kind: PassKind,
        label: Option<String>,
        recorder: PassRecorder,
    ) -> Self {
        Self {
            owner,
            kind,
            label,
            recorder: Mutex::new(recorder),
            finished: OnceLock::new(),
        }
    }

    /// The worker allowed to record into this pass.
    pub fn owner(&self) -> WorkerId {
        self.owner
    }

    pub fn kind(&self) -> PassKind {
        self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn state(&self) -> PassState {
        self.recorder.lock().state()
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state(), PassState::Recording(_))
    }

    /// The frozen stream, once the pass has finished.
    pub fn finished(&self) -> Option<&Arc<FrozenStream>> {
        self.finished.get()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PassRecorder> {
        self.recorder.lock()
    }

    pub(crate) fn publish(&self, stream: Arc<FrozenStream>) {
        if self.finished.set(stream).is_err() {
            log::error!("{} pass {:?} published twice", self.kind, self.label);
        }
    }
}

impl fmt::Debug for PassEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.recorder.try_lock().map(|recorder| recorder.state());
        f.debug_struct("PassEntry")
            .field("owner", &self.owner)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("state", &state)
            .field("finished", &self.finished.get().is_some())
            .finish()
    }
}

static_assertions::assert_impl_all!(PassEntry: Send, Sync);
