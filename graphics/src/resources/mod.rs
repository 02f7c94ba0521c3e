//! Resources stored in the process-wide handle table.
//!
//! Every handle resolves to one [`Resource`]. The payloads are reference
//! counted so a resolved resource stays usable even if its handle is freed
//! while a caller still holds it.

mod buffer;
mod parity;
mod pipeline;
mod query_set;

use std::fmt;
use std::sync::Arc;

use gpubridge_core::{Handle, HandleTable};
use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::pass::PassEntry;

pub use buffer::Buffer;
pub use parity::ParityTracker;
pub use pipeline::{BindGroup, BindGroupLayout, ComputePipeline, PipelineLayout, RenderPipeline};
pub use query_set::QuerySet;

/// The handle table every worker shares.
pub type ResourceTable = HandleTable<Resource>;

/// A handle table payload.
#[derive(Clone)]
pub enum Resource {
    Buffer(Arc<Buffer>),
    BindGroupLayout(Arc<BindGroupLayout>),
    BindGroup(Arc<BindGroup>),
    ComputePipeline(Arc<ComputePipeline>),
    RenderPipeline(Arc<RenderPipeline>),
    QuerySet(Arc<QuerySet>),
    /// A pass or bundle recorder.
    Pass(Arc<PassEntry>),
    ParityTracker(Arc<Mutex<ParityTracker>>),
}

/// Discriminant of [`Resource`], used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    BindGroupLayout,
    BindGroup,
    ComputePipeline,
    RenderPipeline,
    QuerySet,
    Pass,
    ParityTracker,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Buffer => "buffer",
            Self::BindGroupLayout => "bind group layout",
            Self::BindGroup => "bind group",
            Self::ComputePipeline => "compute pipeline",
            Self::RenderPipeline => "render pipeline",
            Self::QuerySet => "query set",
            Self::Pass => "pass",
            Self::ParityTracker => "parity tracker",
        };
        f.write_str(name)
    }
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Buffer(_) => ResourceKind::Buffer,
            Self::BindGroupLayout(_) => ResourceKind::BindGroupLayout,
            Self::BindGroup(_) => ResourceKind::BindGroup,
            Self::ComputePipeline(_) => ResourceKind::ComputePipeline,
            Self::RenderPipeline(_) => ResourceKind::RenderPipeline,
            Self::QuerySet(_) => ResourceKind::QuerySet,
            Self::Pass(_) => ResourceKind::Pass,
            Self::ParityTracker(_) => ResourceKind::ParityTracker,
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(buffer) => buffer.fmt(f),
            Self::BindGroupLayout(layout) => layout.fmt(f),
            Self::BindGroup(group) => group.fmt(f),
            Self::ComputePipeline(pipeline) => pipeline.fmt(f),
            Self::RenderPipeline(pipeline) => pipeline.fmt(f),
            Self::QuerySet(set) => set.fmt(f),
            Self::Pass(entry) => entry.fmt(f),
            Self::ParityTracker(tracker) => tracker.lock().fmt(f),
        }
    }
}

fn mismatch(handle: Handle, expected: ResourceKind, found: ResourceKind) -> GraphicsError {
    GraphicsError::TypeMismatch(format!("{handle} is a {found}, expected a {expected}"))
}

macro_rules! typed_resolve {
    ($name:ident, $variant:ident, $ty:ty) => {
        /// Resolve `handle` and require the matching resource kind.
        pub fn $name(table: &ResourceTable, handle: Handle) -> Result<$ty, GraphicsError> {
            match table.resolve(handle)? {
                Resource::$variant(value) => Ok(value),
                other => Err(mismatch(handle, ResourceKind::$variant, other.kind())),
            }
        }
    };
}

typed_resolve!(resolve_buffer, Buffer, Arc<Buffer>);
typed_resolve!(resolve_bind_group_layout, BindGroupLayout, Arc<BindGroupLayout>);
typed_resolve!(resolve_bind_group, BindGroup, Arc<BindGroup>);
typed_resolve!(resolve_query_set, QuerySet, Arc<QuerySet>);
typed_resolve!(resolve_pass, Pass, Arc<PassEntry>);
typed_resolve!(resolve_parity_tracker, ParityTracker, Arc<Mutex<ParityTracker>>);

static_assertions::assert_impl_all!(Resource: Send, Sync);
static_assertions::assert_impl_all!(ResourceTable: Send, Sync);
