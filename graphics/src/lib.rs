//! # gpubridge graphics
//!
//! Command recording for compute passes, render passes and render bundles,
//! shared by many worker threads through one handle table.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Runtime`] - bootstrap, worker registry and resource creation
//! - [`Worker`] - a per-thread context that owns the passes it begins
//! - [`PassRecorder`] - the recording state machine with binding, debug and
//!   indirect bookkeeping
//! - [`FrozenStream`] - an immutable command list replayed into a
//!   [`CommandSink`] such as [`DummyBackend`]
//!
//! ## Example
//!
//! ```ignore
//! use gpubridge_graphics::{ComputePipelineDescriptor, DummyBackend, Runtime, RuntimeConfig};
//!
//! let runtime = Runtime::startup(RuntimeConfig::default())?;
//! let worker = runtime.spawn_worker()?;
//! let pipeline = runtime.create_compute_pipeline(&ComputePipelineDescriptor::new(vec![]))?;
//!
//! let pass = worker.begin_compute_pass(Some("cull"))?;
//! worker.record(pass, |rec, table| rec.set_pipeline(table, pipeline))?;
//! worker.record(pass, |rec, _| rec.dispatch_workgroups(64, 1, 1))?;
//! worker.end_pass(pass)?;
//!
//! let mut backend = DummyBackend::new();
//! runtime.submit(pass, &mut backend)?;
//! ```

pub mod backend;
pub mod command;
pub mod config;
pub mod error;
pub mod pass;
pub mod resources;
pub mod runtime;
pub mod types;

pub use backend::{CommandSink, DummyBackend, DummyStats};
pub use command::{Command, CommandStream, FrozenStream};
pub use config::{ConfigError, DeviceLimits, RuntimeConfig};
pub use error::{ErrorKind, GraphicsError};
pub use pass::{PassEntry, PassKind, PassRecorder, PassState};
pub use resources::{Resource, ResourceKind, ResourceTable};
pub use runtime::{Runtime, Worker, WorkerId};
pub use types::{
    BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor, BindGroupLayoutEntry,
    BindingType, BufferDescriptor, BufferUsage, Color, ComputePipelineDescriptor,
    DispatchIndirectArgs, DrawIndexedIndirectArgs, DrawIndirectArgs, IndexFormat, QuerySetDescriptor,
    QueryType, RenderPipelineDescriptor, ScissorRect, ShaderStages, Viewport,
};

pub use gpubridge_core::{Handle, HandleError};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// Only logs versions; the runtime itself is created by [`Runtime::startup`].
pub fn init() {
    gpubridge_core::init();
    log::info!("gpubridge graphics v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert!(backend.name() == "Dummy Backend");
    }
}
