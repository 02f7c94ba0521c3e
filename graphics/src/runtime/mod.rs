//! Process-wide runtime.
//!
//! The [`Runtime`] owns the shared arena, the handle table and the registry
//! of workers. It is created once with [`Runtime::startup`] and shared as an
//! `Arc` by every [`Worker`].
//!
//! # Thread Safety
//!
//! `Runtime` is `Send + Sync`. Resource creation and lookup can happen from
//! any worker; recording into a pass is restricted to the worker that owns
//! it.

mod worker;

pub use worker::{Worker, WorkerId};

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use gpubridge_core::{ArenaPtr, Handle, SharedArena, profile_function};
use parking_lot::Mutex;

use crate::backend::CommandSink;
use crate::command::FrozenStream;
use crate::config::{ConfigError, DeviceLimits, RuntimeConfig};
use crate::error::GraphicsError;
use crate::pass::{PassEntry, PassKind};
use crate::resources::{
    BindGroup, BindGroupLayout, Buffer, ComputePipeline, ParityTracker, PipelineLayout, QuerySet,
    RenderPipeline, Resource, ResourceTable, resolve_bind_group_layout, resolve_buffer,
    resolve_parity_tracker, resolve_pass,
};
use crate::types::{
    BindGroupDescriptor, BindGroupLayoutDescriptor, BufferDescriptor, ComputePipelineDescriptor,
    QuerySetDescriptor, RenderPipelineDescriptor,
};

/// Alignment of worker local storage blocks.
pub const LOCAL_STORAGE_ALIGN: u32 = 16;

struct WorkerRecord {
    local_storage: ArenaPtr,
    passes: Vec<Handle>,
    alive: Arc<AtomicBool>,
}

/// Shared state behind every worker.
pub struct Runtime {
    config: RuntimeConfig,
    arena: SharedArena,
    table: ResourceTable,
    workers: Mutex<HashMap<WorkerId, WorkerRecord>>,
    next_worker: AtomicU32,
}

impl Runtime {
    /// Bootstrap the runtime.
    pub fn startup(config: RuntimeConfig) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let runtime = Arc::new(Self {
            arena: SharedArena::new(config.arena_size),
            table: ResourceTable::new(),
            workers: Mutex::new(HashMap::new()),
            next_worker: AtomicU32::new(1),
            config,
        });
        log::info!(
            "Runtime started: {} byte arena, up to {} workers",
            runtime.config.arena_size,
            runtime.config.max_workers
        );
        Ok(runtime)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.config.limits
    }

    pub fn arena(&self) -> &SharedArena {
        &self.arena
    }

    pub fn table(&self) -> &ResourceTable {
        &self.table
    }

    /// Number of live workers.
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    // ------------------------------------------------------------------------
    // Workers
    // ------------------------------------------------------------------------

    /// Create a worker context with its own local storage block.
    pub fn spawn_worker(self: &Arc<Self>) -> Result<Worker, GraphicsError> {
        let mut workers = self.workers.lock();
        if workers.len() >= self.config.max_workers as usize {
            return Err(GraphicsError::InvalidState(format!(
                "worker limit of {} reached",
                self.config.max_workers
            )));
        }

        let size = self.config.worker_local_storage_size;
        let local_storage = self.arena.allocate(size, LOCAL_STORAGE_ALIGN)?;
        if let Err(err) = self.arena.write(local_storage, &vec![0; size as usize]) {
            self.arena.release(local_storage, size, LOCAL_STORAGE_ALIGN)?;
            return Err(err.into());
        }

        let id = WorkerId::new(self.next_worker.fetch_add(1, Ordering::Relaxed));
        let alive = Arc::new(AtomicBool::new(true));
        workers.insert(
            id,
            WorkerRecord {
                local_storage,
                passes: Vec::new(),
                alive: Arc::clone(&alive),
            },
        );
        log::debug!("Spawned {id}: {size} bytes of local storage at {local_storage:#x}");
        Ok(Worker::new(id, Arc::clone(self), alive, local_storage))
    }

    /// Store a freshly begun pass and record it against `worker`.
    ///
    /// The table slot is allocated under the registry lock, so `thread_destroy`
    /// and `teardown` either see the pass or have already retired the worker.
    pub(crate) fn adopt_pass(
        &self,
        worker: WorkerId,
        entry: Arc<PassEntry>,
    ) -> Result<Handle, GraphicsError> {
        let mut workers = self.workers.lock();
        let Some(record) = workers.get_mut(&worker) else {
            return Err(GraphicsError::InvalidState(format!(
                "{worker} has been destroyed"
            )));
        };
        let handle = self.table.allocate(Resource::Pass(entry));
        record.passes.push(handle);
        Ok(handle)
    }

    fn release_local_storage(&self, worker: WorkerId, local_storage: ArenaPtr) {
        let size = self.config.worker_local_storage_size;
        if let Err(err) = self.arena.release(local_storage, size, LOCAL_STORAGE_ALIGN) {
            log::warn!("Could not release local storage of {worker}: {err}");
        }
    }

    fn recording_pass(&self, record: &WorkerRecord) -> Option<Handle> {
        record.passes.iter().copied().find(|pass| {
            matches!(self.table.resolve(*pass), Ok(Resource::Pass(entry)) if entry.is_recording())
        })
    }

    /// Tear down one worker.
    ///
    /// `local_storage` must be the block the worker was given. Fails with
    /// `InUse` while one of its passes is still recording.
    pub fn thread_destroy(
        &self,
        worker: WorkerId,
        local_storage: ArenaPtr,
    ) -> Result<(), GraphicsError> {
        let mut workers = self.workers.lock();
        let Entry::Occupied(slot) = workers.entry(worker) else {
            return Err(GraphicsError::InvalidState(format!(
                "{worker} is not a live worker"
            )));
        };
        let record = slot.get();
        if record.local_storage != local_storage {
            return Err(GraphicsError::Validation(format!(
                "{worker} owns local storage at {:#x}, not {local_storage:#x}",
                record.local_storage
            )));
        }
        if let Some(pass) = self.recording_pass(record) {
            return Err(GraphicsError::InUse { worker, pass });
        }

        let record = slot.remove();
        record.alive.store(false, Ordering::Release);
        self.release_local_storage(worker, record.local_storage);
        log::debug!("Destroyed {worker} ({} pass(es) left in the table)", record.passes.len());
        Ok(())
    }

    /// Tear down every worker and drop every resource.
    ///
    /// Fails with `InUse` if any pass is still recording. Returns the number
    /// of table entries released.
    pub fn teardown(&self) -> Result<usize, GraphicsError> {
        profile_function!();
        let mut workers = self.workers.lock();
        for (worker, record) in workers.iter() {
            if let Some(pass) = self.recording_pass(record) {
                return Err(GraphicsError::InUse {
                    worker: *worker,
                    pass,
                });
            }
        }

        for (worker, record) in workers.drain() {
            record.alive.store(false, Ordering::Release);
            self.release_local_storage(worker, record.local_storage);
        }
        let released = self.table.clear().len();
        log::info!("Runtime torn down: released {released} handle(s)");
        Ok(released)
    }

    // ------------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------------

    pub fn resolve(&self, handle: Handle) -> Result<Resource, GraphicsError> {
        Ok(self.table.resolve(handle)?)
    }

    /// Create a buffer.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the size is zero or exceeds the limit.
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<Handle, GraphicsError> {
        let max = self.config.limits.max_buffer_size;
        if descriptor.size == 0 || descriptor.size > max {
            return Err(GraphicsError::Validation(format!(
                "buffer size {} must be in 1..={max}",
                descriptor.size
            )));
        }
        let handle = self
            .table
            .allocate(Resource::Buffer(Arc::new(Buffer::new(descriptor.clone()))));
        log::trace!(
            "Created buffer {handle} {:?}, size={}, usage={:?}",
            descriptor.label,
            descriptor.size,
            descriptor.usage
        );
        Ok(handle)
    }

    pub fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<Handle, GraphicsError> {
        let mut bindings: Vec<u32> = descriptor.entries.iter().map(|e| e.binding).collect();
        bindings.sort_unstable();
        if let Some(pair) = bindings.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(GraphicsError::Validation(format!(
                "binding {} appears more than once",
                pair[0]
            )));
        }

        let layout = BindGroupLayout::new(descriptor.label.clone(), descriptor.entries.clone());
        let max = self.config.limits.max_dynamic_offsets_per_group as usize;
        if layout.dynamic_offset_count() > max {
            return Err(GraphicsError::Validation(format!(
                "{} dynamic bindings exceed the limit of {max}",
                layout.dynamic_offset_count()
            )));
        }

        let handle = self.table.allocate(Resource::BindGroupLayout(Arc::new(layout)));
        log::trace!("Created bind group layout {handle} {:?}", descriptor.label);
        Ok(handle)
    }

    pub fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<Handle, GraphicsError> {
        let layout = resolve_bind_group_layout(&self.table, descriptor.layout)?;

        let mut resources = Vec::with_capacity(descriptor.entries.len());
        for entry in &descriptor.entries {
            let Some(slot) = layout.entry(entry.binding) else {
                return Err(GraphicsError::Validation(format!(
                    "binding {} is not in layout {}",
                    entry.binding, descriptor.layout
                )));
            };
            if slot.ty.is_buffer() {
                resolve_buffer(&self.table, entry.resource)?;
            } else {
                self.table.resolve(entry.resource)?;
            }
            if resources.iter().any(|(binding, _)| *binding == entry.binding) {
                return Err(GraphicsError::Validation(format!(
                    "binding {} is bound more than once",
                    entry.binding
                )));
            }
            resources.push((entry.binding, entry.resource));
        }
        if resources.len() != layout.entries().len() {
            return Err(GraphicsError::Validation(format!(
                "layout {} declares {} binding(s), bind group provides {}",
                descriptor.layout,
                layout.entries().len(),
                resources.len()
            )));
        }

        let group = BindGroup::new(descriptor.label.clone(), layout, resources);
        let handle = self.table.allocate(Resource::BindGroup(Arc::new(group)));
        log::trace!("Created bind group {handle} {:?}", descriptor.label);
        Ok(handle)
    }

    fn pipeline_layout(
        &self,
        layouts: &[Handle],
        push_constant_size: u32,
    ) -> Result<PipelineLayout, GraphicsError> {
        let limits = &self.config.limits;
        if layouts.len() > limits.max_bind_groups as usize {
            return Err(GraphicsError::Validation(format!(
                "{} bind group layouts exceed the limit of {}",
                layouts.len(),
                limits.max_bind_groups
            )));
        }
        if push_constant_size % 4 != 0 || push_constant_size > limits.max_push_constant_size {
            return Err(GraphicsError::Validation(format!(
                "push constant size {push_constant_size} must be a multiple of 4 and at most {}",
                limits.max_push_constant_size
            )));
        }
        let bind_group_layouts = layouts
            .iter()
            .map(|handle| resolve_bind_group_layout(&self.table, *handle))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PipelineLayout {
            bind_group_layouts,
            push_constant_size,
        })
    }

    pub fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<Handle, GraphicsError> {
        let layout =
            self.pipeline_layout(&descriptor.bind_group_layouts, descriptor.push_constant_size)?;
        let pipeline = ComputePipeline::new(descriptor.label.clone(), layout);
        let handle = self.table.allocate(Resource::ComputePipeline(Arc::new(pipeline)));
        log::trace!("Created compute pipeline {handle} {:?}", descriptor.label);
        Ok(handle)
    }

    pub fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<Handle, GraphicsError> {
        let max_vertex_buffers = self.config.limits.max_vertex_buffers;
        if descriptor.vertex_buffer_count > max_vertex_buffers {
            return Err(GraphicsError::Validation(format!(
                "{} vertex buffers exceed the limit of {max_vertex_buffers}",
                descriptor.vertex_buffer_count
            )));
        }
        let layout =
            self.pipeline_layout(&descriptor.bind_group_layouts, descriptor.push_constant_size)?;
        let pipeline = RenderPipeline::new(
            descriptor.label.clone(),
            layout,
            descriptor.vertex_buffer_count,
        );
        let handle = self.table.allocate(Resource::RenderPipeline(Arc::new(pipeline)));
        log::trace!("Created render pipeline {handle} {:?}", descriptor.label);
        Ok(handle)
    }

    pub fn create_query_set(
        &self,
        descriptor: &QuerySetDescriptor,
    ) -> Result<Handle, GraphicsError> {
        let max = self.config.limits.max_query_set_size;
        if descriptor.count == 0 || descriptor.count > max {
            return Err(GraphicsError::Validation(format!(
                "query set count {} must be in 1..={max}",
                descriptor.count
            )));
        }
        let handle = self
            .table
            .allocate(Resource::QuerySet(Arc::new(QuerySet::new(descriptor.clone()))));
        log::trace!(
            "Created {:?} query set {handle} with {} queries",
            descriptor.ty,
            descriptor.count
        );
        Ok(handle)
    }

    pub fn create_parity_tracker(&self) -> Handle {
        self.table
            .allocate(Resource::ParityTracker(Arc::new(Mutex::new(ParityTracker::new()))))
    }

    /// Ask a parity tracker whether `number` is even.
    pub fn is_even(&self, tracker: Handle, number: u32) -> Result<bool, GraphicsError> {
        let tracker = resolve_parity_tracker(&self.table, tracker)?;
        let even = tracker.lock().is_even(number);
        Ok(even)
    }

    /// The last number a parity tracker was asked about.
    pub fn last_number(&self, tracker: Handle) -> Result<Option<u32>, GraphicsError> {
        let tracker = resolve_parity_tracker(&self.table, tracker)?;
        let last = tracker.lock().last_number();
        Ok(last)
    }

    /// A parity tracker's recent answers, one byte each, oldest first.
    pub fn parity_history(&self, tracker: Handle) -> Result<Vec<u8>, GraphicsError> {
        let tracker = resolve_parity_tracker(&self.table, tracker)?;
        let history = tracker.lock().history();
        Ok(history)
    }

    /// Release a handle.
    ///
    /// Passes that are still recording cannot be freed.
    pub fn free(&self, handle: Handle) -> Result<(), GraphicsError> {
        if let Resource::Pass(entry) = self.table.resolve(handle)? {
            if entry.is_recording() {
                return Err(GraphicsError::InUse {
                    worker: entry.owner(),
                    pass: handle,
                });
            }
            if let Some(record) = self.workers.lock().get_mut(&entry.owner()) {
                record.passes.retain(|pass| *pass != handle);
            }
        }
        let resource = self.table.free(handle)?;
        log::trace!("Freed {} {handle}", resource.kind());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Replay a finished compute or render pass into `sink`.
    pub fn submit<S: CommandSink + ?Sized>(
        &self,
        pass: Handle,
        sink: &mut S,
    ) -> Result<Arc<FrozenStream>, GraphicsError> {
        profile_function!();
        let entry = resolve_pass(&self.table, pass)?;
        if entry.kind() == PassKind::Bundle {
            return Err(GraphicsError::TypeMismatch(format!(
                "bundle {pass} can only run inside a render pass"
            )));
        }
        let stream = entry
            .finished()
            .cloned()
            .ok_or_else(|| GraphicsError::InvalidState(format!("pass {pass} has not finished")))?;
        log::trace!("Submitting {} pass {pass}: {} command(s)", entry.kind(), stream.len());
        stream.replay(sink);
        Ok(stream)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("arena_size", &self.config.arena_size)
            .field("workers", &self.worker_count())
            .field("handles", &self.table.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(Runtime: Send, Sync);
