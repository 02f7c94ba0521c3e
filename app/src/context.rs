//! Per-thread contexts for the flat call surface.
//!
//! Every call takes plain numbers: handles are raw `u64` ids (0 is null),
//! slots and counts are `u32`, offsets are `u64`. Labels and arrays arrive as
//! a `(ptr, len)` pair into the runtime's shared arena. Calls return a
//! [`Status`], or a raw handle / pointer that is 0 on failure; in both cases
//! [`ThreadContext::last_status`] holds the outcome of the latest call.

use std::cell::Cell;
use std::sync::Arc;

use gpubridge_core::{ArenaPtr, SharedArena};
use gpubridge_graphics::{
    BufferDescriptor, BufferUsage, Color, GraphicsError, Handle, IndexFormat, PassKind,
    PassRecorder, QuerySetDescriptor, QueryType, ResourceTable, Runtime, ScissorRect,
    ShaderStages, Viewport, Worker, WorkerId,
};

use crate::status::Status;

/// Alignment used for blocks handed out by [`ThreadContext::malloc`] when the
/// caller passes 0.
pub const DEFAULT_ALIGN: u32 = 8;

/// Tear down a worker by id and local-storage address.
///
/// This is the only teardown entry that works without the worker's context,
/// e.g. from a supervisor thread after the worker thread has exited.
pub fn thread_destroy(runtime: &Runtime, worker_id: u32, local_storage: u32) -> Status {
    let result = runtime.thread_destroy(WorkerId::new(worker_id), local_storage);
    if let Err(err) = &result {
        log::warn!("thread_destroy(worker#{worker_id}) rejected: {err}");
    }
    Status::from(&result)
}

/// One worker's view of the runtime.
///
/// `Send` but not `Sync`, like the [`Worker`] it wraps.
pub struct ThreadContext {
    worker: Worker,
    last_status: Cell<Status>,
}

impl ThreadContext {
    /// Register a new worker with `runtime`.
    pub fn attach(runtime: &Arc<Runtime>) -> Result<Self, GraphicsError> {
        let worker = runtime.spawn_worker()?;
        log::debug!("Attached {}", worker.id());
        Ok(Self {
            worker,
            last_status: Cell::new(Status::Ok),
        })
    }

    pub fn worker_id(&self) -> u32 {
        self.worker.id().raw()
    }

    pub fn local_storage(&self) -> u32 {
        self.worker.local_storage()
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        self.worker.runtime()
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    /// Outcome of the most recent call made through this context.
    pub fn last_status(&self) -> Status {
        self.last_status.get()
    }

    fn arena(&self) -> &SharedArena {
        self.worker.runtime().arena()
    }

    fn report(&self, result: Result<(), GraphicsError>) -> Status {
        let status = Status::from(&result);
        if let Err(err) = &result {
            log::debug!("{}: {err}", self.worker.id());
        }
        self.last_status.set(status);
        status
    }

    fn report_value<T: Default>(&self, result: Result<T, GraphicsError>) -> T {
        match result {
            Ok(value) => {
                self.last_status.set(Status::Ok);
                value
            }
            Err(err) => {
                self.report(Err(err));
                T::default()
            }
        }
    }

    fn report_handle(&self, result: Result<Handle, GraphicsError>) -> u64 {
        self.report_value(result.map(Handle::to_raw))
    }

    // ------------------------------------------------------------------------
    // Argument decoding
    // ------------------------------------------------------------------------

    fn read_label(&self, ptr: ArenaPtr, len: u32) -> Result<Option<String>, GraphicsError> {
        if len == 0 {
            return Ok(None);
        }
        Ok(Some(self.arena().read_str(ptr, len)?))
    }

    fn read_str(&self, ptr: ArenaPtr, len: u32) -> Result<String, GraphicsError> {
        Ok(self.arena().read_str(ptr, len)?)
    }

    fn read_u32s(&self, ptr: ArenaPtr, count: u32) -> Result<Vec<u32>, GraphicsError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        Ok(self.arena().read_u32_slice(ptr, count)?)
    }

    fn read_handles(&self, ptr: ArenaPtr, count: u32) -> Result<Vec<Handle>, GraphicsError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let raw = self.arena().read_u64_slice(ptr, count)?;
        Ok(raw.into_iter().map(Handle::from_raw).collect())
    }

    fn read_bytes(&self, ptr: ArenaPtr, len: u32) -> Result<Vec<u8>, GraphicsError> {
        Ok(self.arena().read(ptr, len)?)
    }

    /// Stage `bytes` and write the resulting `(ptr, len)` pair to `out_ptr`.
    fn write_bytes_out(&self, out_ptr: ArenaPtr, bytes: &[u8]) -> Result<(), GraphicsError> {
        if out_ptr == 0 {
            return Err(GraphicsError::Validation(
                "result slot must not be the null pointer".into(),
            ));
        }
        let (ptr, len) = if bytes.is_empty() {
            (0, 0)
        } else {
            let ptr = self.arena().allocate_bytes(bytes, DEFAULT_ALIGN)?;
            (ptr, bytes.len() as u32)
        };

        let mut slot = [0u8; 8];
        slot[..4].copy_from_slice(&ptr.to_le_bytes());
        slot[4..].copy_from_slice(&len.to_le_bytes());
        if let Err(err) = self.arena().write(out_ptr, &slot) {
            if ptr != 0 {
                self.arena().release(ptr, len, DEFAULT_ALIGN)?;
            }
            return Err(err.into());
        }
        Ok(())
    }

    fn stages(bits: u32) -> Result<ShaderStages, GraphicsError> {
        ShaderStages::from_bits(bits)
            .ok_or_else(|| GraphicsError::Validation(format!("unknown shader stage bits {bits:#x}")))
    }

    /// Runs `f` against `pass` after checking it is a recording pass of `kind`.
    ///
    /// A call for the wrong pass family and an argument `f` cannot decode both
    /// abort the pass, like any failed recording call.
    fn with_pass(
        &self,
        pass: u64,
        kind: PassKind,
        f: impl FnOnce(&mut PassRecorder, &ResourceTable) -> Result<(), GraphicsError>,
    ) -> Status {
        let handle = Handle::from_raw(pass);
        let result = self.worker.record(handle, |rec, table| {
            rec.ensure_recording("call")?;
            if rec.kind() != Some(kind) {
                let err = GraphicsError::TypeMismatch(format!("{handle} is not a {kind} pass"));
                return Err(rec.fail("pass family check", err));
            }
            let result = f(&mut *rec, table);
            result.map_err(|err| rec.fail("argument decoding", err))
        });
        self.report(result)
    }

    // ------------------------------------------------------------------------
    // Shared memory
    // ------------------------------------------------------------------------

    /// Allocate `size` bytes in the shared arena. Returns 0 on failure.
    pub fn malloc(&self, size: u32, align: u32) -> u32 {
        let align = if align == 0 { DEFAULT_ALIGN } else { align };
        self.report_value(self.arena().allocate(size, align).map_err(GraphicsError::from))
    }

    /// Resize a block. Returns the (possibly moved) pointer, or 0 on failure
    /// with the old block left intact.
    pub fn realloc(&self, ptr: u32, old_size: u32, old_align: u32, new_size: u32) -> u32 {
        let old_align = if old_align == 0 { DEFAULT_ALIGN } else { old_align };
        self.report_value(
            self.arena()
                .reallocate(ptr, old_size, old_align, new_size)
                .map_err(GraphicsError::from),
        )
    }

    pub fn free_bytes(&self, ptr: u32, size: u32, align: u32) -> Status {
        if ptr == 0 {
            return self.report(Err(GraphicsError::Validation(
                "cannot release the null pointer".into(),
            )));
        }
        let align = if align == 0 { DEFAULT_ALIGN } else { align };
        self.report(
            self.arena()
                .release(ptr, size, align)
                .map_err(GraphicsError::from),
        )
    }

    /// Copy `bytes` into a fresh arena block. Returns 0 on failure.
    pub fn stage(&self, bytes: &[u8]) -> u32 {
        self.report_value(
            self.arena()
                .allocate_bytes(bytes, DEFAULT_ALIGN)
                .map_err(GraphicsError::from),
        )
    }

    // ------------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------------

    pub fn create_buffer(&self, size: u64, usage: u32, label_ptr: u32, label_len: u32) -> u64 {
        let result = self.read_label(label_ptr, label_len).and_then(|label| {
            let usage = BufferUsage::from_bits(usage).ok_or_else(|| {
                GraphicsError::Validation(format!("unknown buffer usage bits {usage:#x}"))
            })?;
            let mut descriptor = BufferDescriptor::new(size, usage);
            descriptor.label = label;
            self.runtime().create_buffer(&descriptor)
        });
        self.report_handle(result)
    }

    pub fn create_query_set(&self, ty: u32, count: u32, label_ptr: u32, label_len: u32) -> u64 {
        let result = self.read_label(label_ptr, label_len).and_then(|label| {
            let ty = QueryType::from_raw(ty)
                .ok_or_else(|| GraphicsError::Validation(format!("unknown query type {ty}")))?;
            let mut descriptor = QuerySetDescriptor::new(ty, count);
            descriptor.label = label;
            self.runtime().create_query_set(&descriptor)
        });
        self.report_handle(result)
    }

    pub fn create_parity_tracker(&self) -> u64 {
        self.report_handle(Ok(self.runtime().create_parity_tracker()))
    }

    /// Parity of `number` through a tracker. `false` on failure.
    pub fn parity_is_even(&self, tracker: u64, number: u32) -> bool {
        self.report_value(self.runtime().is_even(Handle::from_raw(tracker), number))
    }

    /// Last number passed to [`parity_is_even`](Self::parity_is_even), or 0
    /// if there is none yet.
    pub fn parity_last_number(&self, tracker: u64) -> u32 {
        self.report_value(
            self.runtime()
                .last_number(Handle::from_raw(tracker))
                .map(Option::unwrap_or_default),
        )
    }

    /// Copy a tracker's recent answers (one byte each, 1 for even) into a new
    /// arena block and write its `(ptr, len)` as two little-endian `u32`s to
    /// the 8-byte slot at `out_ptr`. An empty history is written as `(0, 0)`.
    ///
    /// The caller releases the block with [`free_bytes`](Self::free_bytes).
    pub fn parity_history(&self, tracker: u64, out_ptr: u32) -> Status {
        let result = self
            .runtime()
            .parity_history(Handle::from_raw(tracker))
            .and_then(|bytes| self.write_bytes_out(out_ptr, &bytes));
        self.report(result)
    }

    pub fn free(&self, handle: u64) -> Status {
        self.report(self.runtime().free(Handle::from_raw(handle)))
    }

    // ------------------------------------------------------------------------
    // Pass lifecycle
    // ------------------------------------------------------------------------

    pub fn begin_compute_pass(&self, label_ptr: u32, label_len: u32) -> u64 {
        self.begin(PassKind::Compute, label_ptr, label_len)
    }

    pub fn begin_render_pass(&self, label_ptr: u32, label_len: u32) -> u64 {
        self.begin(PassKind::Render, label_ptr, label_len)
    }

    pub fn begin_render_bundle(&self, label_ptr: u32, label_len: u32) -> u64 {
        self.begin(PassKind::Bundle, label_ptr, label_len)
    }

    fn begin(&self, kind: PassKind, label_ptr: u32, label_len: u32) -> u64 {
        let result = self.read_label(label_ptr, label_len).and_then(|label| {
            let label = label.as_deref();
            match kind {
                PassKind::Compute => self.worker.begin_compute_pass(label),
                PassKind::Render => self.worker.begin_render_pass(label),
                PassKind::Bundle => self.worker.begin_bundle(label),
            }
        });
        self.report_handle(result)
    }

    /// Finish any pass owned by this context.
    pub fn end_pass(&self, pass: u64) -> Status {
        self.report(self.worker.end_pass(Handle::from_raw(pass)).map(drop))
    }

    /// Retire this context's worker.
    ///
    /// Fails with `InUseError` while one of its passes is still recording;
    /// the context stays usable in that case.
    pub fn thread_destroy(&self) -> Status {
        self.report(self.worker.destroy())
    }

    // ------------------------------------------------------------------------
    // Compute pass
    // ------------------------------------------------------------------------

    pub fn compute_pass_set_pipeline(&self, pass: u64, pipeline: u64) -> Status {
        self.set_pipeline(PassKind::Compute, pass, pipeline)
    }

    pub fn compute_pass_set_bind_group(
        &self,
        pass: u64,
        slot: u32,
        bind_group: u64,
        offsets_ptr: u32,
        offsets_len: u32,
    ) -> Status {
        self.set_bind_group(PassKind::Compute, pass, slot, bind_group, offsets_ptr, offsets_len)
    }

    pub fn compute_pass_set_push_constants(
        &self,
        pass: u64,
        stages: u32,
        offset: u32,
        data_ptr: u32,
        data_len: u32,
    ) -> Status {
        self.set_push_constants(PassKind::Compute, pass, stages, offset, data_ptr, data_len)
    }

    pub fn compute_pass_dispatch_workgroups(&self, pass: u64, x: u32, y: u32, z: u32) -> Status {
        self.with_pass(pass, PassKind::Compute, |rec, _| {
            rec.dispatch_workgroups(x, y, z)
        })
    }

    pub fn compute_pass_dispatch_workgroups_indirect(
        &self,
        pass: u64,
        buffer: u64,
        offset: u64,
    ) -> Status {
        self.with_pass(pass, PassKind::Compute, |rec, table| {
            rec.dispatch_workgroups_indirect(table, Handle::from_raw(buffer), offset)
        })
    }

    pub fn compute_pass_push_debug_group(&self, pass: u64, label_ptr: u32, label_len: u32) -> Status {
        self.push_debug_group(PassKind::Compute, pass, label_ptr, label_len)
    }

    pub fn compute_pass_pop_debug_group(&self, pass: u64) -> Status {
        self.with_pass(pass, PassKind::Compute, |rec, _| rec.pop_debug_group())
    }

    pub fn compute_pass_insert_debug_marker(
        &self,
        pass: u64,
        label_ptr: u32,
        label_len: u32,
    ) -> Status {
        self.insert_debug_marker(PassKind::Compute, pass, label_ptr, label_len)
    }

    pub fn compute_pass_write_timestamp(&self, pass: u64, query_set: u64, index: u32) -> Status {
        self.write_timestamp(PassKind::Compute, pass, query_set, index)
    }

    pub fn compute_pass_begin_pipeline_statistics_query(
        &self,
        pass: u64,
        query_set: u64,
        index: u32,
    ) -> Status {
        self.begin_pipeline_statistics_query(PassKind::Compute, pass, query_set, index)
    }

    pub fn compute_pass_end_pipeline_statistics_query(&self, pass: u64) -> Status {
        self.with_pass(pass, PassKind::Compute, |rec, _| {
            rec.end_pipeline_statistics_query()
        })
    }

    // ------------------------------------------------------------------------
    // Render pass
    // ------------------------------------------------------------------------

    pub fn render_pass_set_pipeline(&self, pass: u64, pipeline: u64) -> Status {
        self.set_pipeline(PassKind::Render, pass, pipeline)
    }

    pub fn render_pass_set_bind_group(
        &self,
        pass: u64,
        slot: u32,
        bind_group: u64,
        offsets_ptr: u32,
        offsets_len: u32,
    ) -> Status {
        self.set_bind_group(PassKind::Render, pass, slot, bind_group, offsets_ptr, offsets_len)
    }

    pub fn render_pass_set_vertex_buffer(
        &self,
        pass: u64,
        slot: u32,
        buffer: u64,
        offset: u64,
    ) -> Status {
        self.set_vertex_buffer(PassKind::Render, pass, slot, buffer, offset)
    }

    pub fn render_pass_set_index_buffer(
        &self,
        pass: u64,
        buffer: u64,
        format: u32,
        offset: u64,
    ) -> Status {
        self.set_index_buffer(PassKind::Render, pass, buffer, format, offset)
    }

    pub fn render_pass_set_push_constants(
        &self,
        pass: u64,
        stages: u32,
        offset: u32,
        data_ptr: u32,
        data_len: u32,
    ) -> Status {
        self.set_push_constants(PassKind::Render, pass, stages, offset, data_ptr, data_len)
    }

    pub fn render_pass_set_blend_constant(&self, pass: u64, r: f64, g: f64, b: f64, a: f64) -> Status {
        self.with_pass(pass, PassKind::Render, |rec, _| {
            rec.set_blend_constant(Color::new(r, g, b, a))
        })
    }

    pub fn render_pass_set_stencil_reference(&self, pass: u64, reference: u32) -> Status {
        self.with_pass(pass, PassKind::Render, |rec, _| {
            rec.set_stencil_reference(reference)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn render_pass_set_viewport(
        &self,
        pass: u64,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    ) -> Status {
        let viewport = Viewport::new(x, y, width, height).with_depth_range(min_depth, max_depth);
        self.with_pass(pass, PassKind::Render, |rec, _| rec.set_viewport(viewport))
    }

    pub fn render_pass_set_scissor_rect(
        &self,
        pass: u64,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Status {
        self.with_pass(pass, PassKind::Render, |rec, _| {
            rec.set_scissor_rect(ScissorRect::new(x, y, width, height))
        })
    }

    pub fn render_pass_draw(
        &self,
        pass: u64,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Status {
        self.with_pass(pass, PassKind::Render, |rec, _| {
            rec.draw(vertex_count, instance_count, first_vertex, first_instance)
        })
    }

    pub fn render_pass_draw_indexed(
        &self,
        pass: u64,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Status {
        self.with_pass(pass, PassKind::Render, |rec, _| {
            rec.draw_indexed(index_count, instance_count, first_index, base_vertex, first_instance)
        })
    }

    pub fn render_pass_draw_indirect(&self, pass: u64, buffer: u64, offset: u64) -> Status {
        self.with_pass(pass, PassKind::Render, |rec, table| {
            rec.draw_indirect(table, Handle::from_raw(buffer), offset)
        })
    }

    pub fn render_pass_draw_indexed_indirect(&self, pass: u64, buffer: u64, offset: u64) -> Status {
        self.with_pass(pass, PassKind::Render, |rec, table| {
            rec.draw_indexed_indirect(table, Handle::from_raw(buffer), offset)
        })
    }

    pub fn render_pass_multi_draw_indirect(
        &self,
        pass: u64,
        buffer: u64,
        offset: u64,
        count: u32,
    ) -> Status {
        self.with_pass(pass, PassKind::Render, |rec, table| {
            rec.multi_draw_indirect(table, Handle::from_raw(buffer), offset, count)
        })
    }

    pub fn render_pass_multi_draw_indexed_indirect(
        &self,
        pass: u64,
        buffer: u64,
        offset: u64,
        count: u32,
    ) -> Status {
        self.with_pass(pass, PassKind::Render, |rec, table| {
            rec.multi_draw_indexed_indirect(table, Handle::from_raw(buffer), offset, count)
        })
    }

    pub fn render_pass_multi_draw_indirect_count(
        &self,
        pass: u64,
        buffer: u64,
        offset: u64,
        count_buffer: u64,
        count_offset: u64,
        max_count: u32,
    ) -> Status {
        self.with_pass(pass, PassKind::Render, |rec, table| {
            rec.multi_draw_indirect_count(
                table,
                Handle::from_raw(buffer),
                offset,
                Handle::from_raw(count_buffer),
                count_offset,
                max_count,
            )
        })
    }

    pub fn render_pass_multi_draw_indexed_indirect_count(
        &self,
        pass: u64,
        buffer: u64,
        offset: u64,
        count_buffer: u64,
        count_offset: u64,
        max_count: u32,
    ) -> Status {
        self.with_pass(pass, PassKind::Render, |rec, table| {
            rec.multi_draw_indexed_indirect_count(
                table,
                Handle::from_raw(buffer),
                offset,
                Handle::from_raw(count_buffer),
                count_offset,
                max_count,
            )
        })
    }

    pub fn render_pass_push_debug_group(&self, pass: u64, label_ptr: u32, label_len: u32) -> Status {
        self.push_debug_group(PassKind::Render, pass, label_ptr, label_len)
    }

    pub fn render_pass_pop_debug_group(&self, pass: u64) -> Status {
        self.with_pass(pass, PassKind::Render, |rec, _| rec.pop_debug_group())
    }

    pub fn render_pass_insert_debug_marker(
        &self,
        pass: u64,
        label_ptr: u32,
        label_len: u32,
    ) -> Status {
        self.insert_debug_marker(PassKind::Render, pass, label_ptr, label_len)
    }

    pub fn render_pass_write_timestamp(&self, pass: u64, query_set: u64, index: u32) -> Status {
        self.write_timestamp(PassKind::Render, pass, query_set, index)
    }

    pub fn render_pass_begin_pipeline_statistics_query(
        &self,
        pass: u64,
        query_set: u64,
        index: u32,
    ) -> Status {
        self.begin_pipeline_statistics_query(PassKind::Render, pass, query_set, index)
    }

    pub fn render_pass_end_pipeline_statistics_query(&self, pass: u64) -> Status {
        self.with_pass(pass, PassKind::Render, |rec, _| {
            rec.end_pipeline_statistics_query()
        })
    }

    /// Replay finished bundles inline. `bundles_ptr` points at `count` raw
    /// `u64` handles.
    pub fn render_pass_execute_bundles(&self, pass: u64, bundles_ptr: u32, count: u32) -> Status {
        let bundles = self.read_handles(bundles_ptr, count);
        self.with_pass(pass, PassKind::Render, |rec, table| {
            rec.execute_bundles(table, &bundles?)
        })
    }

    // ------------------------------------------------------------------------
    // Render bundle
    // ------------------------------------------------------------------------

    pub fn render_bundle_set_pipeline(&self, bundle: u64, pipeline: u64) -> Status {
        self.set_pipeline(PassKind::Bundle, bundle, pipeline)
    }

    pub fn render_bundle_set_bind_group(
        &self,
        bundle: u64,
        slot: u32,
        bind_group: u64,
        offsets_ptr: u32,
        offsets_len: u32,
    ) -> Status {
        self.set_bind_group(PassKind::Bundle, bundle, slot, bind_group, offsets_ptr, offsets_len)
    }

    pub fn render_bundle_set_vertex_buffer(
        &self,
        bundle: u64,
        slot: u32,
        buffer: u64,
        offset: u64,
    ) -> Status {
        self.set_vertex_buffer(PassKind::Bundle, bundle, slot, buffer, offset)
    }

    pub fn render_bundle_set_index_buffer(
        &self,
        bundle: u64,
        buffer: u64,
        format: u32,
        offset: u64,
    ) -> Status {
        self.set_index_buffer(PassKind::Bundle, bundle, buffer, format, offset)
    }

    pub fn render_bundle_set_push_constants(
        &self,
        bundle: u64,
        stages: u32,
        offset: u32,
        data_ptr: u32,
        data_len: u32,
    ) -> Status {
        self.set_push_constants(PassKind::Bundle, bundle, stages, offset, data_ptr, data_len)
    }

    pub fn render_bundle_draw(
        &self,
        bundle: u64,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Status {
        self.with_pass(bundle, PassKind::Bundle, |rec, _| {
            rec.draw(vertex_count, instance_count, first_vertex, first_instance)
        })
    }

    pub fn render_bundle_draw_indexed(
        &self,
        bundle: u64,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Status {
        self.with_pass(bundle, PassKind::Bundle, |rec, _| {
            rec.draw_indexed(index_count, instance_count, first_index, base_vertex, first_instance)
        })
    }

    pub fn render_bundle_draw_indirect(&self, bundle: u64, buffer: u64, offset: u64) -> Status {
        self.with_pass(bundle, PassKind::Bundle, |rec, table| {
            rec.draw_indirect(table, Handle::from_raw(buffer), offset)
        })
    }

    pub fn render_bundle_draw_indexed_indirect(
        &self,
        bundle: u64,
        buffer: u64,
        offset: u64,
    ) -> Status {
        self.with_pass(bundle, PassKind::Bundle, |rec, table| {
            rec.draw_indexed_indirect(table, Handle::from_raw(buffer), offset)
        })
    }

    pub fn render_bundle_push_debug_group(
        &self,
        bundle: u64,
        label_ptr: u32,
        label_len: u32,
    ) -> Status {
        self.push_debug_group(PassKind::Bundle, bundle, label_ptr, label_len)
    }

    pub fn render_bundle_pop_debug_group(&self, bundle: u64) -> Status {
        self.with_pass(bundle, PassKind::Bundle, |rec, _| rec.pop_debug_group())
    }

    pub fn render_bundle_insert_debug_marker(
        &self,
        bundle: u64,
        label_ptr: u32,
        label_len: u32,
    ) -> Status {
        self.insert_debug_marker(PassKind::Bundle, bundle, label_ptr, label_len)
    }

    // ------------------------------------------------------------------------
    // Calls shared between pass kinds
    // ------------------------------------------------------------------------

    fn set_pipeline(&self, kind: PassKind, pass: u64, pipeline: u64) -> Status {
        self.with_pass(pass, kind, |rec, table| {
            rec.set_pipeline(table, Handle::from_raw(pipeline))
        })
    }

    fn set_bind_group(
        &self,
        kind: PassKind,
        pass: u64,
        slot: u32,
        bind_group: u64,
        offsets_ptr: u32,
        offsets_len: u32,
    ) -> Status {
        let offsets = self.read_u32s(offsets_ptr, offsets_len);
        self.with_pass(pass, kind, |rec, table| {
            rec.set_bind_group(table, slot, Handle::from_raw(bind_group), &offsets?)
        })
    }

    fn set_vertex_buffer(
        &self,
        kind: PassKind,
        pass: u64,
        slot: u32,
        buffer: u64,
        offset: u64,
    ) -> Status {
        self.with_pass(pass, kind, |rec, table| {
            rec.set_vertex_buffer(table, slot, Handle::from_raw(buffer), offset)
        })
    }

    fn set_index_buffer(
        &self,
        kind: PassKind,
        pass: u64,
        buffer: u64,
        format: u32,
        offset: u64,
    ) -> Status {
        self.with_pass(pass, kind, |rec, table| {
            let format = IndexFormat::from_raw(format).ok_or_else(|| {
                GraphicsError::Validation(format!("unknown index format {format}"))
            })?;
            rec.set_index_buffer(table, Handle::from_raw(buffer), format, offset)
        })
    }

    fn set_push_constants(
        &self,
        kind: PassKind,
        pass: u64,
        stages: u32,
        offset: u32,
        data_ptr: u32,
        data_len: u32,
    ) -> Status {
        let data = self.read_bytes(data_ptr, data_len);
        self.with_pass(pass, kind, |rec, _| {
            let stages = Self::stages(stages)?;
            rec.set_push_constants(stages, offset, &data?)
        })
    }

    fn push_debug_group(&self, kind: PassKind, pass: u64, label_ptr: u32, label_len: u32) -> Status {
        let label = self.read_str(label_ptr, label_len);
        self.with_pass(pass, kind, |rec, _| rec.push_debug_group(&label?))
    }

    fn insert_debug_marker(
        &self,
        kind: PassKind,
        pass: u64,
        label_ptr: u32,
        label_len: u32,
    ) -> Status {
        let label = self.read_str(label_ptr, label_len);
        self.with_pass(pass, kind, |rec, _| rec.insert_debug_marker(&label?))
    }

    fn write_timestamp(&self, kind: PassKind, pass: u64, query_set: u64, index: u32) -> Status {
        self.with_pass(pass, kind, |rec, table| {
            rec.write_timestamp(table, Handle::from_raw(query_set), index)
        })
    }

    fn begin_pipeline_statistics_query(
        &self,
        kind: PassKind,
        pass: u64,
        query_set: u64,
        index: u32,
    ) -> Status {
        self.with_pass(pass, kind, |rec, table| {
            rec.begin_pipeline_statistics_query(table, Handle::from_raw(query_set), index)
        })
    }
}

impl std::fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadContext")
            .field("worker", &self.worker)
            .field("last_status", &self.last_status.get())
            .finish()
    }
}
