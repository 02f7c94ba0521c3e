//! The pass recorder state machine.
//!
//! A [`PassRecorder`] starts [`Idle`](PassState::Idle), becomes
//! [`Recording`](PassState::Recording) on [`begin`](PassRecorder::begin) and
//! ends either [`Finished`](PassState::Finished) with a frozen stream or
//! [`Aborted`](PassState::Aborted). Any failing call made while recording
//! aborts the pass; the first failure is kept as the abort cause and every
//! later call fails with `InvalidState`.
//!
//! Calls that look up resources take the [`ResourceTable`] explicitly so the
//! recorder can live inside the table it reads from.

use std::sync::Arc;

use gpubridge_core::{Handle, profile_scope};

use crate::command::{Command, CommandStream, FrozenStream};
use crate::config::DeviceLimits;
use crate::error::GraphicsError;
use crate::resources::{
    Resource, ResourceTable, resolve_bind_group, resolve_buffer, resolve_pass, resolve_query_set,
};
use crate::types::{
    BufferUsage, Color, DispatchIndirectArgs, DrawIndexedIndirectArgs, DrawIndirectArgs,
    IndexFormat, QueryType, ScissorRect, ShaderStages, Viewport,
};

use super::debug::DebugState;
use super::indirect::{IndirectCount, IndirectRef, IndirectResolver};
use super::state::{BindingState, BoundBindGroup, BoundPipeline, IndexBinding, VertexBinding};
use super::{PassKind, PassState};

const RENDER_LIKE: &[PassKind] = &[PassKind::Render, PassKind::Bundle];
const RENDER_ONLY: &[PassKind] = &[PassKind::Render];
const COMPUTE_ONLY: &[PassKind] = &[PassKind::Compute];
const QUERY_CAPABLE: &[PassKind] = &[PassKind::Compute, PassKind::Render];

fn require_kind(kind: PassKind, allowed: &[PassKind], op: &str) -> Result<(), GraphicsError> {
    if allowed.contains(&kind) {
        Ok(())
    } else {
        Err(GraphicsError::TypeMismatch(format!(
            "{op} is not available in a {kind} pass"
        )))
    }
}

/// Records one compute pass, render pass or render bundle.
#[derive(Debug)]
pub struct PassRecorder {
    state: PassState,
    kind: Option<PassKind>,
    label: Option<String>,
    limits: DeviceLimits,
    stream: CommandStream,
    bindings: BindingState,
    debug: DebugState,
    indirect: IndirectResolver,
    abort_cause: Option<GraphicsError>,
}

impl PassRecorder {
    /// Create an idle recorder.
    pub fn new(limits: DeviceLimits) -> Self {
        let bindings = BindingState::new(limits.max_bind_groups, limits.max_vertex_buffers);
        Self {
            state: PassState::Idle,
            kind: None,
            label: None,
            limits,
            stream: CommandStream::new(PassKind::Compute, None),
            bindings,
            debug: DebugState::new(),
            indirect: IndirectResolver::new(),
            abort_cause: None,
        }
    }

    /// Start recording.
    pub fn begin(&mut self, kind: PassKind, label: Option<String>) -> Result<(), GraphicsError> {
        if self.state != PassState::Idle {
            return Err(GraphicsError::InvalidState(format!(
                "cannot begin a pass that is {}",
                self.state
            )));
        }
        log::debug!("Begin {kind} pass {label:?}");
        self.stream = CommandStream::new(kind, label.clone());
        self.kind = Some(kind);
        self.label = label;
        self.state = PassState::Recording(kind);
        Ok(())
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn kind(&self) -> Option<PassKind> {
        self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The error that aborted this pass, if it was aborted.
    pub fn abort_cause(&self) -> Option<&GraphicsError> {
        self.abort_cause.as_ref()
    }

    pub fn bindings(&self) -> &BindingState {
        &self.bindings
    }

    pub fn debug_state(&self) -> &DebugState {
        &self.debug
    }

    pub fn pending_indirect(&self) -> &IndirectResolver {
        &self.indirect
    }

    /// Commands recorded so far.
    pub fn commands(&self) -> &[Command] {
        self.stream.commands()
    }

    fn recording_kind(&self, op: &str) -> Result<PassKind, GraphicsError> {
        match self.state {
            PassState::Recording(kind) => Ok(kind),
            PassState::Aborted => Err(GraphicsError::InvalidState(format!(
                "{op} on an aborted pass"
            ))),
            state => Err(GraphicsError::InvalidState(format!(
                "{op} on a pass that is {state}"
            ))),
        }
    }

    /// Run one recording call, aborting the pass if it fails.
    fn record<R>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut Self, PassKind) -> Result<R, GraphicsError>,
    ) -> Result<R, GraphicsError> {
        let kind = self.recording_kind(op)?;
        let result = f(self, kind);
        if let Err(err) = &result {
            self.abort(op, err.clone());
        }
        result
    }

    /// `InvalidState` unless the pass is recording.
    pub fn ensure_recording(&self, op: &str) -> Result<(), GraphicsError> {
        self.recording_kind(op).map(drop)
    }

    /// Abort a recording pass for a failure found outside the recorder, such
    /// as an argument that could not be decoded. Returns `cause`.
    ///
    /// A pass that is not recording is left as it is.
    pub fn fail(&mut self, op: &str, cause: GraphicsError) -> GraphicsError {
        self.abort(op, cause.clone());
        cause
    }

    fn abort(&mut self, op: &str, cause: GraphicsError) {
        if let PassState::Recording(kind) = self.state {
            log::warn!("{kind} pass {:?} aborted by {op}: {cause}", self.label);
            self.state = PassState::Aborted;
            self.stream = CommandStream::new(kind, None);
            self.abort_cause = Some(cause);
        }
    }

    fn push(&mut self, command: Command) -> usize {
        let index = self.stream.len();
        self.stream.push(command);
        index
    }

    fn require_pipeline(&self, op: &str) -> Result<BoundPipeline, GraphicsError> {
        self.bindings
            .pipeline()
            .cloned()
            .ok_or_else(|| GraphicsError::InvalidState(format!("{op} requires a bound pipeline")))
    }

    fn check_draw_ready(&self, op: &str, indexed: bool) -> Result<(), GraphicsError> {
        let pipeline = self.require_pipeline(op)?;
        if indexed && self.bindings.index_buffer().is_none() {
            return Err(GraphicsError::InvalidState(format!(
                "{op} requires a bound index buffer"
            )));
        }
        if let Some(slot) = self
            .bindings
            .missing_vertex_buffer(pipeline.vertex_buffer_count())
        {
            return Err(GraphicsError::Validation(format!(
                "{op}: the pipeline reads vertex buffer slot {slot}, which is not bound"
            )));
        }
        Ok(())
    }

    fn check_label(&self, label: &str) -> Result<(), GraphicsError> {
        if label.len() > self.limits.max_debug_label_len {
            return Err(GraphicsError::Validation(format!(
                "debug label of {} bytes exceeds the {} byte limit",
                label.len(),
                self.limits.max_debug_label_len
            )));
        }
        Ok(())
    }

    /// Check an indirect argument buffer as far as possible before the pass ends.
    fn check_indirect_source(
        &self,
        table: &ResourceTable,
        buffer: Handle,
        offset: u64,
    ) -> Result<(), GraphicsError> {
        resolve_buffer(table, buffer)?;
        let align = self.limits.indirect_offset_alignment;
        if offset % align != 0 {
            return Err(GraphicsError::Validation(format!(
                "indirect offset {offset} is not a multiple of {align}"
            )));
        }
        Ok(())
    }

    fn defer_indirect(&mut self, command: Command, stride: u64, count: IndirectCount) {
        let (buffer, offset) = match &command {
            Command::DrawIndirect { buffer, offset }
            | Command::DrawIndexedIndirect { buffer, offset }
            | Command::DispatchIndirect { buffer, offset }
            | Command::MultiDrawIndirect { buffer, offset, .. }
            | Command::MultiDrawIndexedIndirect { buffer, offset, .. }
            | Command::MultiDrawIndirectCount { buffer, offset, .. }
            | Command::MultiDrawIndexedIndirectCount { buffer, offset, .. } => (*buffer, *offset),
            _ => return,
        };
        let command_index = self.push(command);
        self.indirect.defer(IndirectRef {
            command_index,
            buffer,
            offset,
            stride,
            count,
        });
    }

    // ------------------------------------------------------------------------
    // State setting
    // ------------------------------------------------------------------------

    pub fn set_pipeline(
        &mut self,
        table: &ResourceTable,
        pipeline: Handle,
    ) -> Result<(), GraphicsError> {
        self.record("set_pipeline", |this, kind| {
            let bound = match (kind, table.resolve(pipeline)?) {
                (PassKind::Compute, Resource::ComputePipeline(p)) => BoundPipeline::Compute(p),
                (PassKind::Render | PassKind::Bundle, Resource::RenderPipeline(p)) => {
                    BoundPipeline::Render(p)
                }
                (kind, other) => {
                    return Err(GraphicsError::TypeMismatch(format!(
                        "cannot bind {} {pipeline} in a {kind} pass",
                        other.kind()
                    )));
                }
            };
            let cleared = this.bindings.set_pipeline(pipeline, bound);
            if !cleared.is_empty() {
                log::trace!("Pipeline {pipeline} invalidated bind group slots {cleared:?}");
            }
            this.push(Command::SetPipeline(pipeline));
            Ok(())
        })
    }

    pub fn set_bind_group(
        &mut self,
        table: &ResourceTable,
        slot: u32,
        bind_group: Handle,
        dynamic_offsets: &[u32],
    ) -> Result<(), GraphicsError> {
        self.record("set_bind_group", |this, _| {
            let pipeline = this.bindings.pipeline().cloned();
            let limit = pipeline
                .as_ref()
                .map_or(this.limits.max_bind_groups, |p| p.layout().bind_group_count());
            if slot >= limit {
                return Err(GraphicsError::Validation(format!(
                    "bind group slot {slot} exceeds the {limit} slot(s) available"
                )));
            }

            let group = resolve_bind_group(table, bind_group)?;
            if let Some(expected) = pipeline
                .as_ref()
                .and_then(|p| p.layout().bind_group_layout(slot))
                && !expected.is_compatible(group.layout())
            {
                return Err(GraphicsError::Validation(format!(
                    "bind group {bind_group} does not match the layout of slot {slot}"
                )));
            }

            let required = group.layout().dynamic_offset_count();
            if dynamic_offsets.len() != required {
                return Err(GraphicsError::Validation(format!(
                    "bind group {bind_group} needs {required} dynamic offset(s), got {}",
                    dynamic_offsets.len()
                )));
            }
            let align = this.limits.dynamic_offset_alignment;
            if let Some(bad) = dynamic_offsets.iter().find(|offset| *offset % align != 0) {
                return Err(GraphicsError::Validation(format!(
                    "dynamic offset {bad} is not a multiple of {align}"
                )));
            }

            this.bindings.set_bind_group(
                slot,
                BoundBindGroup {
                    handle: bind_group,
                    layout: group.layout().clone(),
                    dynamic_offsets: dynamic_offsets.to_vec(),
                },
            );
            this.push(Command::SetBindGroup {
                slot,
                bind_group,
                dynamic_offsets: dynamic_offsets.to_vec(),
            });
            Ok(())
        })
    }

    pub fn set_vertex_buffer(
        &mut self,
        table: &ResourceTable,
        slot: u32,
        buffer: Handle,
        offset: u64,
    ) -> Result<(), GraphicsError> {
        self.record("set_vertex_buffer", |this, kind| {
            require_kind(kind, RENDER_LIKE, "set_vertex_buffer")?;
            if slot >= this.limits.max_vertex_buffers {
                return Err(GraphicsError::Validation(format!(
                    "vertex buffer slot {slot} exceeds the limit of {}",
                    this.limits.max_vertex_buffers
                )));
            }
            let resolved = resolve_buffer(table, buffer)?;
            if !resolved.usage().contains(BufferUsage::VERTEX) {
                return Err(GraphicsError::Validation(format!(
                    "buffer {buffer} lacks VERTEX usage"
                )));
            }
            if offset % 4 != 0 || offset > resolved.size() {
                return Err(GraphicsError::Validation(format!(
                    "vertex buffer offset {offset} is unaligned or past the end of {buffer}"
                )));
            }
            this.bindings
                .set_vertex_buffer(slot, VertexBinding { buffer, offset });
            this.push(Command::SetVertexBuffer {
                slot,
                buffer,
                offset,
            });
            Ok(())
        })
    }

    pub fn set_index_buffer(
        &mut self,
        table: &ResourceTable,
        buffer: Handle,
        format: IndexFormat,
        offset: u64,
    ) -> Result<(), GraphicsError> {
        self.record("set_index_buffer", |this, kind| {
            require_kind(kind, RENDER_LIKE, "set_index_buffer")?;
            let resolved = resolve_buffer(table, buffer)?;
            if !resolved.usage().contains(BufferUsage::INDEX) {
                return Err(GraphicsError::Validation(format!(
                    "buffer {buffer} lacks INDEX usage"
                )));
            }
            if offset % format.stride() != 0 || offset > resolved.size() {
                return Err(GraphicsError::Validation(format!(
                    "index buffer offset {offset} is unaligned for {format:?} or past the end of {buffer}"
                )));
            }
            this.bindings.set_index_buffer(IndexBinding {
                buffer,
                format,
                offset,
            });
            this.push(Command::SetIndexBuffer {
                buffer,
                format,
                offset,
            });
            Ok(())
        })
    }

    pub fn set_push_constants(
        &mut self,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        self.record("set_push_constants", |this, _| {
            let pipeline = this.require_pipeline("set_push_constants")?;
            if stages.is_empty() {
                return Err(GraphicsError::Validation(
                    "push constants need at least one shader stage".into(),
                ));
            }
            if offset % 4 != 0 || data.len() % 4 != 0 {
                return Err(GraphicsError::Validation(format!(
                    "push constant offset {offset} and size {} must be multiples of 4",
                    data.len()
                )));
            }
            let size = pipeline.layout().push_constant_size;
            let end = u64::from(offset) + data.len() as u64;
            if end > u64::from(size) {
                return Err(GraphicsError::Validation(format!(
                    "push constants {offset}..{end} exceed the pipeline's {size} byte range"
                )));
            }
            this.bindings.write_push_constants(offset, data);
            let range = this.stream.stage_push_constants(data);
            this.push(Command::SetPushConstants {
                stages,
                offset,
                data: range,
            });
            Ok(())
        })
    }

    pub fn set_blend_constant(&mut self, color: Color) -> Result<(), GraphicsError> {
        self.record("set_blend_constant", |this, kind| {
            require_kind(kind, RENDER_ONLY, "set_blend_constant")?;
            this.push(Command::SetBlendConstant(color));
            Ok(())
        })
    }

    pub fn set_stencil_reference(&mut self, reference: u32) -> Result<(), GraphicsError> {
        self.record("set_stencil_reference", |this, kind| {
            require_kind(kind, RENDER_ONLY, "set_stencil_reference")?;
            this.push(Command::SetStencilReference(reference));
            Ok(())
        })
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<(), GraphicsError> {
        self.record("set_viewport", |this, kind| {
            require_kind(kind, RENDER_ONLY, "set_viewport")?;
            viewport.check().map_err(GraphicsError::Validation)?;
            this.push(Command::SetViewport(viewport));
            Ok(())
        })
    }

    pub fn set_scissor_rect(&mut self, rect: ScissorRect) -> Result<(), GraphicsError> {
        self.record("set_scissor_rect", |this, kind| {
            require_kind(kind, RENDER_ONLY, "set_scissor_rect")?;
            this.push(Command::SetScissorRect(rect));
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Draws and dispatches
    // ------------------------------------------------------------------------

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<(), GraphicsError> {
        self.record("draw", |this, kind| {
            require_kind(kind, RENDER_LIKE, "draw")?;
            this.check_draw_ready("draw", false)?;
            this.push(Command::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            });
            Ok(())
        })
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<(), GraphicsError> {
        self.record("draw_indexed", |this, kind| {
            require_kind(kind, RENDER_LIKE, "draw_indexed")?;
            this.check_draw_ready("draw_indexed", true)?;
            this.push(Command::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            });
            Ok(())
        })
    }

    pub fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32) -> Result<(), GraphicsError> {
        self.record("dispatch_workgroups", |this, kind| {
            require_kind(kind, COMPUTE_ONLY, "dispatch_workgroups")?;
            this.require_pipeline("dispatch_workgroups")?;
            let max = this.limits.max_workgroups_per_dimension;
            if x > max || y > max || z > max {
                return Err(GraphicsError::Validation(format!(
                    "dispatch ({x}, {y}, {z}) exceeds {max} workgroups per dimension"
                )));
            }
            this.push(Command::Dispatch { x, y, z });
            Ok(())
        })
    }

    pub fn draw_indirect(
        &mut self,
        table: &ResourceTable,
        buffer: Handle,
        offset: u64,
    ) -> Result<(), GraphicsError> {
        self.record("draw_indirect", |this, kind| {
            require_kind(kind, RENDER_LIKE, "draw_indirect")?;
            this.check_draw_ready("draw_indirect", false)?;
            this.check_indirect_source(table, buffer, offset)?;
            this.defer_indirect(
                Command::DrawIndirect { buffer, offset },
                DrawIndirectArgs::SIZE,
                IndirectCount::Single,
            );
            Ok(())
        })
    }

    pub fn draw_indexed_indirect(
        &mut self,
        table: &ResourceTable,
        buffer: Handle,
        offset: u64,
    ) -> Result<(), GraphicsError> {
        self.record("draw_indexed_indirect", |this, kind| {
            require_kind(kind, RENDER_LIKE, "draw_indexed_indirect")?;
            this.check_draw_ready("draw_indexed_indirect", true)?;
            this.check_indirect_source(table, buffer, offset)?;
            this.defer_indirect(
                Command::DrawIndexedIndirect { buffer, offset },
                DrawIndexedIndirectArgs::SIZE,
                IndirectCount::Single,
            );
            Ok(())
        })
    }

    pub fn dispatch_workgroups_indirect(
        &mut self,
        table: &ResourceTable,
        buffer: Handle,
        offset: u64,
    ) -> Result<(), GraphicsError> {
        self.record("dispatch_workgroups_indirect", |this, kind| {
            require_kind(kind, COMPUTE_ONLY, "dispatch_workgroups_indirect")?;
            this.require_pipeline("dispatch_workgroups_indirect")?;
            this.check_indirect_source(table, buffer, offset)?;
            this.defer_indirect(
                Command::DispatchIndirect { buffer, offset },
                DispatchIndirectArgs::SIZE,
                IndirectCount::Single,
            );
            Ok(())
        })
    }

    pub fn multi_draw_indirect(
        &mut self,
        table: &ResourceTable,
        buffer: Handle,
        offset: u64,
        count: u32,
    ) -> Result<(), GraphicsError> {
        self.record("multi_draw_indirect", |this, kind| {
            require_kind(kind, RENDER_ONLY, "multi_draw_indirect")?;
            this.check_draw_ready("multi_draw_indirect", false)?;
            this.check_indirect_source(table, buffer, offset)?;
            this.defer_indirect(
                Command::MultiDrawIndirect {
                    buffer,
                    offset,
                    count,
                },
                DrawIndirectArgs::SIZE,
                IndirectCount::Fixed(count),
            );
            Ok(())
        })
    }

    pub fn multi_draw_indexed_indirect(
        &mut self,
        table: &ResourceTable,
        buffer: Handle,
        offset: u64,
        count: u32,
    ) -> Result<(), GraphicsError> {
        self.record("multi_draw_indexed_indirect", |this, kind| {
            require_kind(kind, RENDER_ONLY, "multi_draw_indexed_indirect")?;
            this.check_draw_ready("multi_draw_indexed_indirect", true)?;
            this.check_indirect_source(table, buffer, offset)?;
            this.defer_indirect(
                Command::MultiDrawIndexedIndirect {
                    buffer,
                    offset,
                    count,
                },
                DrawIndexedIndirectArgs::SIZE,
                IndirectCount::Fixed(count),
            );
            Ok(())
        })
    }

    pub fn multi_draw_indirect_count(
        &mut self,
        table: &ResourceTable,
        buffer: Handle,
        offset: u64,
        count_buffer: Handle,
        count_offset: u64,
        max_count: u32,
    ) -> Result<(), GraphicsError> {
        self.record("multi_draw_indirect_count", |this, kind| {
            require_kind(kind, RENDER_ONLY, "multi_draw_indirect_count")?;
            this.check_draw_ready("multi_draw_indirect_count", false)?;
            this.check_indirect_source(table, buffer, offset)?;
            this.check_indirect_source(table, count_buffer, count_offset)?;
            this.defer_indirect(
                Command::MultiDrawIndirectCount {
                    buffer,
                    offset,
                    count_buffer,
                    count_offset,
                    max_count,
                },
                DrawIndirectArgs::SIZE,
                IndirectCount::Buffer {
                    buffer: count_buffer,
                    offset: count_offset,
                    max_count,
                },
            );
            Ok(())
        })
    }

    pub fn multi_draw_indexed_indirect_count(
        &mut self,
        table: &ResourceTable,
        buffer: Handle,
        offset: u64,
        count_buffer: Handle,
        count_offset: u64,
        max_count: u32,
    ) -> Result<(), GraphicsError> {
        self.record("multi_draw_indexed_indirect_count", |this, kind| {
            require_kind(kind, RENDER_ONLY, "multi_draw_indexed_indirect_count")?;
            this.check_draw_ready("multi_draw_indexed_indirect_count", true)?;
            this.check_indirect_source(table, buffer, offset)?;
            this.check_indirect_source(table, count_buffer, count_offset)?;
            this.defer_indirect(
                Command::MultiDrawIndexedIndirectCount {
                    buffer,
                    offset,
                    count_buffer,
                    count_offset,
                    max_count,
                },
                DrawIndexedIndirectArgs::SIZE,
                IndirectCount::Buffer {
                    buffer: count_buffer,
                    offset: count_offset,
                    max_count,
                },
            );
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Debug labels and queries
    // ------------------------------------------------------------------------

    pub fn push_debug_group(&mut self, label: &str) -> Result<(), GraphicsError> {
        self.record("push_debug_group", |this, _| {
            this.check_label(label)?;
            this.debug.push_group(label.to_owned());
            this.push(Command::PushDebugGroup(label.to_owned()));
            Ok(())
        })
    }

    pub fn pop_debug_group(&mut self) -> Result<(), GraphicsError> {
        self.record("pop_debug_group", |this, _| {
            this.debug.pop_group()?;
            this.push(Command::PopDebugGroup);
            Ok(())
        })
    }

    pub fn insert_debug_marker(&mut self, label: &str) -> Result<(), GraphicsError> {
        self.record("insert_debug_marker", |this, _| {
            this.check_label(label)?;
            this.debug.insert_marker();
            this.push(Command::InsertDebugMarker(label.to_owned()));
            Ok(())
        })
    }

    fn check_query(
        table: &ResourceTable,
        query_set: Handle,
        index: u32,
        ty: QueryType,
    ) -> Result<(), GraphicsError> {
        let set = resolve_query_set(table, query_set)?;
        if set.ty() != ty {
            return Err(GraphicsError::TypeMismatch(format!(
                "query set {query_set} holds {:?} queries, expected {ty:?}",
                set.ty()
            )));
        }
        if index >= set.count() {
            return Err(GraphicsError::Validation(format!(
                "query index {index} is out of range for {query_set} ({} queries)",
                set.count()
            )));
        }
        Ok(())
    }

    pub fn write_timestamp(
        &mut self,
        table: &ResourceTable,
        query_set: Handle,
        index: u32,
    ) -> Result<(), GraphicsError> {
        self.record("write_timestamp", |this, kind| {
            require_kind(kind, QUERY_CAPABLE, "write_timestamp")?;
            Self::check_query(table, query_set, index, QueryType::Timestamp)?;
            this.push(Command::WriteTimestamp { query_set, index });
            Ok(())
        })
    }

    pub fn begin_pipeline_statistics_query(
        &mut self,
        table: &ResourceTable,
        query_set: Handle,
        index: u32,
    ) -> Result<(), GraphicsError> {
        self.record("begin_pipeline_statistics_query", |this, kind| {
            require_kind(kind, QUERY_CAPABLE, "begin_pipeline_statistics_query")?;
            if let Some(active) = this.debug.active_query() {
                return Err(GraphicsError::OnlyOneActive {
                    query_set: active.query_set,
                    index: active.index,
                });
            }
            Self::check_query(table, query_set, index, QueryType::PipelineStatistics)?;
            this.debug.begin_query(query_set, index)?;
            this.push(Command::BeginPipelineStatisticsQuery { query_set, index });
            Ok(())
        })
    }

    pub fn end_pipeline_statistics_query(&mut self) -> Result<(), GraphicsError> {
        self.record("end_pipeline_statistics_query", |this, kind| {
            require_kind(kind, QUERY_CAPABLE, "end_pipeline_statistics_query")?;
            this.debug.end_query()?;
            this.push(Command::EndPipelineStatisticsQuery);
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Bundles and completion
    // ------------------------------------------------------------------------

    /// Replay finished bundles inline.
    ///
    /// Afterwards the pass has no pipeline, bind groups or buffers bound.
    pub fn execute_bundles(
        &mut self,
        table: &ResourceTable,
        bundles: &[Handle],
    ) -> Result<(), GraphicsError> {
        self.record("execute_bundles", |this, kind| {
            require_kind(kind, RENDER_ONLY, "execute_bundles")?;

            let mut streams = Vec::with_capacity(bundles.len());
            for &bundle in bundles {
                let entry = resolve_pass(table, bundle)?;
                if entry.kind() != PassKind::Bundle {
                    return Err(GraphicsError::TypeMismatch(format!(
                        "{bundle} is a {} pass, not a bundle",
                        entry.kind()
                    )));
                }
                let stream = entry.finished().cloned().ok_or_else(|| {
                    GraphicsError::InvalidState(format!("bundle {bundle} has not finished"))
                })?;
                streams.push((bundle, stream));
            }

            for (bundle, stream) in streams {
                this.push(Command::ExecuteBundle { bundle, stream });
            }
            this.bindings.reset();
            Ok(())
        })
    }

    /// Finish recording and freeze the stream.
    ///
    /// Open debug groups or queries fail with `Unbalanced` and indirect
    /// references are resolved here; either failure aborts the pass.
    pub fn end_pass(&mut self, table: &ResourceTable) -> Result<Arc<FrozenStream>, GraphicsError> {
        let kind = self.recording_kind("end_pass")?;
        profile_scope!("end_pass");

        let checked = self
            .debug
            .check_balanced()
            .and_then(|()| self.indirect.resolve(table));
        if let Err(err) = checked {
            self.abort("end_pass", err.clone());
            return Err(err);
        }

        let stream = std::mem::replace(&mut self.stream, CommandStream::new(kind, None)).freeze();
        self.state = PassState::Finished;
        log::debug!(
            "Finished {kind} pass {:?}: {} command(s), {} indirect reference(s)",
            self.label,
            stream.len(),
            self.indirect.len()
        );
        Ok(stream)
    }
}

static_assertions::assert_impl_all!(PassRecorder: Send);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorKind;
    use crate::resources::{ComputePipeline, PipelineLayout};

    fn compute_pipeline(table: &ResourceTable) -> Handle {
        table.allocate(Resource::ComputePipeline(Arc::new(ComputePipeline::new(
            None,
            PipelineLayout {
                bind_group_layouts: Vec::new(),
                push_constant_size: 8,
            },
        ))))
    }

    fn recording(kind: PassKind) -> PassRecorder {
        let mut recorder = PassRecorder::new(DeviceLimits::default());
        recorder.begin(kind, Some("test".into())).unwrap();
        recorder
    }

    #[test]
    fn test_begin_twice_fails() {
        let mut recorder = recording(PassKind::Compute);
        let err = recorder.begin(PassKind::Compute, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(matches!(recorder.state(), PassState::Recording(PassKind::Compute)));
    }

    #[test]
    fn test_idle_calls_fail_without_abort() {
        let mut recorder = PassRecorder::new(DeviceLimits::default());
        let err = recorder.dispatch_workgroups(1, 1, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(recorder.state(), PassState::Idle);
    }

    #[test]
    fn test_push_constants_bounds() {
        let table = ResourceTable::new();
        let pipeline = compute_pipeline(&table);
        let mut recorder = recording(PassKind::Compute);
        recorder.set_pipeline(&table, pipeline).unwrap();
        recorder
            .set_push_constants(ShaderStages::COMPUTE, 4, &[0; 4])
            .unwrap();
        assert_eq!(&recorder.bindings().push_constants()[4..8], &[0; 4]);

        let err = recorder
            .set_push_constants(ShaderStages::COMPUTE, 4, &[0; 8])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(recorder.state(), PassState::Aborted);
    }

    #[test]
    fn test_first_abort_cause_is_kept() {
        let mut recorder = recording(PassKind::Compute);
        let first = recorder.dispatch_workgroups(1, 1, 1).unwrap_err();
        let second = recorder.pop_debug_group().unwrap_err();

        assert_eq!(second.kind(), ErrorKind::InvalidState);
        assert_eq!(recorder.abort_cause(), Some(&first));
    }
}
