//! Fixtures for the flat call surface tests.

#![allow(dead_code)]

use std::sync::Arc;

use gpubridge_app::ThreadContext;
use gpubridge_graphics::{
    BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor, BindGroupLayoutEntry,
    BufferDescriptor, BufferUsage, ComputePipelineDescriptor, QuerySetDescriptor, QueryType,
    RenderPipelineDescriptor, Runtime, RuntimeConfig, ShaderStages,
};

/// Route `log` output through the test harness. Safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A runtime, one attached context and raw handles for common resources.
pub struct FlatFixture {
    pub runtime: Arc<Runtime>,
    pub ctx: ThreadContext,
    /// Bind group whose single uniform binding takes a dynamic offset.
    pub dynamic_group: u64,
    /// Compute pipeline with two dynamic-group slots and 16 bytes of push constants.
    pub compute_pipeline: u64,
    /// Render pipeline with no bind groups and one vertex buffer.
    pub render_pipeline: u64,
    /// 256 bytes, INDIRECT.
    pub indirect_buffer: u64,
    /// 256 bytes, VERTEX.
    pub vertex_buffer: u64,
    /// 8 pipeline statistics queries.
    pub statistics: u64,
}

impl FlatFixture {
    pub fn new() -> Self {
        init_logging();
        let runtime = Runtime::startup(RuntimeConfig::default()).expect("runtime startup");
        let ctx = ThreadContext::attach(&runtime).expect("attach");

        let layout = runtime
            .create_bind_group_layout(&BindGroupLayoutDescriptor::new(vec![
                BindGroupLayoutEntry::uniform(0, ShaderStages::COMPUTE).with_dynamic_offset(),
            ]))
            .expect("layout");
        let uniform = runtime
            .create_buffer(&BufferDescriptor::new(1024, BufferUsage::UNIFORM))
            .expect("uniform buffer");
        let dynamic_group = runtime
            .create_bind_group(&BindGroupDescriptor::new(
                layout,
                vec![BindGroupEntry {
                    binding: 0,
                    resource: uniform,
                }],
            ))
            .expect("bind group");
        let compute_pipeline = runtime
            .create_compute_pipeline(
                &ComputePipelineDescriptor::new(vec![layout; 2]).with_push_constants(16),
            )
            .expect("compute pipeline");
        let render_pipeline = runtime
            .create_render_pipeline(&RenderPipelineDescriptor::new(Vec::new()).with_vertex_buffers(1))
            .expect("render pipeline");
        let indirect_buffer = runtime
            .create_buffer(&BufferDescriptor::new(256, BufferUsage::INDIRECT))
            .expect("indirect buffer");
        let vertex_buffer = runtime
            .create_buffer(&BufferDescriptor::new(256, BufferUsage::VERTEX))
            .expect("vertex buffer");
        let statistics = runtime
            .create_query_set(&QuerySetDescriptor::new(QueryType::PipelineStatistics, 8))
            .expect("query set");

        Self {
            runtime,
            ctx,
            dynamic_group: dynamic_group.to_raw(),
            compute_pipeline: compute_pipeline.to_raw(),
            render_pipeline: render_pipeline.to_raw(),
            indirect_buffer: indirect_buffer.to_raw(),
            vertex_buffer: vertex_buffer.to_raw(),
            statistics: statistics.to_raw(),
        }
    }

    /// Stage a string in the arena, returning `(ptr, len)`.
    pub fn stage_str(&self, text: &str) -> (u32, u32) {
        let ptr = self.ctx.stage(text.as_bytes());
        assert_ne!(ptr, 0, "staging {text:?} failed: {}", self.ctx.last_status());
        (ptr, text.len() as u32)
    }

    /// Stage little-endian `u32`s, returning `(ptr, count)`.
    pub fn stage_u32s(&self, values: &[u32]) -> (u32, u32) {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let ptr = self.ctx.stage(&bytes);
        assert_ne!(ptr, 0);
        (ptr, values.len() as u32)
    }

    /// Stage raw handles, returning `(ptr, count)`.
    pub fn stage_handles(&self, handles: &[u64]) -> (u32, u32) {
        let bytes: Vec<u8> = handles.iter().flat_map(|h| h.to_le_bytes()).collect();
        let ptr = self.ctx.stage(&bytes);
        assert_ne!(ptr, 0);
        (ptr, handles.len() as u32)
    }

    /// A compute pass with the fixture pipeline bound.
    pub fn compute_pass(&self) -> u64 {
        let pass = self.ctx.begin_compute_pass(0, 0);
        assert_ne!(pass, 0);
        assert!(self.ctx.compute_pass_set_pipeline(pass, self.compute_pipeline).is_ok());
        pass
    }

    /// A finished one-draw bundle.
    pub fn finished_bundle(&self) -> u64 {
        let bundle = self.ctx.begin_render_bundle(0, 0);
        assert!(self.ctx.render_bundle_set_pipeline(bundle, self.render_pipeline).is_ok());
        assert!(
            self.ctx
                .render_bundle_set_vertex_buffer(bundle, 0, self.vertex_buffer, 0)
                .is_ok()
        );
        assert!(self.ctx.render_bundle_draw(bundle, 3, 1, 0, 0).is_ok());
        assert!(self.ctx.end_pass(bundle).is_ok());
        bundle
    }
}
