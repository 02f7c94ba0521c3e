//! Shared fixtures for the recording integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use gpubridge_graphics::{
    BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor, BindGroupLayoutEntry,
    BufferDescriptor, BufferUsage, ComputePipelineDescriptor, Handle, QuerySetDescriptor,
    QueryType, RenderPipelineDescriptor, Runtime, RuntimeConfig, ShaderStages, Worker,
};

/// Route `log` output through the test harness. Safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A runtime, one worker and a small set of resources most tests need.
pub struct TestContext {
    pub runtime: Arc<Runtime>,
    pub worker: Worker,
    /// Bind group layout with a single uniform binding.
    pub layout: Handle,
    /// Bind group matching `layout`.
    pub bind_group: Handle,
    /// Compute pipeline with four `layout` slots and 16 bytes of push constants.
    pub compute_pipeline: Handle,
    /// Render pipeline with one `layout` slot and one vertex buffer.
    pub render_pipeline: Handle,
    /// 256 bytes, INDIRECT | STORAGE.
    pub indirect_buffer: Handle,
    /// 256 bytes, VERTEX only.
    pub vertex_buffer: Handle,
    /// 256 bytes, INDEX only.
    pub index_buffer: Handle,
    pub timestamps: Handle,
    pub statistics: Handle,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        init_logging();
        let runtime = Runtime::startup(config).expect("runtime startup");
        let worker = runtime.spawn_worker().expect("spawn worker");

        let layout = runtime
            .create_bind_group_layout(&BindGroupLayoutDescriptor::new(vec![
                BindGroupLayoutEntry::uniform(0, ShaderStages::VERTEX_FRAGMENT | ShaderStages::COMPUTE),
            ]))
            .expect("layout");
        let uniform = runtime
            .create_buffer(&BufferDescriptor::new(256, BufferUsage::UNIFORM).with_label("uniforms"))
            .expect("uniform buffer");
        let bind_group = runtime
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
                &ComputePipelineDescriptor::new(vec![layout; 4]).with_push_constants(16),
            )
            .expect("compute pipeline");
        let render_pipeline = runtime
            .create_render_pipeline(&RenderPipelineDescriptor::new(vec![layout]).with_vertex_buffers(1))
            .expect("render pipeline");

        let indirect_buffer = runtime
            .create_buffer(&BufferDescriptor::new(
                256,
                BufferUsage::INDIRECT | BufferUsage::STORAGE,
            ))
            .expect("indirect buffer");
        let vertex_buffer = runtime
            .create_buffer(&BufferDescriptor::new(256, BufferUsage::VERTEX))
            .expect("vertex buffer");
        let index_buffer = runtime
            .create_buffer(&BufferDescriptor::new(256, BufferUsage::INDEX))
            .expect("index buffer");

        let timestamps = runtime
            .create_query_set(&QuerySetDescriptor::new(QueryType::Timestamp, 8))
            .expect("timestamp queries");
        let statistics = runtime
            .create_query_set(&QuerySetDescriptor::new(QueryType::PipelineStatistics, 4))
            .expect("statistics queries");

        Self {
            runtime,
            worker,
            layout,
            bind_group,
            compute_pipeline,
            render_pipeline,
            indirect_buffer,
            vertex_buffer,
            index_buffer,
            timestamps,
            statistics,
        }
    }

    /// A compute pass with the compute pipeline already bound.
    pub fn compute_pass(&self) -> Handle {
        let pass = self.worker.begin_compute_pass(Some("compute")).unwrap();
        let pipeline = self.compute_pipeline;
        self.worker
            .record(pass, |rec, table| rec.set_pipeline(table, pipeline))
            .unwrap();
        pass
    }

    /// A render pass with the render pipeline and its vertex buffer bound.
    pub fn render_pass(&self) -> Handle {
        let pass = self.worker.begin_render_pass(Some("render")).unwrap();
        self.bind_render_state(pass);
        pass
    }

    pub fn bind_render_state(&self, pass: Handle) {
        let (pipeline, vertex) = (self.render_pipeline, self.vertex_buffer);
        self.worker
            .record(pass, |rec, table| {
                rec.set_pipeline(table, pipeline)?;
                rec.set_vertex_buffer(table, 0, vertex, 0)
            })
            .unwrap();
    }

    pub fn create_buffer(&self, size: u64, usage: BufferUsage) -> Handle {
        self.runtime
            .create_buffer(&BufferDescriptor::new(size, usage))
            .unwrap()
    }
}
