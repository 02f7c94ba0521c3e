//! Bound pipeline, bind groups and buffers of a recording pass.

use std::sync::Arc;

use gpubridge_core::Handle;

use crate::resources::{BindGroupLayout, ComputePipeline, PipelineLayout, RenderPipeline};
use crate::types::IndexFormat;

/// The pipeline currently bound in a pass.
#[derive(Debug, Clone)]
pub enum BoundPipeline {
    Compute(Arc<ComputePipeline>),
    Render(Arc<RenderPipeline>),
}

impl BoundPipeline {
    pub fn layout(&self) -> &PipelineLayout {
        match self {
            Self::Compute(pipeline) => pipeline.layout(),
            Self::Render(pipeline) => pipeline.layout(),
        }
    }

    /// Vertex buffer slots a draw needs; zero for compute pipelines.
    pub fn vertex_buffer_count(&self) -> u32 {
        match self {
            Self::Compute(_) => 0,
            Self::Render(pipeline) => pipeline.vertex_buffer_count(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoundBindGroup {
    pub handle: Handle,
    pub layout: Arc<BindGroupLayout>,
    pub dynamic_offsets: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBinding {
    pub buffer: Handle,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBinding {
    pub buffer: Handle,
    pub format: IndexFormat,
    pub offset: u64,
}

/// What is currently bound in a pass.
#[derive(Debug)]
pub struct BindingState {
    pipeline: Option<(Handle, BoundPipeline)>,
    bind_groups: Vec<Option<BoundBindGroup>>,
    vertex_buffers: Vec<Option<VertexBinding>>,
    index_buffer: Option<IndexBinding>,
    push_constants: Vec<u8>,
}

impl BindingState {
    pub fn new(bind_group_slots: u32, vertex_buffer_slots: u32) -> Self {
        Self {
            pipeline: None,
            bind_groups: vec![None; bind_group_slots as usize],
            vertex_buffers: vec![None; vertex_buffer_slots as usize],
            index_buffer: None,
            push_constants: Vec::new(),
        }
    }

    pub fn pipeline(&self) -> Option<&BoundPipeline> {
        self.pipeline.as_ref().map(|(_, pipeline)| pipeline)
    }

    pub fn pipeline_handle(&self) -> Option<Handle> {
        self.pipeline.as_ref().map(|(handle, _)| *handle)
    }

    /// Bind a pipeline, dropping bind groups its layout cannot use.
    ///
    /// Returns the slots that were cleared.
    pub fn set_pipeline(&mut self, handle: Handle, pipeline: BoundPipeline) -> Vec<u32> {
        let mut cleared = Vec::new();
        let layout = pipeline.layout();
        for (slot, bound) in self.bind_groups.iter_mut().enumerate() {
            let Some(group) = bound else {
                continue;
            };
            let compatible = layout
                .bind_group_layout(slot as u32)
                .is_some_and(|expected| expected.is_compatible(&group.layout));
            if !compatible {
                *bound = None;
                cleared.push(slot as u32);
            }
        }
        self.push_constants.resize(layout.push_constant_size as usize, 0);
        self.pipeline = Some((handle, pipeline));
        cleared
    }

    pub fn bind_group(&self, slot: u32) -> Option<&BoundBindGroup> {
        self.bind_groups.get(slot as usize).and_then(Option::as_ref)
    }

    pub fn set_bind_group(&mut self, slot: u32, group: BoundBindGroup) {
        if let Some(bound) = self.bind_groups.get_mut(slot as usize) {
            *bound = Some(group);
        }
    }

    pub fn vertex_buffer(&self, slot: u32) -> Option<&VertexBinding> {
        self.vertex_buffers.get(slot as usize).and_then(Option::as_ref)
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, binding: VertexBinding) {
        if let Some(bound) = self.vertex_buffers.get_mut(slot as usize) {
            *bound = Some(binding);
        }
    }

    /// First slot in `0..count` with no vertex buffer bound.
    pub fn missing_vertex_buffer(&self, count: u32) -> Option<u32> {
        (0..count).find(|slot| self.vertex_buffer(*slot).is_none())
    }

    pub fn index_buffer(&self) -> Option<&IndexBinding> {
        self.index_buffer.as_ref()
    }

    pub fn set_index_buffer(&mut self, binding: IndexBinding) {
        self.index_buffer = Some(binding);
    }

    /// Copy `data` into the staged push-constant range.
    pub fn write_push_constants(&mut self, offset: u32, data: &[u8]) {
        let start = offset as usize;
        if let Some(dst) = self.push_constants.get_mut(start..start + data.len()) {
            dst.copy_from_slice(data);
        }
    }

    pub fn push_constants(&self) -> &[u8] {
        &self.push_constants
    }

    /// Forget everything; used after executing bundles.
    pub fn reset(&mut self) {
        self.pipeline = None;
        self.bind_groups.iter_mut().for_each(|slot| *slot = None);
        self.vertex_buffers.iter_mut().for_each(|slot| *slot = None);
        self.index_buffer = None;
        self.push_constants.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BindGroupLayoutEntry, ShaderStages};

    fn layout(bindings: &[u32]) -> Arc<BindGroupLayout> {
        Arc::new(BindGroupLayout::new(
            None,
            bindings
                .iter()
                .map(|b| BindGroupLayoutEntry::uniform(*b, ShaderStages::COMPUTE))
                .collect(),
        ))
    }

    fn compute(layouts: Vec<Arc<BindGroupLayout>>) -> BoundPipeline {
        BoundPipeline::Compute(Arc::new(ComputePipeline::new(
            None,
            PipelineLayout {
                bind_group_layouts: layouts,
                push_constant_size: 16,
            },
        )))
    }

    #[test]
    fn test_set_pipeline_clears_incompatible_groups() {
        let a = layout(&[0]);
        let b = layout(&[0, 1]);
        let mut state = BindingState::new(4, 8);

        for (slot, layout) in [(0, &a), (1, &b), (2, &a)] {
            state.set_bind_group(
                slot,
                BoundBindGroup {
                    handle: Handle::NULL,
                    layout: layout.clone(),
                    dynamic_offsets: Vec::new(),
                },
            );
        }

        let cleared = state.set_pipeline(Handle::NULL, compute(vec![a.clone(), a.clone()]));
        assert_eq!(cleared, vec![1, 2]);
        assert!(state.bind_group(0).is_some());
        assert!(state.bind_group(1).is_none());
        assert_eq!(state.push_constants().len(), 16);
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut state = BindingState::new(4, 8);
        state.set_pipeline(Handle::NULL, compute(Vec::new()));
        state.set_vertex_buffer(
            0,
            VertexBinding {
                buffer: Handle::NULL,
                offset: 0,
            },
        );
        state.write_push_constants(4, &[1, 2, 3, 4]);
        assert_eq!(&state.push_constants()[4..8], &[1, 2, 3, 4]);

        state.reset();
        assert!(state.pipeline().is_none());
        assert_eq!(state.missing_vertex_buffer(1), Some(0));
        assert!(state.push_constants().is_empty());
    }
}
