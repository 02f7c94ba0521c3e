//! Bind group layouts, bind groups and pipelines.
//!
//! Layouts are compared structurally: two bind group layouts created from
//! equal descriptors are interchangeable.

use std::sync::Arc;

use gpubridge_core::Handle;

use crate::types::BindGroupLayoutEntry;

/// The shape of one bind group slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindGroupLayout {
    label: Option<String>,
    entries: Vec<BindGroupLayoutEntry>,
}

impl BindGroupLayout {
    pub(crate) fn new(label: Option<String>, mut entries: Vec<BindGroupLayoutEntry>) -> Self {
        entries.sort_by_key(|entry| entry.binding);
        Self { label, entries }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn entries(&self) -> &[BindGroupLayoutEntry] {
        &self.entries
    }

    pub fn entry(&self, binding: u32) -> Option<&BindGroupLayoutEntry> {
        self.entries
            .binary_search_by_key(&binding, |entry| entry.binding)
            .ok()
            .map(|index| &self.entries[index])
    }

    /// Number of dynamic offsets `set_bind_group` must supply for this layout.
    pub fn dynamic_offset_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.has_dynamic_offset)
            .count()
    }

    /// Structural equality, ignoring labels.
    pub fn is_compatible(&self, other: &BindGroupLayout) -> bool {
        self.entries == other.entries
    }
}

/// A set of resources matching a [`BindGroupLayout`].
#[derive(Debug)]
pub struct BindGroup {
    label: Option<String>,
    layout: Arc<BindGroupLayout>,
    resources: Vec<(u32, Handle)>,
}

impl BindGroup {
    pub(crate) fn new(
        label: Option<String>,
        layout: Arc<BindGroupLayout>,
        resources: Vec<(u32, Handle)>,
    ) -> Self {
        Self {
            label,
            layout,
            resources,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn layout(&self) -> &Arc<BindGroupLayout> {
        &self.layout
    }

    /// `(binding, resource)` pairs in creation order.
    pub fn resources(&self) -> &[(u32, Handle)] {
        &self.resources
    }
}

/// Bind group layouts and push-constant range shared by both pipeline kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayout {
    pub bind_group_layouts: Vec<Arc<BindGroupLayout>>,
    pub push_constant_size: u32,
}

impl PipelineLayout {
    /// Number of bind group slots the pipeline declares.
    pub fn bind_group_count(&self) -> u32 {
        self.bind_group_layouts.len() as u32
    }

    pub fn bind_group_layout(&self, slot: u32) -> Option<&Arc<BindGroupLayout>> {
        self.bind_group_layouts.get(slot as usize)
    }
}

#[derive(Debug)]
pub struct ComputePipeline {
    label: Option<String>,
    layout: PipelineLayout,
}

impl ComputePipeline {
    pub(crate) fn new(label: Option<String>, layout: PipelineLayout) -> Self {
        Self { label, layout }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }
}

#[derive(Debug)]
pub struct RenderPipeline {
    label: Option<String>,
    layout: PipelineLayout,
    vertex_buffer_count: u32,
}

impl RenderPipeline {
    pub(crate) fn new(label: Option<String>, layout: PipelineLayout, vertex_buffer_count: u32) -> Self {
        Self {
            label,
            layout,
            vertex_buffer_count,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }

    /// Vertex buffer slots that must be bound before a draw.
    pub fn vertex_buffer_count(&self) -> u32 {
        self.vertex_buffer_count
    }
}

static_assertions::assert_impl_all!(BindGroup: Send, Sync);
static_assertions::assert_impl_all!(ComputePipeline: Send, Sync);
static_assertions::assert_impl_all!(RenderPipeline: Send, Sync);
