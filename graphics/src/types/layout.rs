//! Binding layouts and pipeline descriptors.
//!
//! Descriptors reference other resources by [`Handle`]; the runtime resolves
//! them when the resource is created.

use bitflags::bitflags;
use gpubridge_core::Handle;

bitflags! {
    /// Shader stages a binding or push-constant range is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const VERTEX_FRAGMENT = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

/// What a single binding slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    UniformBuffer,
    StorageBuffer { read_only: bool },
    Texture,
    Sampler,
}

impl BindingType {
    /// Whether a bind group entry for this binding must be a buffer.
    pub fn is_buffer(&self) -> bool {
        matches!(self, Self::UniformBuffer | Self::StorageBuffer { .. })
    }
}

/// One entry of a bind group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStages,
    pub ty: BindingType,
    /// The binding takes a dynamic offset at `set_bind_group` time.
    pub has_dynamic_offset: bool,
}

impl BindGroupLayoutEntry {
    pub fn uniform(binding: u32, visibility: ShaderStages) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::UniformBuffer,
            has_dynamic_offset: false,
        }
    }

    pub fn storage(binding: u32, visibility: ShaderStages, read_only: bool) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::StorageBuffer { read_only },
            has_dynamic_offset: false,
        }
    }

    pub fn with_dynamic_offset(mut self) -> Self {
        self.has_dynamic_offset = true;
        self
    }
}

/// Descriptor for creating a bind group layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BindGroupLayoutDescriptor {
    pub label: Option<String>,
    pub entries: Vec<BindGroupLayoutEntry>,
}

impl BindGroupLayoutDescriptor {
    pub fn new(entries: Vec<BindGroupLayoutEntry>) -> Self {
        Self {
            label: None,
            entries,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Binds a resource to one slot of a bind group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub resource: Handle,
}

/// Descriptor for creating a bind group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindGroupDescriptor {
    pub label: Option<String>,
    /// Handle of a bind group layout.
    pub layout: Handle,
    pub entries: Vec<BindGroupEntry>,
}

impl BindGroupDescriptor {
    pub fn new(layout: Handle, entries: Vec<BindGroupEntry>) -> Self {
        Self {
            label: None,
            layout,
            entries,
        }
    }
}

/// Descriptor for creating a compute pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ComputePipelineDescriptor {
    pub label: Option<String>,
    /// Bind group layout handles, one per slot.
    pub bind_group_layouts: Vec<Handle>,
    /// Size of the push-constant range in bytes.
    pub push_constant_size: u32,
}

impl ComputePipelineDescriptor {
    pub fn new(bind_group_layouts: Vec<Handle>) -> Self {
        Self {
            label: None,
            bind_group_layouts,
            push_constant_size: 0,
        }
    }

    pub fn with_push_constants(mut self, size: u32) -> Self {
        self.push_constant_size = size;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Descriptor for creating a render pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderPipelineDescriptor {
    pub label: Option<String>,
    pub bind_group_layouts: Vec<Handle>,
    pub push_constant_size: u32,
    /// Number of vertex buffer slots the pipeline reads.
    pub vertex_buffer_count: u32,
}

impl RenderPipelineDescriptor {
    pub fn new(bind_group_layouts: Vec<Handle>) -> Self {
        Self {
            label: None,
            bind_group_layouts,
            push_constant_size: 0,
            vertex_buffer_count: 0,
        }
    }

    pub fn with_vertex_buffers(mut self, count: u32) -> Self {
        self.vertex_buffer_count = count;
        self
    }

    pub fn with_push_constants(mut self, size: u32) -> Self {
        self.push_constant_size = size;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
