//! Plain value types and descriptors.
//!
//! This module contains usage flags, formats, fixed-function state values
//! and the descriptor structs passed to resource creation.

mod buffer;
mod common;
mod layout;
mod query;

pub use buffer::{
    BufferDescriptor, BufferUsage, DispatchIndirectArgs, DrawIndexedIndirectArgs,
    DrawIndirectArgs, INDIRECT_COUNT_SIZE, IndexFormat,
};
pub use common::{Color, ScissorRect, Viewport};
pub use layout::{
    BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor, BindGroupLayoutEntry,
    BindingType, ComputePipelineDescriptor, RenderPipelineDescriptor, ShaderStages,
};
pub use query::{QueryType, QuerySetDescriptor};
