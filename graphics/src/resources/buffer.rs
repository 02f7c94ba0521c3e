//! Buffer resource.

use crate::types::{BufferDescriptor, BufferUsage};

/// A buffer registered in the handle table.
///
/// Buffers are created by [`Runtime::create_buffer`](crate::Runtime::create_buffer)
/// and shared through [`Resource::Buffer`](super::Resource::Buffer).
pub struct Buffer {
    descriptor: BufferDescriptor,
}

impl Buffer {
    pub(crate) fn new(descriptor: BufferDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Whether `offset..offset + len` lies inside the buffer.
    pub fn contains_range(&self, offset: u64, len: u64) -> bool {
        offset
            .checked_add(len)
            .is_some_and(|end| end <= self.descriptor.size)
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Buffer: Send, Sync);
