//! Deferred validation of indirect argument buffers.
//!
//! Indirect calls only check what is knowable up front (handle kind and
//! offset alignment). The buffer's usage and the extent of the argument
//! records are checked when the pass finishes, against the buffer as it
//! exists then. A buffer freed in between fails the pass.

use gpubridge_core::Handle;

use crate::error::GraphicsError;
use crate::resources::{Resource, ResourceTable};
use crate::types::{BufferUsage, INDIRECT_COUNT_SIZE};

/// How many argument records an indirect command reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndirectCount {
    /// A single draw or dispatch.
    Single,
    /// A fixed multi-draw count.
    Fixed(u32),
    /// Count read from another buffer, clamped to `max_count`.
    Buffer {
        buffer: Handle,
        offset: u64,
        max_count: u32,
    },
}

impl IndirectCount {
    /// Upper bound on records read.
    pub fn max_records(&self) -> u64 {
        match *self {
            Self::Single => 1,
            Self::Fixed(count) => u64::from(count),
            Self::Buffer { max_count, .. } => u64::from(max_count),
        }
    }
}

/// One pending indirect reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndirectRef {
    /// Index of the command in the pass stream.
    pub command_index: usize,
    pub buffer: Handle,
    pub offset: u64,
    /// Size of one argument record.
    pub stride: u64,
    pub count: IndirectCount,
}

/// Collects indirect references while a pass records.
#[derive(Debug, Default)]
pub struct IndirectResolver {
    pending: Vec<IndirectRef>,
}

impl IndirectResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&mut self, reference: IndirectRef) {
        self.pending.push(reference);
    }

    pub fn pending(&self) -> &[IndirectRef] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Validate every pending reference against the table.
    ///
    /// Reports the first failure in recording order.
    pub fn resolve(&self, table: &ResourceTable) -> Result<(), GraphicsError> {
        gpubridge_core::profile_function!();

        for reference in &self.pending {
            let records = reference.count.max_records();
            let len = reference.stride.saturating_mul(records);
            check_buffer(table, reference, reference.buffer, reference.offset, len, "arguments")?;

            if let IndirectCount::Buffer { buffer, offset, .. } = reference.count {
                check_buffer(table, reference, buffer, offset, INDIRECT_COUNT_SIZE, "count")?;
            }
        }
        log::trace!("Resolved {} indirect reference(s)", self.pending.len());
        Ok(())
    }
}

fn check_buffer(
    table: &ResourceTable,
    reference: &IndirectRef,
    handle: Handle,
    offset: u64,
    len: u64,
    what: &str,
) -> Result<(), GraphicsError> {
    let at = reference.command_index;
    let buffer = match table.resolve(handle) {
        Ok(Resource::Buffer(buffer)) => buffer,
        Ok(_) | Err(_) => {
            return Err(GraphicsError::Device(format!(
                "indirect {what} buffer {handle} of command {at} no longer exists"
            )));
        }
    };
    if !buffer.usage().contains(BufferUsage::INDIRECT) {
        return Err(GraphicsError::Device(format!(
            "indirect {what} buffer {handle} of command {at} lacks INDIRECT usage (has {:?})",
            buffer.usage()
        )));
    }
    if !buffer.contains_range(offset, len) {
        return Err(GraphicsError::Device(format!(
            "indirect {what} of command {at} read {len} bytes at offset {offset}, past the end of {handle} ({} bytes)",
            buffer.size()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorKind;
    use crate::resources::Buffer;
    use crate::types::{BufferDescriptor, DrawIndirectArgs};

    fn buffer(table: &ResourceTable, size: u64, usage: BufferUsage) -> Handle {
        table.allocate(Resource::Buffer(Arc::new(Buffer::new(BufferDescriptor::new(size, usage)))))
    }

    fn draw_ref(buffer: Handle, offset: u64, count: IndirectCount) -> IndirectRef {
        IndirectRef {
            command_index: 0,
            buffer,
            offset,
            stride: DrawIndirectArgs::SIZE,
            count,
        }
    }

    #[test]
    fn test_resolves_valid_references() {
        let table = ResourceTable::new();
        let args = buffer(&table, 64, BufferUsage::INDIRECT);
        let count = buffer(&table, 4, BufferUsage::INDIRECT | BufferUsage::STORAGE);

        let mut resolver = IndirectResolver::new();
        resolver.defer(draw_ref(args, 0, IndirectCount::Fixed(4)));
        resolver.defer(draw_ref(
            args,
            16,
            IndirectCount::Buffer {
                buffer: count,
                offset: 0,
                max_count: 3,
            },
        ));
        assert_eq!(resolver.len(), 2);
        assert!(resolver.resolve(&table).is_ok());
    }

    #[test]
    fn test_missing_usage_is_device_error() {
        let table = ResourceTable::new();
        let args = buffer(&table, 64, BufferUsage::VERTEX);
        let mut resolver = IndirectResolver::new();
        resolver.defer(draw_ref(args, 0, IndirectCount::Single));

        let err = resolver.resolve(&table).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceError);
    }

    #[test]
    fn test_out_of_range_and_freed() {
        let table = ResourceTable::new();
        let args = buffer(&table, 32, BufferUsage::INDIRECT);

        let mut resolver = IndirectResolver::new();
        resolver.defer(draw_ref(args, 0, IndirectCount::Fixed(3)));
        assert_eq!(resolver.resolve(&table).unwrap_err().kind(), ErrorKind::DeviceError);

        let mut resolver = IndirectResolver::new();
        resolver.defer(draw_ref(args, 16, IndirectCount::Single));
        assert!(resolver.resolve(&table).is_ok());

        table.free(args).unwrap();
        assert_eq!(resolver.resolve(&table).unwrap_err().kind(), ErrorKind::DeviceError);
    }
}
