//! Query set resource.

use crate::types::{QuerySetDescriptor, QueryType};

#[derive(Debug)]
pub struct QuerySet {
    descriptor: QuerySetDescriptor,
}

impl QuerySet {
    pub(crate) fn new(descriptor: QuerySetDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn ty(&self) -> QueryType {
        self.descriptor.ty
    }

    pub fn count(&self) -> u32 {
        self.descriptor.count
    }

    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }
}
