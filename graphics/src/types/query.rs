//! Query set types.

/// What a query set records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    /// GPU timestamps written at a point in the pass.
    Timestamp,
    /// Pipeline statistics accumulated between begin and end.
    PipelineStatistics,
}

impl QueryType {
    /// Decode the numeric tag used at the call boundary.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Timestamp),
            1 => Some(Self::PipelineStatistics),
            _ => None,
        }
    }
}

/// Descriptor for creating a query set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuerySetDescriptor {
    pub label: Option<String>,
    pub ty: QueryType,
    /// Number of queries in the set.
    pub count: u32,
}

impl QuerySetDescriptor {
    pub fn new(ty: QueryType, count: u32) -> Self {
        Self {
            label: None,
            ty,
            count,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
