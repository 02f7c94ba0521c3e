//! Debug labels and query bookkeeping for one pass.

use gpubridge_core::Handle;

use crate::error::GraphicsError;

/// The pipeline-statistics query currently open in a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveQuery {
    pub query_set: Handle,
    pub index: u32,
}

/// Label stack, open query and marker count of a recording pass.
///
/// Groups must be popped in LIFO order and at most one statistics query can
/// be open at a time. Both must be closed before the pass ends.
#[derive(Debug, Default)]
pub struct DebugState {
    groups: Vec<String>,
    active_query: Option<ActiveQuery>,
    markers: u32,
}

impl DebugState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_group(&mut self, label: String) {
        self.groups.push(label);
    }

    pub fn pop_group(&mut self) -> Result<String, GraphicsError> {
        self.groups
            .pop()
            .ok_or_else(|| GraphicsError::Unbalanced("pop_debug_group with no open group".into()))
    }

    pub fn insert_marker(&mut self) {
        self.markers += 1;
    }

    /// Open debug groups, innermost last.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn depth(&self) -> usize {
        self.groups.len()
    }

    pub fn markers(&self) -> u32 {
        self.markers
    }

    pub fn active_query(&self) -> Option<ActiveQuery> {
        self.active_query
    }

    pub fn begin_query(&mut self, query_set: Handle, index: u32) -> Result<(), GraphicsError> {
        if let Some(active) = self.active_query {
            return Err(GraphicsError::OnlyOneActive {
                query_set: active.query_set,
                index: active.index,
            });
        }
        self.active_query = Some(ActiveQuery { query_set, index });
        Ok(())
    }

    pub fn end_query(&mut self) -> Result<ActiveQuery, GraphicsError> {
        self.active_query.take().ok_or_else(|| {
            GraphicsError::InvalidState("no pipeline statistics query is active".into())
        })
    }

    /// Fails if a group or query is still open.
    pub fn check_balanced(&self) -> Result<(), GraphicsError> {
        if let Some(label) = self.groups.last() {
            return Err(GraphicsError::Unbalanced(format!(
                "{} debug group(s) still open, innermost {label:?}",
                self.groups.len()
            )));
        }
        if let Some(active) = self.active_query {
            return Err(GraphicsError::Unbalanced(format!(
                "pipeline statistics query {} of {} was never ended",
                active.index, active.query_set
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_groups_are_lifo() {
        let mut debug = DebugState::new();
        debug.push_group("frame".into());
        debug.push_group("shadows".into());
        assert_eq!(debug.depth(), 2);
        assert!(debug.check_balanced().is_err());

        assert_eq!(debug.pop_group().unwrap(), "shadows");
        assert_eq!(debug.pop_group().unwrap(), "frame");
        assert_eq!(debug.pop_group().unwrap_err().kind(), ErrorKind::Unbalanced);
        assert!(debug.check_balanced().is_ok());
    }

    #[test]
    fn test_single_active_query() {
        let mut debug = DebugState::new();
        debug.begin_query(Handle::NULL, 0).unwrap();
        let err = debug.begin_query(Handle::NULL, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OnlyOneActive);
        assert_eq!(debug.check_balanced().unwrap_err().kind(), ErrorKind::Unbalanced);

        assert_eq!(debug.end_query().unwrap().index, 0);
        assert_eq!(debug.end_query().unwrap_err().kind(), ErrorKind::InvalidState);
    }
}
