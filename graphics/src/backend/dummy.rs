//! Dummy backend for testing and development.
//!
//! This backend doesn't talk to a device. It tallies the commands it is fed
//! so tests can check what a replay produced.

use crate::command::{Command, FrozenStream};

use super::CommandSink;

/// Tallies of everything a [`DummyBackend`] has executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DummyStats {
    pub commands: usize,
    pub draws: usize,
    pub dispatches: usize,
    pub debug_markers: usize,
    pub bundles: usize,
    pub push_constant_bytes: usize,
}

/// Dummy backend.
#[derive(Debug, Default)]
pub struct DummyBackend {
    stats: DummyStats,
    streams: usize,
}

impl DummyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    pub fn stats(&self) -> DummyStats {
        self.stats
    }

    /// Number of top-level streams submitted.
    pub fn submitted_streams(&self) -> usize {
        self.streams
    }

    /// Submit a top-level stream.
    pub fn submit(&mut self, stream: &FrozenStream) {
        log::trace!(
            "DummyBackend: submitting {} stream {:?} ({} commands)",
            stream.kind(),
            stream.label(),
            stream.len()
        );
        self.streams += 1;
        stream.replay(self);
    }

    pub fn reset(&mut self) {
        self.stats = DummyStats::default();
        self.streams = 0;
    }
}

impl CommandSink for DummyBackend {
    fn execute(&mut self, command: &Command, stream: &FrozenStream) {
        self.stats.commands += 1;
        match command {
            Command::PushDebugGroup(label) | Command::InsertDebugMarker(label) => {
                log::trace!("DummyBackend: debug label {label:?}");
                self.stats.debug_markers += 1;
            }
            Command::SetPushConstants { data, .. } => {
                self.stats.push_constant_bytes += stream.push_constant_data(data).len();
            }
            Command::ExecuteBundle { bundle, .. } => {
                log::trace!("DummyBackend: executing bundle {bundle}");
                self.stats.bundles += 1;
            }
            other if other.is_draw() => self.stats.draws += 1,
            other if other.is_dispatch() => self.stats.dispatches += 1,
            _ => {}
        }
    }
}
