//! Backend abstraction.
//!
//! Executing recorded work on a real device is outside this crate. A backend
//! only has to implement [`CommandSink`], which receives each frozen command
//! in order when a stream is submitted or replayed.
//!
//! # Available Backends
//!
//! - [`DummyBackend`]: counts and logs what it receives, for tests and
//!   headless runs

pub mod dummy;

pub use dummy::{DummyBackend, DummyStats};

use crate::command::{Command, FrozenStream};

/// Receives replayed commands.
///
/// `stream` is the stream that owns `command`; use it to look up payloads
/// such as push-constant bytes.
pub trait CommandSink {
    fn execute(&mut self, command: &Command, stream: &FrozenStream);
}
