//! # gpubridge app
//!
//! The flat numeric call surface over the gpubridge runtime, plus a stress
//! harness that drives it from many threads.
//!
//! ## Overview
//!
//! - [`ThreadContext`] - one worker's flat calls: raw `u64` handles, numeric
//!   arguments, `(ptr, len)` pairs into the shared arena
//! - [`Status`] - the numeric result code of every call
//! - [`App`] - logging bootstrap and the stress workload
//! - [`StressArgs`] - command line arguments of the stress binary
//!
//! ## Example
//!
//! ```ignore
//! use gpubridge_app::{Status, ThreadContext};
//! use gpubridge_graphics::{Runtime, RuntimeConfig};
//!
//! let runtime = Runtime::startup(RuntimeConfig::default())?;
//! let ctx = ThreadContext::attach(&runtime)?;
//!
//! let pass = ctx.begin_compute_pass(0, 0);
//! assert_eq!(ctx.compute_pass_pop_debug_group(pass), Status::Unbalanced);
//! assert_eq!(ctx.end_pass(pass), Status::InvalidState);
//! ```

mod app;
mod args;
mod context;
mod error;
mod status;

pub use app::{App, StressReport};
pub use args::StressArgs;
pub use context::{DEFAULT_ALIGN, ThreadContext, thread_destroy};
pub use error::AppError;
pub use status::Status;

/// App library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the app subsystem.
///
/// This should be called after logging is installed.
pub fn init() {
    log::info!("gpubridge app v{} initialized", VERSION);
}
