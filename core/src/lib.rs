//! # gpubridge core
//!
//! Process-wide building blocks shared by every worker context:
//!
//! - [`handle`] - generational handles and the table that hands them out
//! - [`arena`] - the shared byte arena that carries labels and arrays across
//!   the numeric call boundary
//! - [`profiling`] - optional Tracy instrumentation macros

pub mod arena;
pub mod handle;
pub mod profiling;

pub use arena::{ArenaAllocator, ArenaError, ArenaPtr, FreeListAllocator, SharedArena};
pub use handle::{Handle, HandleError, HandleTable};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the core version once at bootstrap.
pub fn init() {
    log::info!("gpubridge core v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
