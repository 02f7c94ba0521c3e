//! Command line arguments for the stress harness.
//!
//! Uses clap on native targets; on WASM the defaults are used.

use std::path::PathBuf;

/// Workload shape for a stress run.
#[derive(Debug, Clone, PartialEq)]
pub struct StressArgs {
    workers: usize,
    passes: u32,
    dispatches: u32,
    bundles: bool,
    fault_every: Option<u32>,
    config: Option<PathBuf>,
    arena_size: Option<u32>,
}

impl Default for StressArgs {
    fn default() -> Self {
        Self {
            workers: 4,
            passes: 64,
            dispatches: 16,
            bundles: true,
            fault_every: None,
            config: None,
            arena_size: None,
        }
    }
}

impl StressArgs {
    /// Parse the process arguments.
    pub fn parse() -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        {
            use clap::Parser;
            native::ClapArgs::parse().into()
        }

        #[cfg(target_arch = "wasm32")]
        {
            Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_passes(mut self, passes: u32) -> Self {
        self.passes = passes;
        self
    }

    pub fn with_dispatches(mut self, dispatches: u32) -> Self {
        self.dispatches = dispatches;
        self
    }

    pub fn with_bundles(mut self, bundles: bool) -> Self {
        self.bundles = bundles;
        self
    }

    /// Record a deliberately invalid call in every `n`th pass.
    pub fn with_fault_every(mut self, n: u32) -> Self {
        self.fault_every = Some(n);
        self
    }

    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }

    pub fn with_arena_size(mut self, size: u32) -> Self {
        self.arena_size = Some(size);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Passes recorded by each worker.
    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Direct dispatches per compute pass.
    pub fn dispatches(&self) -> u32 {
        self.dispatches
    }

    pub fn bundles(&self) -> bool {
        self.bundles
    }

    pub fn fault_every(&self) -> Option<u32> {
        self.fault_every.filter(|n| *n > 0)
    }

    pub fn config(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }

    pub fn arena_size(&self) -> Option<u32> {
        self.arena_size
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use super::*;
    use clap::Parser;

    /// gpubridge stress harness arguments.
    #[derive(Parser, Debug)]
    #[command(
        name = "gpubridge-stress",
        about = "Record, validate and replay passes from many worker threads",
        long_about = "Spawns worker threads that record compute passes, render passes and \
            render bundles through the flat call surface, replays every finished pass \
            into the dummy backend and tears the runtime down.\n\n\
            EXAMPLES:\n\
              # Eight workers, 1000 passes each\n\
              gpubridge-stress --workers 8 --passes 1000\n\
            \n\
              # Abort every tenth pass on purpose\n\
              gpubridge-stress --fault-every 10\n\
            \n\
              # Load limits from a TOML file\n\
              gpubridge-stress --config runtime.toml",
        version
    )]
    pub(super) struct ClapArgs {
        /// Number of worker threads.
        #[arg(long, default_value = "4")]
        pub workers: usize,

        /// Passes recorded by each worker.
        #[arg(long, default_value = "64")]
        pub passes: u32,

        /// Direct dispatches per compute pass.
        #[arg(long, default_value = "16")]
        pub dispatches: u32,

        /// Skip render bundles.
        #[arg(long)]
        pub no_bundles: bool,

        /// Record an invalid call in every Nth pass.
        #[arg(long)]
        pub fault_every: Option<u32>,

        /// Runtime configuration file (TOML).
        #[arg(long)]
        pub config: Option<PathBuf>,

        /// Shared arena size in bytes; overrides the config file.
        #[arg(long)]
        pub arena_size: Option<u32>,
    }

    impl From<ClapArgs> for StressArgs {
        fn from(args: ClapArgs) -> Self {
            if args.fault_every == Some(0) {
                log::warn!("--fault-every 0 disables fault injection");
            }
            Self {
                workers: args.workers,
                passes: args.passes,
                dispatches: args.dispatches,
                bundles: !args.no_bundles,
                fault_every: args.fault_every,
                config: args.config,
                arena_size: args.arena_size,
            }
        }
    }

}
