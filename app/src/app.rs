//! Stress harness.
//!
//! [`App`] boots logging and the runtime, then drives a workload through
//! [`ThreadContext`] from many threads at once and replays every finished
//! pass into the dummy backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gpubridge_graphics::{
    BufferDescriptor, BufferUsage, ComputePipelineDescriptor, DispatchIndirectArgs, DummyBackend,
    DummyStats, Handle, RenderPipelineDescriptor, Runtime, RuntimeConfig,
};
use parking_lot::Mutex;

use crate::args::StressArgs;
use crate::context::{ThreadContext, thread_destroy};
use crate::error::{AppError, check, check_value};
use crate::status::Status;

/// Indirect dispatch records kept in the shared argument buffer.
const INDIRECT_RECORDS: u64 = 16;

/// Totals gathered from a stress run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StressReport {
    pub workers: usize,
    pub passes_finished: u64,
    pub passes_aborted: u64,
    pub bundles: u64,
    pub commands: usize,
    pub draws: usize,
    pub dispatches: usize,
    pub debug_markers: usize,
    pub handles_released: usize,
    pub elapsed: Duration,
}

impl StressReport {
    fn absorb(&mut self, worker: WorkerTally) {
        self.passes_finished += worker.finished;
        self.passes_aborted += worker.aborted;
        self.bundles += worker.bundles;
        self.commands += worker.stats.commands;
        self.draws += worker.stats.draws;
        self.dispatches += worker.stats.dispatches;
        self.debug_markers += worker.stats.debug_markers;
    }
}

#[derive(Debug, Default)]
struct WorkerTally {
    finished: u64,
    aborted: u64,
    bundles: u64,
    stats: DummyStats,
}

/// Handles every worker shares.
#[derive(Debug, Clone, Copy)]
struct SharedResources {
    compute_pipeline: u64,
    render_pipeline: u64,
    indirect_args: u64,
}

/// Stress harness entry points.
pub struct App;

impl App {
    /// Install the platform logger.
    ///
    /// Native builds use `env_logger` with `info` as the default filter;
    /// WASM builds log to the browser console.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn init_logging() {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    #[cfg(target_arch = "wasm32")]
    pub fn init_logging() {
        console_error_panic_hook::set_once();
        // A logger installed by the embedder stays in place.
        let _ = console_log::init_with_level(log::Level::Info);
    }

    /// Logging, runtime startup, the workload and teardown in one call.
    pub fn run(args: StressArgs) -> Result<StressReport, AppError> {
        Self::init_logging();
        gpubridge_graphics::init();
        crate::init();

        let runtime = Runtime::startup(Self::load_config(&args)?)?;
        Self::run_stress(&runtime, &args)
    }

    /// Build the runtime configuration from the arguments.
    pub fn load_config(args: &StressArgs) -> Result<RuntimeConfig, AppError> {
        let mut config = match args.config() {
            Some(path) => RuntimeConfig::load(path)?,
            None => RuntimeConfig::default(),
        };
        if let Some(size) = args.arena_size() {
            config = config.with_arena_size(size);
        }
        let needed = args.workers();
        if needed > config.max_workers as usize {
            log::warn!(
                "Raising max_workers from {} to {needed} for this run",
                config.max_workers
            );
            config = config.with_max_workers(needed as u32);
        }
        Ok(config)
    }

    /// Run the workload against `runtime` and tear it down afterwards.
    pub fn run_stress(runtime: &Arc<Runtime>, args: &StressArgs) -> Result<StressReport, AppError> {
        let started = Instant::now();
        let shared = Self::create_shared(runtime)?;
        let report = Mutex::new(StressReport {
            workers: args.workers(),
            ..Default::default()
        });

        let retired = std::thread::scope(|scope| {
            let mut joins = Vec::with_capacity(args.workers());
            for _ in 0..args.workers() {
                let ctx = ThreadContext::attach(runtime)?;
                let report = &report;
                joins.push(scope.spawn(move || -> Result<(u32, u32), AppError> {
                    gpubridge_core::set_thread_name!("stress-worker");
                    let tally = Self::drive_worker(&ctx, shared, args)?;
                    report.lock().absorb(tally);
                    Ok((ctx.worker_id(), ctx.local_storage()))
                }));
            }

            let mut retired = Vec::with_capacity(joins.len());
            for join in joins {
                retired.push(join.join().map_err(|_| AppError::WorkerPanicked)??);
            }
            Ok::<_, AppError>(retired)
        })?;

        // Workers are retired from this thread by id, after their contexts
        // are gone.
        for (worker_id, local_storage) in retired {
            check("thread_destroy", thread_destroy(runtime, worker_id, local_storage))?;
        }

        let mut report = report.into_inner();
        report.handles_released = runtime.teardown()?;
        report.elapsed = started.elapsed();
        log::info!(
            "Stress run finished: {} pass(es), {} aborted, {} bundle(s), {} command(s) in {:?}",
            report.passes_finished,
            report.passes_aborted,
            report.bundles,
            report.commands,
            report.elapsed
        );
        Ok(report)
    }

    fn create_shared(runtime: &Runtime) -> Result<SharedResources, AppError> {
        let compute_pipeline = runtime.create_compute_pipeline(
            &ComputePipelineDescriptor::new(Vec::new()).with_label("stress-compute"),
        )?;
        let render_pipeline = runtime.create_render_pipeline(
            &RenderPipelineDescriptor::new(Vec::new()).with_label("stress-render"),
        )?;
        let indirect_args = runtime.create_buffer(
            &BufferDescriptor::new(
                INDIRECT_RECORDS * DispatchIndirectArgs::SIZE,
                BufferUsage::INDIRECT | BufferUsage::STORAGE,
            )
            .with_label("stress-indirect-args"),
        )?;
        Ok(SharedResources {
            compute_pipeline: compute_pipeline.to_raw(),
            render_pipeline: render_pipeline.to_raw(),
            indirect_args: indirect_args.to_raw(),
        })
    }

    fn drive_worker(
        ctx: &ThreadContext,
        shared: SharedResources,
        args: &StressArgs,
    ) -> Result<WorkerTally, AppError> {
        let label = b"stress";
        let label_ptr = check_value("stage", ctx.stage(label), ctx.last_status())?;
        let label_len = label.len() as u32;

        let mut tally = WorkerTally::default();
        let mut backend = DummyBackend::new();

        for i in 0..args.passes() {
            let faulty = args.fault_every().is_some_and(|n| i % n == n - 1);
            if Self::compute_pass(ctx, shared, args, &mut backend, i, faulty, (label_ptr, label_len))? {
                tally.finished += 1;
            } else {
                tally.aborted += 1;
            }

            if args.bundles() && i % 4 == 0 {
                Self::bundled_render_pass(ctx, shared, &mut backend)?;
                tally.finished += 2;
                tally.bundles += 1;
            }
        }

        check("free_bytes", ctx.free_bytes(label_ptr, label_len, 0))?;
        tally.stats = backend.stats();
        log::debug!(
            "worker#{} recorded {} pass(es), {} aborted",
            ctx.worker_id(),
            tally.finished,
            tally.aborted
        );
        Ok(tally)
    }

    /// Record, end, submit and free one compute pass. Returns `false` if the
    /// pass was aborted by an injected fault.
    fn compute_pass(
        ctx: &ThreadContext,
        shared: SharedResources,
        args: &StressArgs,
        backend: &mut DummyBackend,
        index: u32,
        faulty: bool,
        (label_ptr, label_len): (u32, u32),
    ) -> Result<bool, AppError> {
        let pass = ctx.begin_compute_pass(label_ptr, label_len);
        let pass = check_value("begin_compute_pass", pass, ctx.last_status())?;

        check(
            "compute_pass_set_pipeline",
            ctx.compute_pass_set_pipeline(pass, shared.compute_pipeline),
        )?;
        check(
            "compute_pass_push_debug_group",
            ctx.compute_pass_push_debug_group(pass, label_ptr, label_len),
        )?;
        for d in 0..args.dispatches() {
            check(
                "compute_pass_dispatch_workgroups",
                ctx.compute_pass_dispatch_workgroups(pass, d % 64 + 1, 1, 1),
            )?;
        }
        let offset = u64::from(index) % INDIRECT_RECORDS * DispatchIndirectArgs::SIZE;
        check(
            "compute_pass_dispatch_workgroups_indirect",
            ctx.compute_pass_dispatch_workgroups_indirect(pass, shared.indirect_args, offset),
        )?;
        check(
            "compute_pass_pop_debug_group",
            ctx.compute_pass_pop_debug_group(pass),
        )?;

        if faulty {
            // A second pop has no group to close and aborts the pass.
            let status = ctx.compute_pass_pop_debug_group(pass);
            if status != Status::Unbalanced {
                return Err(AppError::Call {
                    call: "compute_pass_pop_debug_group",
                    status,
                });
            }
            let status = ctx.end_pass(pass);
            if status != Status::InvalidState {
                return Err(AppError::Call {
                    call: "end_pass",
                    status,
                });
            }
            check("free", ctx.free(pass))?;
            return Ok(false);
        }

        check("end_pass", ctx.end_pass(pass))?;
        ctx.runtime().submit(Handle::from_raw(pass), backend)?;
        check("free", ctx.free(pass))?;
        Ok(true)
    }

    /// Record a one-draw bundle, execute it from a render pass, submit the
    /// render pass and free both.
    fn bundled_render_pass(
        ctx: &ThreadContext,
        shared: SharedResources,
        backend: &mut DummyBackend,
    ) -> Result<(), AppError> {
        let bundle = ctx.begin_render_bundle(0, 0);
        let bundle = check_value("begin_render_bundle", bundle, ctx.last_status())?;
        check(
            "render_bundle_set_pipeline",
            ctx.render_bundle_set_pipeline(bundle, shared.render_pipeline),
        )?;
        check("render_bundle_draw", ctx.render_bundle_draw(bundle, 3, 1, 0, 0))?;
        check("end_pass", ctx.end_pass(bundle))?;

        let bundles_ptr = ctx.stage(&bundle.to_le_bytes());
        let bundles_ptr = check_value("stage", bundles_ptr, ctx.last_status())?;

        let pass = ctx.begin_render_pass(0, 0);
        let pass = check_value("begin_render_pass", pass, ctx.last_status())?;
        check(
            "render_pass_set_pipeline",
            ctx.render_pass_set_pipeline(pass, shared.render_pipeline),
        )?;
        check("render_pass_draw", ctx.render_pass_draw(pass, 6, 1, 0, 0))?;
        check(
            "render_pass_execute_bundles",
            ctx.render_pass_execute_bundles(pass, bundles_ptr, 1),
        )?;
        check("end_pass", ctx.end_pass(pass))?;
        check("free_bytes", ctx.free_bytes(bundles_ptr, 8, 0))?;

        ctx.runtime().submit(Handle::from_raw(pass), backend)?;
        check("free", ctx.free(pass))?;
        check("free", ctx.free(bundle))?;
        Ok(())
    }
}
