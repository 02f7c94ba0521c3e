//! Multi-worker tests.
//!
//! Workers are moved onto scoped threads; the runtime is shared by `Arc`.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use rstest::rstest;

use common::{TestContext, init_logging};
use gpubridge_graphics::{
    BufferDescriptor, BufferUsage, ComputePipelineDescriptor, DummyBackend, ErrorKind, Handle,
    Resource, Runtime, RuntimeConfig,
};

#[rstest]
#[case::few_workers(2, 1000)]
#[case::many_workers(8, 250)]
fn test_concurrent_allocations_are_unique(#[case] workers: usize, #[case] per_worker: usize) {
    init_logging();
    let runtime = Runtime::startup(RuntimeConfig::default()).unwrap();

    let handles: Vec<Handle> = std::thread::scope(|scope| {
        let joins: Vec<_> = (0..workers)
            .map(|_| {
                let worker = runtime.spawn_worker().unwrap();
                scope.spawn(move || {
                    let runtime = worker.runtime();
                    (0..per_worker)
                        .map(|i| {
                            let size = 16 + (i as u64 % 4) * 16;
                            runtime
                                .create_buffer(&BufferDescriptor::new(size, BufferUsage::STORAGE))
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        joins
            .into_iter()
            .flat_map(|join| join.join().unwrap())
            .collect()
    });

    let unique: HashSet<Handle> = handles.iter().copied().collect();
    assert_eq!(handles.len(), workers * per_worker);
    assert_eq!(unique.len(), handles.len());
    assert!(handles.iter().all(|h| !h.is_null()));
}

#[test]
fn test_concurrent_free_and_reuse() {
    init_logging();
    let runtime = Runtime::startup(RuntimeConfig::default()).unwrap();

    let stale: Vec<Handle> = std::thread::scope(|scope| {
        let joins: Vec<_> = (0..4)
            .map(|_| {
                let runtime = Arc::clone(&runtime);
                scope.spawn(move || {
                    let mut stale = Vec::new();
                    for _ in 0..200 {
                        let handle = runtime.create_parity_tracker();
                        runtime.free(handle).unwrap();
                        stale.push(handle);
                        runtime.create_parity_tracker();
                    }
                    stale
                })
            })
            .collect();
        joins.into_iter().flat_map(|join| join.join().unwrap()).collect()
    });

    for handle in stale {
        assert_eq!(
            runtime.resolve(handle).unwrap_err().kind(),
            ErrorKind::InvalidHandle
        );
    }
    assert_eq!(runtime.table().len(), 800);
}

#[test]
fn test_other_worker_cannot_record() {
    let ctx = TestContext::new();
    let intruder = ctx.runtime.spawn_worker().unwrap();
    let pass = ctx.compute_pass();

    let err = std::thread::scope(|scope| {
        scope
            .spawn(move || intruder.record(pass, |rec, _| rec.dispatch_workgroups(1, 1, 1)))
            .join()
            .unwrap()
            .unwrap_err()
    });
    assert_eq!(err.kind(), ErrorKind::InvalidOwner);

    // The owner's pass is untouched by the rejected call.
    ctx.worker
        .record(pass, |rec, _| rec.dispatch_workgroups(1, 1, 1))
        .unwrap();
    let stream = ctx.worker.end_pass(pass).unwrap();
    assert_eq!(stream.len(), 2);
}

#[test]
fn test_other_worker_cannot_end_pass() {
    let ctx = TestContext::new();
    let intruder = ctx.runtime.spawn_worker().unwrap();
    let pass = ctx.worker.begin_render_pass(None).unwrap();

    assert_eq!(
        intruder.end_pass(pass).unwrap_err().kind(),
        ErrorKind::InvalidOwner
    );
    assert!(ctx.worker.end_pass(pass).is_ok());
}

#[test]
fn test_parallel_recording_and_submission() {
    init_logging();
    let runtime = Runtime::startup(RuntimeConfig::default()).unwrap();
    let pipeline = runtime
        .create_compute_pipeline(&ComputePipelineDescriptor::new(Vec::new()))
        .unwrap();
    let args = runtime
        .create_buffer(&BufferDescriptor::new(1024, BufferUsage::INDIRECT))
        .unwrap();

    let passes: Vec<Handle> = std::thread::scope(|scope| {
        let joins: Vec<_> = (0..6u32)
            .map(|i| {
                let worker = runtime.spawn_worker().unwrap();
                scope.spawn(move || {
                    let pass = worker.begin_compute_pass(Some("parallel")).unwrap();
                    worker
                        .record(pass, |rec, table| {
                            rec.set_pipeline(table, pipeline)?;
                            for n in 0..=i {
                                rec.dispatch_workgroups(n + 1, 1, 1)?;
                            }
                            rec.dispatch_workgroups_indirect(table, args, u64::from(i) * 12)
                        })
                        .unwrap();
                    worker.end_pass(pass).unwrap();
                    worker.destroy().unwrap();
                    pass
                })
            })
            .collect();
        joins.into_iter().map(|join| join.join().unwrap()).collect()
    });

    assert_eq!(runtime.worker_count(), 0);

    let mut backend = DummyBackend::new();
    for pass in &passes {
        runtime.submit(*pass, &mut backend).unwrap();
    }
    // Worker i records i + 1 direct dispatches and one indirect dispatch.
    assert_eq!(backend.stats().dispatches, (1..=6).map(|n| n + 1).sum::<usize>());
}

#[test]
fn test_supervisor_destroy_racing_begin() {
    init_logging();
    let runtime = Runtime::startup(RuntimeConfig::default()).unwrap();

    for _ in 0..64 {
        let worker = runtime.spawn_worker().unwrap();
        let (id, local_storage) = (worker.id(), worker.local_storage());

        std::thread::scope(|scope| {
            scope.spawn(move || {
                while let Ok(pass) = worker.begin_compute_pass(None) {
                    if worker.end_pass(pass).is_err() {
                        break;
                    }
                }
            });
            let runtime = &runtime;
            scope.spawn(move || {
                while runtime.thread_destroy(id, local_storage).is_err() {
                    std::hint::spin_loop();
                }
            });
        });
    }

    assert_eq!(runtime.worker_count(), 0);
    for handle in runtime.table().live_handles() {
        if let Ok(Resource::Pass(entry)) = runtime.resolve(handle) {
            assert!(!entry.is_recording(), "{handle} outlived its worker while recording");
        }
    }
    assert!(runtime.teardown().is_ok());
}

#[test]
fn test_begin_after_supervisor_destroy() {
    let ctx = TestContext::new();
    let before = ctx.runtime.table().len();
    ctx.runtime
        .thread_destroy(ctx.worker.id(), ctx.worker.local_storage())
        .unwrap();

    assert_eq!(
        ctx.worker.begin_compute_pass(None).unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(ctx.runtime.table().len(), before);
}
