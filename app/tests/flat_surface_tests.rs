//! Tests for the numeric call surface.

mod common;

use rstest::rstest;

use common::FlatFixture;
use gpubridge_app::{Status, ThreadContext, thread_destroy};
use gpubridge_graphics::{DummyBackend, Handle, ShaderStages};

#[test]
fn test_compute_pass_round_trip() {
    let fx = FlatFixture::new();
    let ctx = &fx.ctx;
    let (label_ptr, label_len) = fx.stage_str("lighting");
    let (offsets_ptr, offsets_len) = fx.stage_u32s(&[256]);
    let push = fx.ctx.stage(&[7u8; 16]);

    let pass = ctx.begin_compute_pass(label_ptr, label_len);
    assert_ne!(pass, 0);
    assert_eq!(ctx.compute_pass_set_pipeline(pass, fx.compute_pipeline), Status::Ok);
    assert_eq!(
        ctx.compute_pass_set_bind_group(pass, 1, fx.dynamic_group, offsets_ptr, offsets_len),
        Status::Ok
    );
    assert_eq!(
        ctx.compute_pass_set_push_constants(pass, ShaderStages::COMPUTE.bits(), 0, push, 16),
        Status::Ok
    );
    assert_eq!(ctx.compute_pass_push_debug_group(pass, label_ptr, label_len), Status::Ok);
    assert_eq!(ctx.compute_pass_dispatch_workgroups(pass, 8, 8, 1), Status::Ok);
    assert_eq!(
        ctx.compute_pass_dispatch_workgroups_indirect(pass, fx.indirect_buffer, 12),
        Status::Ok
    );
    assert_eq!(ctx.compute_pass_pop_debug_group(pass), Status::Ok);
    assert_eq!(ctx.end_pass(pass), Status::Ok);

    let mut backend = DummyBackend::new();
    let stream = fx.runtime.submit(Handle::from_raw(pass), &mut backend).unwrap();
    assert_eq!(stream.label(), Some("lighting"));
    assert_eq!(backend.stats().dispatches, 2);
    assert_eq!(backend.stats().push_constant_bytes, 16);
}

#[rstest]
#[case::last_slot(1, Status::Ok)]
#[case::one_past(2, Status::ValidationError)]
#[case::far_past(7, Status::ValidationError)]
fn test_bind_group_slot_against_pipeline(#[case] slot: u32, #[case] expected: Status) {
    let fx = FlatFixture::new();
    let (ptr, len) = fx.stage_u32s(&[0]);
    let pass = fx.compute_pass();

    assert_eq!(
        fx.ctx.compute_pass_set_bind_group(pass, slot, fx.dynamic_group, ptr, len),
        expected
    );
}

#[test]
fn test_misaligned_dynamic_offset_aborts() {
    let fx = FlatFixture::new();
    let (ptr, len) = fx.stage_u32s(&[4]);
    let pass = fx.compute_pass();

    assert_eq!(
        fx.ctx.compute_pass_set_bind_group(pass, 0, fx.dynamic_group, ptr, len),
        Status::ValidationError
    );
    assert_eq!(
        fx.ctx.compute_pass_dispatch_workgroups(pass, 1, 1, 1),
        Status::InvalidState
    );
}

#[test]
fn test_unknown_stage_bits_abort() {
    let fx = FlatFixture::new();
    let push = fx.ctx.stage(&[0u8; 4]);
    let pass = fx.compute_pass();

    assert_eq!(
        fx.ctx.compute_pass_set_push_constants(pass, 1 << 30, 0, push, 4),
        Status::ValidationError
    );
    assert_eq!(
        fx.ctx.compute_pass_dispatch_workgroups(pass, 1, 1, 1),
        Status::InvalidState
    );
    assert_eq!(fx.ctx.end_pass(pass), Status::InvalidState);
}

#[test]
fn test_offsets_outside_arena_abort() {
    let fx = FlatFixture::new();
    let capacity = fx.runtime.arena().capacity();
    let pass = fx.compute_pass();

    assert_eq!(
        fx.ctx.compute_pass_set_bind_group(pass, 0, fx.dynamic_group, capacity, 1),
        Status::ValidationError
    );
    assert_eq!(fx.ctx.end_pass(pass), Status::InvalidState);
}

#[test]
fn test_indirect_usage_is_checked_at_end_pass() {
    let fx = FlatFixture::new();
    let pass = fx.compute_pass();

    assert_eq!(
        fx.ctx.compute_pass_dispatch_workgroups_indirect(pass, fx.vertex_buffer, 0),
        Status::Ok
    );
    assert_eq!(fx.ctx.end_pass(pass), Status::DeviceError);
    assert_eq!(fx.ctx.last_status(), Status::DeviceError);
}

#[test]
fn test_nested_statistics_query() {
    let fx = FlatFixture::new();
    let pass = fx.compute_pass();

    assert_eq!(
        fx.ctx
            .compute_pass_begin_pipeline_statistics_query(pass, fx.statistics, 0),
        Status::Ok
    );
    assert_eq!(
        fx.ctx
            .compute_pass_begin_pipeline_statistics_query(pass, fx.statistics, 1),
        Status::OnlyOneActive
    );
}

#[rstest]
#[case::balanced(1, Status::Ok)]
#[case::left_open(0, Status::Unbalanced)]
fn test_debug_group_balance(#[case] pops: usize, #[case] expected: Status) {
    let fx = FlatFixture::new();
    let (ptr, len) = fx.stage_str("group");
    let pass = fx.ctx.begin_render_pass(0, 0);

    assert_eq!(fx.ctx.render_pass_push_debug_group(pass, ptr, len), Status::Ok);
    for _ in 0..pops {
        assert_eq!(fx.ctx.render_pass_pop_debug_group(pass), Status::Ok);
    }
    assert_eq!(fx.ctx.end_pass(pass), expected);
}

#[test]
fn test_render_pass_executes_bundles() {
    let fx = FlatFixture::new();
    let first = fx.finished_bundle();
    let second = fx.finished_bundle();
    let (ptr, count) = fx.stage_handles(&[first, second]);

    let pass = fx.ctx.begin_render_pass(0, 0);
    assert_eq!(fx.ctx.render_pass_set_viewport(pass, 0.0, 0.0, 640.0, 480.0, 0.0, 1.0), Status::Ok);
    assert_eq!(fx.ctx.render_pass_set_scissor_rect(pass, 0, 0, 640, 480), Status::Ok);
    assert_eq!(fx.ctx.render_pass_execute_bundles(pass, ptr, count), Status::Ok);
    // Bundle execution resets the pass state; the pipeline must be bound again.
    assert_eq!(fx.ctx.render_pass_draw(pass, 3, 1, 0, 0), Status::InvalidState);
    assert_eq!(fx.ctx.end_pass(pass), Status::InvalidState);
}

#[test]
fn test_bundle_rejects_render_only_state() {
    let fx = FlatFixture::new();
    let bundle = fx.ctx.begin_render_bundle(0, 0);

    // Render-pass calls against a bundle handle are a family mismatch.
    assert_eq!(
        fx.ctx.render_pass_set_stencil_reference(bundle, 1),
        Status::TypeMismatch
    );
    assert_eq!(fx.ctx.render_bundle_draw(bundle, 3, 1, 0, 0), Status::InvalidState);
    assert_eq!(fx.ctx.end_pass(bundle), Status::InvalidState);
}

#[test]
fn test_indexed_draw_needs_index_format() {
    let fx = FlatFixture::new();
    let pass = fx.ctx.begin_render_pass(0, 0);
    assert_eq!(fx.ctx.render_pass_set_pipeline(pass, fx.render_pipeline), Status::Ok);

    assert_eq!(
        fx.ctx.render_pass_set_index_buffer(pass, fx.vertex_buffer, 9, 0),
        Status::ValidationError
    );
    assert_eq!(fx.ctx.render_pass_draw_indexed(pass, 3, 1, 0, 0, 0), Status::InvalidState);
}

#[test]
fn test_thread_destroy_waits_for_recording_pass() {
    let fx = FlatFixture::new();
    let helper = ThreadContext::attach(&fx.runtime).unwrap();
    let pass = helper.begin_compute_pass(0, 0);

    assert_eq!(
        thread_destroy(&fx.runtime, helper.worker_id(), helper.local_storage()),
        Status::InUseError
    );
    assert_eq!(
        thread_destroy(&fx.runtime, helper.worker_id(), helper.local_storage() + 16),
        Status::ValidationError
    );

    assert_eq!(helper.end_pass(pass), Status::Ok);
    let (worker_id, local_storage) = (helper.worker_id(), helper.local_storage());
    drop(helper);
    assert_eq!(thread_destroy(&fx.runtime, worker_id, local_storage), Status::Ok);
    assert_eq!(thread_destroy(&fx.runtime, worker_id, local_storage), Status::InvalidState);
}

#[test]
fn test_other_context_cannot_record() {
    let fx = FlatFixture::new();
    let other = ThreadContext::attach(&fx.runtime).unwrap();
    let pass = fx.compute_pass();

    let status = std::thread::scope(|scope| {
        scope
            .spawn(move || other.compute_pass_dispatch_workgroups(pass, 1, 1, 1))
            .join()
            .unwrap()
    });
    assert_eq!(status, Status::InvalidOwner);
    assert_eq!(fx.ctx.compute_pass_dispatch_workgroups(pass, 1, 1, 1), Status::Ok);
}

#[test]
fn test_free_recording_pass_is_in_use() {
    let fx = FlatFixture::new();
    let pass = fx.compute_pass();

    assert_eq!(fx.ctx.free(pass), Status::InUseError);
    assert_eq!(fx.ctx.end_pass(pass), Status::Ok);
    assert_eq!(fx.ctx.free(pass), Status::Ok);
    assert_eq!(fx.ctx.compute_pass_dispatch_workgroups(pass, 1, 1, 1), Status::InvalidHandle);
}

#[test]
fn test_realloc_keeps_contents() {
    let fx = FlatFixture::new();
    let ptr = fx.ctx.stage(b"abcd");
    let grown = fx.ctx.realloc(ptr, 4, 0, 64);
    assert_ne!(grown, 0);
    assert_eq!(fx.runtime.arena().read(grown, 4).unwrap(), b"abcd");
    assert_eq!(fx.ctx.free_bytes(grown, 64, 0), Status::Ok);
}

#[rstest]
#[case::grow_past_the_end(64, 4, 64)]
#[case::shrink_past_the_end(64, 4096, 8)]
#[case::straddles_the_end(-2, 4, 64)]
fn test_realloc_outside_arena_is_rejected(
    #[case] past_end: i64,
    #[case] old_size: u32,
    #[case] new_size: u32,
) {
    let fx = FlatFixture::new();
    let capacity = fx.runtime.arena().capacity();
    let live = fx.runtime.arena().live_bytes();
    let ptr = (i64::from(capacity) + past_end) as u32;

    assert_eq!(fx.ctx.realloc(ptr, old_size, 4, new_size), 0);
    assert_eq!(fx.ctx.last_status(), Status::ValidationError);
    assert_eq!(fx.runtime.arena().live_bytes(), live);

    // Later allocations stay inside the arena.
    for _ in 0..64 {
        let block = fx.ctx.malloc(1024, 8);
        if block == 0 {
            break;
        }
        assert!(block + 1024 <= capacity);
    }
}

#[test]
fn test_free_bytes_rejects_foreign_and_double_release() {
    let fx = FlatFixture::new();
    let capacity = fx.runtime.arena().capacity();
    let ptr = fx.ctx.malloc(64, 8);
    let live = fx.runtime.arena().live_bytes();

    assert_eq!(fx.ctx.free_bytes(capacity + 64, 64, 8), Status::ValidationError);
    assert_eq!(fx.runtime.arena().live_bytes(), live);

    assert_eq!(fx.ctx.free_bytes(ptr, 64, 8), Status::Ok);
    assert_eq!(fx.ctx.free_bytes(ptr, 64, 8), Status::ValidationError);
    assert_eq!(fx.runtime.arena().live_bytes(), live - 64);
}

#[test]
fn test_created_resources_have_raw_handles() {
    let fx = FlatFixture::new();
    let (ptr, len) = fx.stage_str("scratch");

    let buffer = fx.ctx.create_buffer(64, 1 << 3, ptr, len);
    assert_ne!(buffer, 0);
    assert!(fx.runtime.resolve(Handle::from_raw(buffer)).is_ok());

    assert_eq!(fx.ctx.create_buffer(64, u32::MAX, 0, 0), 0);
    assert_eq!(fx.ctx.last_status(), Status::ValidationError);

    assert_eq!(fx.ctx.create_query_set(5, 4, 0, 0), 0);
    assert_eq!(fx.ctx.last_status(), Status::ValidationError);
}
