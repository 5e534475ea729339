use ash::vk;

use super::mock::{GpuEvent, MockBackend, MockGpu, ObjectKind, RecordedCommand};
use super::{context, SPIRV};
use crate::core::config::RendererConfig;
use crate::render::backends::vulkan::context::GpuContext;
use crate::render::backends::vulkan::initialization::error::{ErrorKind, VulkanResult};
use crate::render::backends::vulkan::rendering::commands::{Rect2D, RenderingPassDescriptor};
use crate::render::backends::vulkan::rendering::pipeline::RenderPipelineDesc;

fn run_frame(ctx: &mut GpuContext<MockBackend>) {
    let frame = ctx.begin_frame().unwrap();
    let target = ctx.texture_view(&frame).unwrap();
    let extent = frame.extent();
    let recorder = ctx.command_recorder(&frame).unwrap();
    recorder
        .transition_texture_layout(target, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .unwrap();
    recorder
        .begin_rendering(&RenderingPassDescriptor {
            rect: Rect2D::from_extent(extent.width, extent.height),
            color_attachments: &[target],
        })
        .unwrap();
    recorder.end_rendering().unwrap();
    ctx.end_frame(frame).unwrap();
}

fn is_invalid_frame<T>(result: VulkanResult<T>) -> bool {
    matches!(result, Err(err) if matches!(err.kind(), ErrorKind::InvalidFrame))
}

#[test]
fn test_ten_frames_cycle_both_slots() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);

    for _ in 0..10 {
        run_frame(&mut ctx);
    }

    assert_eq!(ctx.progress(), 10);
    assert_eq!(gpu.presented_images(), vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);

    let submitted = gpu.submitted_buffers();
    assert_eq!(submitted.len(), 10);
    for buffer in &submitted {
        let uses = submitted.iter().filter(|b| *b == buffer).count();
        assert_eq!(uses, 5);
    }

    assert_eq!(ctx.slot_progress(0), Some(9));
    assert_eq!(ctx.slot_progress(1), Some(10));
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn test_slot_reuse_waits_for_its_previous_frame() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);

    run_frame(&mut ctx);
    run_frame(&mut ctx);
    // Nothing has forced frame 1 to retire yet
    assert_eq!(gpu.completed_progress(), 0);

    run_frame(&mut ctx);
    // Reusing slot 0 waited for value 1 and nothing later
    assert_eq!(gpu.completed_progress(), 1);
    assert_eq!(gpu.pending_progress(), vec![2, 3]);
}

#[test]
fn test_second_begin_is_rejected() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);

    let frame = ctx.begin_frame().unwrap();
    let err = ctx.begin_frame().unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::FrameInProgress));

    ctx.end_frame(frame).unwrap();
    assert_eq!(ctx.progress(), 1);
}

#[test]
fn test_frame_from_another_context_is_rejected() {
    let gpu = MockGpu::new();
    let mut owner = context(&gpu, 1280, 720);
    let mut other = context(&gpu, 1280, 720);

    let frame = owner.begin_frame().unwrap();

    assert!(is_invalid_frame(other.texture_view(&frame)));
    assert!(is_invalid_frame(other.command_recorder(&frame)));
    assert!(is_invalid_frame(other.end_frame(frame)));
    assert_eq!(other.progress(), 0);
    assert!(gpu.submitted_buffers().is_empty());
}

#[test]
fn test_consecutive_frames_use_distinct_targets() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);

    let frame = ctx.begin_frame().unwrap();
    let view = ctx.texture_view(&frame).unwrap();
    ctx.end_frame(frame).unwrap();

    let next = ctx.begin_frame().unwrap();
    assert_ne!(ctx.texture_view(&next).unwrap().image_view, view.image_view);
    ctx.end_frame(next).unwrap();
}

#[test]
fn test_acquire_timeout_is_reported() {
    let gpu = MockGpu::new();
    let config = RendererConfig::default().with_acquire_timeout_ms(50);
    let mut ctx = GpuContext::new(gpu.backend(), vk::Extent2D { width: 640, height: 480 }, &config).unwrap();
    gpu.set_acquire_stalled(true);

    let err = ctx.begin_frame().unwrap_err();

    assert!(err.is_timeout());
    match err.kind() {
        ErrorKind::AcquireTimeout { timeout } => assert_eq!(timeout.as_millis(), 50),
        other => panic!("expected an acquire timeout, got {other:?}"),
    }

    gpu.set_acquire_stalled(false);
    run_frame(&mut ctx);
    assert_eq!(ctx.progress(), 1);
}

#[test]
fn test_stalled_gpu_times_out_on_slot_reuse() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);
    gpu.set_gpu_stalled(true);

    run_frame(&mut ctx);
    run_frame(&mut ctx);
    let err = ctx.begin_frame().unwrap_err();

    assert!(err.is_timeout());
    assert!(matches!(err.kind(), ErrorKind::ProgressTimeout { value: 1, .. }));
    assert_eq!(ctx.progress(), 2);
    assert_eq!(ctx.held_image(), Some(0));
}

#[test]
fn test_rendering_resumes_after_progress_timeout() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);
    gpu.set_gpu_stalled(true);
    run_frame(&mut ctx);
    run_frame(&mut ctx);

    // Retrying while the GPU is still stuck keeps the same image
    for _ in 0..3 {
        assert!(ctx.begin_frame().unwrap_err().is_timeout());
        assert_eq!(gpu.acquired_images(), 1);
    }

    gpu.set_gpu_stalled(false);
    for _ in 0..4 {
        run_frame(&mut ctx);
    }

    assert_eq!(ctx.progress(), 6);
    assert_eq!(gpu.presented_images(), vec![0, 1, 0, 1, 0, 1]);
    assert_eq!(ctx.held_image(), None);
    assert_eq!(gpu.acquired_images(), 0);
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn test_failed_submit_does_not_advance_progress() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);
    run_frame(&mut ctx);

    gpu.fail_next_submit(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    let frame = ctx.begin_frame().unwrap();
    let slot = frame.image_index();
    let err = ctx.end_frame(frame).unwrap_err();

    assert!(matches!(
        err.kind(),
        ErrorKind::SubmitFailed(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
    ));
    assert_eq!(ctx.progress(), 1);
    assert_eq!(ctx.slot_progress(slot), Some(0));
    assert_eq!(gpu.presented_images().len(), 1);
    assert_eq!(ctx.held_image(), Some(slot));

    // The next frame renders into the image the failed one acquired
    let retry = ctx.begin_frame().unwrap();
    assert_eq!(retry.image_index(), slot);
    ctx.end_frame(retry).unwrap();
    for _ in 0..4 {
        run_frame(&mut ctx);
    }

    assert_eq!(ctx.progress(), 6);
    assert_eq!(ctx.slot_progress(slot), Some(6));
    assert_eq!(gpu.presented_images(), vec![0, 1, 0, 1, 0, 1]);
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn test_abandoned_frame_is_recorded_again() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);

    let frame = ctx.begin_frame().unwrap();
    let slot = frame.image_index();
    let target = ctx.texture_view(&frame).unwrap();
    ctx.command_recorder(&frame)
        .unwrap()
        .transition_texture_layout(target, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .unwrap();
    ctx.abandon_frame(frame).unwrap();
    assert!(gpu.submitted_buffers().is_empty());

    let frame = ctx.begin_frame().unwrap();
    assert_eq!(frame.image_index(), slot);
    ctx.end_frame(frame).unwrap();

    // Only the present transition of the second recording was submitted
    let commands = gpu.commands(gpu.submitted_buffers()[0]);
    assert_eq!(commands.len(), 1);
    assert_eq!(ctx.progress(), 1);
    assert_eq!(gpu.acquired_images(), 0);
    run_frame(&mut ctx);
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn test_abandon_rejects_frame_from_another_context() {
    let gpu = MockGpu::new();
    let mut owner = context(&gpu, 1280, 720);
    let mut other = context(&gpu, 1280, 720);

    let frame = owner.begin_frame().unwrap();
    assert!(is_invalid_frame(other.abandon_frame(frame)));
    assert!(matches!(
        owner.begin_frame().unwrap_err().kind(),
        ErrorKind::FrameInProgress
    ));
}

#[test]
fn test_present_failure_keeps_submitted_progress() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);

    gpu.fail_next_present(vk::Result::ERROR_SURFACE_LOST_KHR);
    let frame = ctx.begin_frame().unwrap();
    let err = ctx.end_frame(frame).unwrap_err();

    assert!(matches!(
        err.kind(),
        ErrorKind::PresentFailed(vk::Result::ERROR_SURFACE_LOST_KHR)
    ));
    assert_eq!(ctx.progress(), 1);
    run_frame(&mut ctx);
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn test_frame_ends_in_present_layout() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);

    run_frame(&mut ctx);

    let buffer = gpu.submitted_buffers()[0];
    let commands = gpu.commands(buffer);
    match commands.last() {
        Some(RecordedCommand::Barrier(barrier)) => {
            assert_eq!(barrier.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
            assert_eq!(barrier.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        }
        other => panic!("expected a present transition, got {other:?}"),
    }
}

#[test]
fn test_pipeline_defaults_to_swapchain_format() {
    let gpu = MockGpu::new();
    let ctx = context(&gpu, 1280, 720);

    let pipeline = ctx.create_render_pipeline(&RenderPipelineDesc::new(&SPIRV, &SPIRV)).unwrap();
    assert_eq!(pipeline.color_format(), vk::Format::B8G8R8A8_SRGB);

    let mut desc = RenderPipelineDesc::new(&SPIRV, &SPIRV);
    desc.color_format = Some(vk::Format::R16G16B16A16_SFLOAT);
    let hdr = ctx.create_render_pipeline(&desc).unwrap();
    assert_eq!(hdr.color_format(), vk::Format::R16G16B16A16_SFLOAT);
}

#[test]
fn test_teardown_destroys_everything_before_device() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);
    run_frame(&mut ctx);
    run_frame(&mut ctx);
    // Dropped with a frame still open
    let frame = ctx.begin_frame().unwrap();

    drop(frame);
    drop(ctx);

    assert!(gpu.all_destroyed_before_device());
    let events = gpu.events();
    let last_view = events
        .iter()
        .rposition(|event| *event == GpuEvent::Destroyed(ObjectKind::ImageView))
        .unwrap();
    let swapchain = events
        .iter()
        .position(|event| *event == GpuEvent::Destroyed(ObjectKind::Swapchain))
        .unwrap();
    assert!(last_view < swapchain, "views must go before their swapchain");
    for kind in [
        ObjectKind::Semaphore,
        ObjectKind::CommandPool,
        ObjectKind::CommandBuffer,
        ObjectKind::Swapchain,
        ObjectKind::ImageView,
    ] {
        assert_eq!(gpu.live_count(kind), 0, "{kind:?} leaked");
    }
}

#[test]
fn test_three_image_chain() {
    let gpu = MockGpu::with_image_count(3);
    let mut ctx = context(&gpu, 1280, 720);
    assert_eq!(ctx.image_count(), 3);

    for _ in 0..6 {
        run_frame(&mut ctx);
    }

    assert_eq!(gpu.presented_images(), vec![0, 1, 2, 0, 1, 2]);
    assert_eq!(gpu.completed_progress(), 3);
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}
