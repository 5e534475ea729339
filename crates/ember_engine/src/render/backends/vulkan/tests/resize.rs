use ash::vk::{self, Handle};

use super::context;
use super::mock::{MockBackend, MockGpu, ObjectKind};
use crate::render::backends::vulkan::context::GpuContext;
use crate::render::backends::vulkan::initialization::error::ErrorKind;

fn empty_frame(ctx: &mut GpuContext<MockBackend>) -> vk::Extent2D {
    let frame = ctx.begin_frame().unwrap();
    let extent = frame.extent();
    ctx.end_frame(frame).unwrap();
    extent
}

#[test]
fn test_resize_between_frames() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);

    for _ in 0..5 {
        assert_eq!(empty_frame(&mut ctx), vk::Extent2D { width: 1280, height: 720 });
    }

    let old_views = gpu.live_handles(ObjectKind::ImageView);
    let old_buffers = gpu.live_handles(ObjectKind::CommandBuffer);
    let old_swapchain = gpu.live_handles(ObjectKind::Swapchain);

    ctx.resize(640, 480);

    assert_eq!(ctx.extent(), vk::Extent2D { width: 640, height: 480 });
    assert_eq!(gpu.idle_waits(), 1);
    assert_eq!(
        gpu.last_swapchain_request().map(|request| vec![request.old_swapchain.as_raw()]),
        Some(old_swapchain)
    );
    let views = gpu.live_handles(ObjectKind::ImageView);
    let buffers = gpu.live_handles(ObjectKind::CommandBuffer);
    assert!(old_views.iter().all(|raw| !views.contains(raw)));
    assert!(old_buffers.iter().all(|raw| !buffers.contains(raw)));
    assert_eq!(gpu.live_count(ObjectKind::Swapchain), 1);
    assert_eq!(gpu.live_count(ObjectKind::ImageView), 2);
    // Timeline, present and spare plus one per slot
    assert_eq!(gpu.live_count(ObjectKind::Semaphore), 5);

    for _ in 0..5 {
        assert_eq!(empty_frame(&mut ctx), vk::Extent2D { width: 640, height: 480 });
    }
    assert_eq!(ctx.progress(), 10);
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn test_new_slots_start_without_pending_work() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);
    empty_frame(&mut ctx);
    empty_frame(&mut ctx);

    ctx.resize(1024, 768);

    assert_eq!(ctx.slot_progress(0), Some(0));
    assert_eq!(ctx.slot_progress(1), Some(0));
    assert_eq!(ctx.progress(), 2);
}

#[test]
fn test_resize_during_frame_is_rejected() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);

    let frame = ctx.begin_frame().unwrap();
    let err = ctx.try_resize(640, 480).unwrap_err();

    assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
    assert_eq!(ctx.extent(), vk::Extent2D { width: 1280, height: 720 });

    ctx.end_frame(frame).unwrap();
    ctx.try_resize(640, 480).unwrap();
    assert_eq!(ctx.extent(), vk::Extent2D { width: 640, height: 480 });
}

#[test]
fn test_repeated_resizes_do_not_leak() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);

    for size in [800, 600, 400, 1920] {
        ctx.resize(size, size / 2);
        empty_frame(&mut ctx);
    }

    assert_eq!(gpu.live_count(ObjectKind::Swapchain), 1);
    assert_eq!(gpu.live_count(ObjectKind::ImageView), 2);
    assert_eq!(gpu.live_count(ObjectKind::CommandBuffer), 2);
    assert_eq!(gpu.created_count(ObjectKind::Swapchain), 5);

    drop(ctx);
    assert!(gpu.all_destroyed_before_device());
}

#[test]
fn test_resize_releases_image_held_by_timed_out_frame() {
    let gpu = MockGpu::new();
    let mut ctx = context(&gpu, 1280, 720);
    gpu.set_gpu_stalled(true);
    empty_frame(&mut ctx);
    empty_frame(&mut ctx);
    assert!(ctx.begin_frame().unwrap_err().is_timeout());
    assert_eq!(ctx.held_image(), Some(0));

    gpu.set_gpu_stalled(false);
    ctx.try_resize(800, 600).unwrap();

    assert_eq!(ctx.held_image(), None);
    assert_eq!(gpu.acquired_images(), 0);
    for _ in 0..4 {
        assert_eq!(empty_frame(&mut ctx), vk::Extent2D { width: 800, height: 600 });
    }
    assert_eq!(ctx.progress(), 6);
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}
