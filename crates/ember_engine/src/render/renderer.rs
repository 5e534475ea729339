//! Per-frame orchestration
//!
//! The renderer is the only place that knows what a frame contains: one
//! color pass over the swapchain image, cleared to black, with the built-in
//! triangle drawn on top when a pipeline is installed.

use ash::vk;

use crate::render::backends::vulkan::{
    Frame, GpuBackend, GpuContext, Rect2D, RenderPipeline, RenderPipelineDesc, RenderingPassDescriptor, VulkanResult,
};
use crate::render::window::Surface;

/// Vertices drawn by the built-in pipeline
const TRIANGLE_VERTICES: u32 = 3;

/// What happened to a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and presented
    Presented,
    /// Nothing was rendered (minimized window or rebuilt swapchain)
    Skipped,
}

/// Drives the frame protocol of a [`GpuContext`]
pub struct Renderer<B: GpuBackend> {
    // Dropped before the context
    pipeline: Option<RenderPipeline<B>>,
    context: GpuContext<B>,
    resize_pending: bool,
}

impl<B: GpuBackend> Renderer<B> {
    /// Render with `context`; no pipeline is installed yet
    pub fn new(context: GpuContext<B>) -> Self {
        Self {
            pipeline: None,
            context,
            resize_pending: false,
        }
    }

    /// Build the pipeline drawn every frame, replacing any previous one
    pub fn install_pipeline(&mut self, desc: &RenderPipelineDesc<'_>) -> VulkanResult<()> {
        let pipeline = self.context.create_render_pipeline(desc)?;
        if let Some(previous) = self.pipeline.replace(pipeline) {
            self.context.wait_idle()?;
            drop(previous);
        }
        Ok(())
    }

    /// Whether a pipeline is installed
    pub fn has_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }

    /// GPU context
    pub fn context(&self) -> &GpuContext<B> {
        &self.context
    }

    /// Render one frame to `surface`
    pub fn render(&mut self, surface: &impl Surface) -> VulkanResult<FrameOutcome> {
        if !surface.is_drawable() {
            return Ok(FrameOutcome::Skipped);
        }
        let (width, height) = surface.framebuffer_size();

        if self.resize_pending {
            self.resize_pending = false;
            self.context.resize(width, height);
        }

        let frame = match self.context.begin_frame() {
            Ok(frame) => frame,
            Err(err) if err.is_out_of_date() => {
                log::debug!("[RENDERER] Swapchain out of date at acquire, rebuilding");
                self.context.resize(width, height);
                return Ok(FrameOutcome::Skipped);
            }
            Err(err) => return Err(err),
        };

        if let Err(err) = self.record_pass(&frame, width, height) {
            if let Err(abandon_err) = self.context.abandon_frame(frame) {
                log::error!("Failed to abandon frame: {}", abandon_err);
            }
            return Err(err);
        }

        match self.context.end_frame(frame) {
            Ok(()) => Ok(FrameOutcome::Presented),
            Err(err) if err.is_out_of_date() => {
                self.context.resize(width, height);
                Ok(FrameOutcome::Skipped)
            }
            Err(err) => Err(err),
        }
    }

    fn record_pass(&mut self, frame: &Frame, width: u32, height: u32) -> VulkanResult<()> {
        let target = self.context.texture_view(frame)?;
        let extent = frame.extent();
        let rect = Rect2D::from_extent(width.min(extent.width), height.min(extent.height));
        let pipeline = self.pipeline.as_ref().map(RenderPipeline::handle);

        let recorder = self.context.command_recorder(frame)?;
        recorder.transition_texture_layout(target, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)?;
        recorder.begin_rendering(&RenderingPassDescriptor {
            rect,
            color_attachments: &[target],
        })?;
        if let Some(pipeline) = pipeline {
            recorder.bind_pipeline(pipeline)?;
            recorder.set_viewport_and_scissor(rect)?;
            recorder.draw(TRIANGLE_VERTICES)?;
        }
        recorder.end_rendering()
    }

    /// Forward a framebuffer resize to the context
    ///
    /// A zero-sized resize (minimized window) is deferred until the surface
    /// can be drawn to again.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            self.resize_pending = true;
            return;
        }

        self.resize_pending = false;
        self.context.resize(width, height);
    }
}

impl<B: GpuBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        if let Err(err) = self.context.wait_idle() {
            log::error!("Failed to wait for device idle before releasing the pipeline: {}", err);
        }
        self.pipeline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::tests::mock::{MockBackend, MockGpu, MockSurface, RecordedCommand};
    use crate::render::backends::vulkan::tests::{context, SPIRV};

    fn renderer(gpu: &MockGpu) -> Renderer<MockBackend> {
        Renderer::new(context(gpu, 1280, 720))
    }

    fn commands_of_last_submit(gpu: &MockGpu) -> Vec<RecordedCommand> {
        let buffer = gpu.submitted_buffers().last().copied().expect("nothing submitted");
        gpu.commands(buffer)
    }

    #[test]
    fn test_clear_only_frame() {
        let gpu = MockGpu::new();
        let mut renderer = renderer(&gpu);
        let surface = MockSurface::new(1280, 720);

        assert_eq!(renderer.render(&surface).unwrap(), FrameOutcome::Presented);

        let commands = commands_of_last_submit(&gpu);
        assert_eq!(commands.len(), 4);
        assert!(matches!(&commands[0], RecordedCommand::Barrier(b) if b.new_layout == vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
        match &commands[1] {
            RecordedCommand::BeginRendering { area, views, clear_color } => {
                assert_eq!(area.extent, vk::Extent2D { width: 1280, height: 720 });
                assert_eq!(views.len(), 1);
                assert_eq!(*clear_color, [0.0, 0.0, 0.0, 1.0]);
            }
            other => panic!("expected a rendering pass, got {other:?}"),
        }
        assert_eq!(commands[2], RecordedCommand::EndRendering);
        assert!(matches!(&commands[3], RecordedCommand::Barrier(b) if b.new_layout == vk::ImageLayout::PRESENT_SRC_KHR));
    }

    #[test]
    fn test_pipeline_frame_draws_triangle() {
        let gpu = MockGpu::new();
        let mut renderer = renderer(&gpu);
        renderer.install_pipeline(&RenderPipelineDesc::new(&SPIRV, &SPIRV)).unwrap();
        let surface = MockSurface::new(1280, 720);

        renderer.render(&surface).unwrap();

        let commands = commands_of_last_submit(&gpu);
        assert!(matches!(commands[2], RecordedCommand::BindPipeline(_)));
        assert!(matches!(commands[3], RecordedCommand::SetViewportAndScissor(_)));
        assert_eq!(
            commands[4],
            RecordedCommand::Draw {
                vertex_count: 3,
                instance_count: 1
            }
        );
        assert_eq!(commands[5], RecordedCommand::EndRendering);
    }

    #[test]
    fn test_minimized_surface_skips_frame() {
        let gpu = MockGpu::new();
        let mut renderer = renderer(&gpu);
        let surface = MockSurface::new(0, 0);

        assert_eq!(renderer.render(&surface).unwrap(), FrameOutcome::Skipped);
        assert!(gpu.submitted_buffers().is_empty());
        assert_eq!(renderer.context().progress(), 0);
    }

    #[test]
    fn test_zero_resize_is_deferred() {
        let gpu = MockGpu::new();
        let mut renderer = renderer(&gpu);
        let surface = MockSurface::new(0, 0);

        renderer.resize(0, 0);
        assert_eq!(renderer.render(&surface).unwrap(), FrameOutcome::Skipped);
        assert_eq!(renderer.context().extent(), vk::Extent2D { width: 1280, height: 720 });

        surface.set_size(800, 600);
        assert_eq!(renderer.render(&surface).unwrap(), FrameOutcome::Presented);
        assert_eq!(renderer.context().extent(), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_pass_is_clamped_to_chain_extent() {
        let gpu = MockGpu::new();
        let mut renderer = renderer(&gpu);
        // Surface grew but no resize event arrived yet
        let surface = MockSurface::new(1920, 1080);

        renderer.render(&surface).unwrap();

        match &commands_of_last_submit(&gpu)[1] {
            RecordedCommand::BeginRendering { area, .. } => {
                assert_eq!(area.extent, vk::Extent2D { width: 1280, height: 720 });
            }
            other => panic!("expected a rendering pass, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_date_acquire_rebuilds_and_skips() {
        let gpu = MockGpu::new();
        let mut renderer = renderer(&gpu);
        let surface = MockSurface::new(1024, 768);
        gpu.report_out_of_date_on_next_acquire();

        assert_eq!(renderer.render(&surface).unwrap(), FrameOutcome::Skipped);
        assert_eq!(renderer.context().extent(), vk::Extent2D { width: 1024, height: 768 });
        assert_eq!(renderer.render(&surface).unwrap(), FrameOutcome::Presented);
    }

    #[test]
    fn test_out_of_date_present_rebuilds_and_skips() {
        let gpu = MockGpu::new();
        let mut renderer = renderer(&gpu);
        let surface = MockSurface::new(1024, 768);
        gpu.report_out_of_date_on_next_present();

        assert_eq!(renderer.render(&surface).unwrap(), FrameOutcome::Skipped);
        assert_eq!(renderer.context().progress(), 1);
        assert_eq!(renderer.context().extent(), vk::Extent2D { width: 1024, height: 768 });
        assert_eq!(renderer.render(&surface).unwrap(), FrameOutcome::Presented);
        assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
    }

    #[test]
    fn test_rendering_continues_after_failed_submit() {
        let gpu = MockGpu::new();
        let mut renderer = renderer(&gpu);
        let surface = MockSurface::new(1280, 720);
        renderer.render(&surface).unwrap();

        gpu.fail_next_submit(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        assert!(renderer.render(&surface).is_err());

        for _ in 0..4 {
            assert_eq!(renderer.render(&surface).unwrap(), FrameOutcome::Presented);
        }
        assert_eq!(renderer.context().progress(), 5);
        assert_eq!(gpu.acquired_images(), 0);
        assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
    }

    #[test]
    fn test_drop_releases_pipeline_before_device() {
        let gpu = MockGpu::new();
        let mut renderer = renderer(&gpu);
        renderer.install_pipeline(&RenderPipelineDesc::new(&SPIRV, &SPIRV)).unwrap();

        drop(renderer);

        assert!(gpu.all_destroyed_before_device());
    }
}
