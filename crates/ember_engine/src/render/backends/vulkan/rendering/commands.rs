//! Command buffer recording
//!
//! A [`CommandRecorder`] wraps one primary command buffer allocated from the
//! context's pool. The context drives its lifecycle (`reset` → `begin` →
//! `finish`); the renderer only records into it between `begin_frame` and
//! `end_frame`.
//!
//! Layout transitions are tracked per image for the duration of one
//! recording, so callers only name the layout they need next. Every image
//! starts the recording in `UNDEFINED`: the render targets this recorder sees
//! are fully cleared each frame, so previous contents never need preserving.

use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::backend::{GpuBackend, ImageBarrier};
use crate::render::backends::vulkan::initialization::error::{ErrorKind, VulkanError, VulkanResult};

/// Clear color applied to every color target at the start of a pass
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// An image together with the view used to render into it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureView {
    /// View used as an attachment
    pub image_view: vk::ImageView,
    /// Underlying image, needed for layout transitions
    pub image: vk::Image,
}

/// Integer rectangle in framebuffer coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect2D {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Rect2D {
    /// Rectangle anchored at the origin
    pub fn from_extent(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

impl From<Rect2D> for vk::Rect2D {
    fn from(rect: Rect2D) -> Self {
        vk::Rect2D {
            offset: vk::Offset2D { x: rect.x, y: rect.y },
            extent: vk::Extent2D {
                width: rect.width,
                height: rect.height,
            },
        }
    }
}

/// Parameters of a color-only rendering pass
#[derive(Debug, Clone, Copy)]
pub struct RenderingPassDescriptor<'a> {
    /// Area rendered to
    pub rect: Rect2D,
    /// Color targets, cleared to [`DEFAULT_CLEAR_COLOR`]
    pub color_attachments: &'a [TextureView],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecorderState {
    Initial,
    Recording,
    InPass,
    Executable,
}

/// Stage and access masks for work that touches an image in `layout`
fn layout_usage(layout: vk::ImageLayout) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
    match layout {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL | vk::ImageLayout::ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
        ),
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_READ,
        ),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
        ),
        // Presentation and UNDEFINED: nothing on the queue reads or writes
        _ => (vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE),
    }
}

/// Build the barrier that moves `image` from `old_layout` to `new_layout`
pub fn layout_transition(image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> ImageBarrier {
    let (src_stage, src_access) = layout_usage(old_layout);
    let (dst_stage, dst_access) = layout_usage(new_layout);

    // The incoming image may still be read by the presentation engine; hang
    // the first transition off the stage the acquire semaphore waits on.
    let src_stage = if src_stage == vk::PipelineStageFlags2::NONE && dst_stage != vk::PipelineStageFlags2::NONE {
        dst_stage
    } else {
        src_stage
    };

    ImageBarrier {
        image,
        old_layout,
        new_layout,
        src_stage,
        // Only writes need to be made available
        src_access: src_access
            & (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE | vk::AccessFlags2::TRANSFER_WRITE),
        dst_stage,
        dst_access,
    }
}

/// One recordable unit of GPU work
pub struct CommandRecorder<B: GpuBackend> {
    backend: Arc<B>,
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
    state: RecorderState,
    layouts: Vec<(vk::Image, vk::ImageLayout)>,
}

impl<B: GpuBackend> CommandRecorder<B> {
    /// Allocate a primary command buffer from `pool`
    pub(crate) fn new(backend: Arc<B>, pool: vk::CommandPool) -> VulkanResult<Self> {
        let buffer = backend.allocate_command_buffer(pool)?;

        Ok(Self {
            backend,
            pool,
            buffer,
            state: RecorderState::Initial,
            layouts: Vec::new(),
        })
    }

    /// Raw command buffer handle
    pub(crate) fn raw(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Whether commands may currently be recorded
    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording | RecorderState::InPass)
    }

    /// Return the buffer to the initial state
    pub(crate) fn reset(&mut self) -> VulkanResult<()> {
        self.backend.reset_command_buffer(self.buffer)?;
        self.state = RecorderState::Initial;
        self.layouts.clear();
        Ok(())
    }

    /// Start recording
    pub(crate) fn begin(&mut self) -> VulkanResult<()> {
        if self.state != RecorderState::Initial {
            return Err(VulkanError::new(ErrorKind::InvalidOperation {
                reason: "command buffer must be reset before it is begun".to_string(),
            }));
        }

        self.backend.begin_command_buffer(self.buffer)?;
        self.state = RecorderState::Recording;
        Ok(())
    }

    /// Stop recording; the buffer is ready for submission
    pub(crate) fn finish(&mut self) -> VulkanResult<()> {
        match self.state {
            RecorderState::Recording => {}
            RecorderState::InPass => {
                return Err(VulkanError::new(ErrorKind::InvalidOperation {
                    reason: "cannot finish a command buffer inside a rendering pass".to_string(),
                }))
            }
            _ => {
                return Err(VulkanError::new(ErrorKind::InvalidOperation {
                    reason: "command buffer is not recording".to_string(),
                }))
            }
        }

        self.backend.end_command_buffer(self.buffer)?;
        self.state = RecorderState::Executable;
        Ok(())
    }

    /// Layout last recorded for `image` in this recording
    pub fn tracked_layout(&self, image: vk::Image) -> vk::ImageLayout {
        self.layouts
            .iter()
            .find(|(tracked, _)| *tracked == image)
            .map_or(vk::ImageLayout::UNDEFINED, |(_, layout)| *layout)
    }

    /// Begin a color pass over `descriptor.rect`, clearing every target
    pub fn begin_rendering(&mut self, descriptor: &RenderingPassDescriptor<'_>) -> VulkanResult<()> {
        self.expect_state(RecorderState::Recording, "begin a rendering pass")?;

        let views: Vec<vk::ImageView> = descriptor
            .color_attachments
            .iter()
            .map(|target| target.image_view)
            .collect();

        self.backend
            .cmd_begin_rendering(self.buffer, descriptor.rect.into(), &views, DEFAULT_CLEAR_COLOR);
        self.state = RecorderState::InPass;
        Ok(())
    }

    /// End the current color pass
    pub fn end_rendering(&mut self) -> VulkanResult<()> {
        self.expect_state(RecorderState::InPass, "end a rendering pass")?;

        self.backend.cmd_end_rendering(self.buffer);
        self.state = RecorderState::Recording;
        Ok(())
    }

    /// Transition `texture` to `target`; no-op if it is already there
    pub fn transition_texture_layout(&mut self, texture: TextureView, target: vk::ImageLayout) -> VulkanResult<()> {
        self.expect_state(RecorderState::Recording, "record a layout transition")?;

        let current = self.tracked_layout(texture.image);
        if current == target {
            return Ok(());
        }

        let barrier = layout_transition(texture.image, current, target);
        self.backend.cmd_image_barrier(self.buffer, &barrier);

        match self.layouts.iter_mut().find(|(image, _)| *image == texture.image) {
            Some(entry) => entry.1 = target,
            None => self.layouts.push((texture.image, target)),
        }

        Ok(())
    }

    /// Bind a graphics pipeline for subsequent draws
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) -> VulkanResult<()> {
        self.expect_state(RecorderState::InPass, "bind a pipeline")?;
        self.backend.cmd_bind_pipeline(self.buffer, pipeline);
        Ok(())
    }

    /// Cover `rect` with the dynamic viewport and scissor
    pub fn set_viewport_and_scissor(&mut self, rect: Rect2D) -> VulkanResult<()> {
        self.expect_state(RecorderState::InPass, "set the viewport")?;
        self.backend.cmd_set_viewport_and_scissor(self.buffer, rect.into());
        Ok(())
    }

    /// Draw `vertex_count` vertices with the bound pipeline
    pub fn draw(&mut self, vertex_count: u32) -> VulkanResult<()> {
        self.expect_state(RecorderState::InPass, "draw")?;
        self.backend.cmd_draw(self.buffer, vertex_count, 1);
        Ok(())
    }

    fn expect_state(&self, expected: RecorderState, action: &str) -> VulkanResult<()> {
        if self.state == expected {
            return Ok(());
        }

        let reason = match (expected, self.state) {
            (RecorderState::Recording, RecorderState::InPass) => format!("cannot {action} inside a rendering pass"),
            (RecorderState::InPass, RecorderState::Recording) => format!("cannot {action} outside a rendering pass"),
            _ => format!("cannot {action}: command buffer is not recording"),
        };

        Err(VulkanError::new(ErrorKind::InvalidOperation { reason }))
    }
}

impl<B: GpuBackend> Drop for CommandRecorder<B> {
    fn drop(&mut self) {
        if self.pool != vk::CommandPool::null() {
            self.backend.free_command_buffer(self.pool, self.buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::tests::mock::{MockGpu, RecordedCommand};

    fn recording(gpu: &MockGpu) -> CommandRecorder<crate::render::backends::vulkan::tests::mock::MockBackend> {
        let backend = Arc::new(gpu.backend());
        let pool = backend.create_command_pool().unwrap();
        let mut recorder = CommandRecorder::new(backend, pool).unwrap();
        recorder.begin().unwrap();
        recorder
    }

    fn texture(gpu: &MockGpu) -> TextureView {
        TextureView {
            image: gpu.fabricate_image(),
            image_view: vk::ImageView::null(),
        }
    }

    #[test]
    fn test_first_transition_starts_from_undefined() {
        let gpu = MockGpu::new();
        let mut recorder = recording(&gpu);
        let target = texture(&gpu);

        recorder
            .transition_texture_layout(target, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .unwrap();

        let commands = gpu.commands(recorder.raw());
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            RecordedCommand::Barrier(barrier) => {
                assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
                assert_eq!(barrier.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
                assert_eq!(barrier.dst_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
            }
            other => panic!("expected a barrier, got {other:?}"),
        }
    }

    #[test]
    fn test_transition_tracks_previous_layout() {
        let gpu = MockGpu::new();
        let mut recorder = recording(&gpu);
        let target = texture(&gpu);

        recorder
            .transition_texture_layout(target, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .unwrap();
        recorder
            .transition_texture_layout(target, vk::ImageLayout::PRESENT_SRC_KHR)
            .unwrap();

        let commands = gpu.commands(recorder.raw());
        match &commands[1] {
            RecordedCommand::Barrier(barrier) => {
                assert_eq!(barrier.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
                assert_eq!(barrier.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
                assert_eq!(barrier.src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
                assert_eq!(barrier.dst_access, vk::AccessFlags2::NONE);
            }
            other => panic!("expected a barrier, got {other:?}"),
        }
        assert_eq!(recorder.tracked_layout(target.image), vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn test_redundant_transition_is_skipped() {
        let gpu = MockGpu::new();
        let mut recorder = recording(&gpu);
        let target = texture(&gpu);

        recorder
            .transition_texture_layout(target, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .unwrap();
        recorder
            .transition_texture_layout(target, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .unwrap();

        assert_eq!(gpu.commands(recorder.raw()).len(), 1);
    }

    #[test]
    fn test_pass_state_is_enforced() {
        let gpu = MockGpu::new();
        let mut recorder = recording(&gpu);
        let target = texture(&gpu);
        let targets = [target];

        assert!(recorder.end_rendering().is_err());
        assert!(recorder.draw(3).is_err());

        recorder
            .begin_rendering(&RenderingPassDescriptor {
                rect: Rect2D::from_extent(64, 64),
                color_attachments: &targets,
            })
            .unwrap();

        let nested = recorder.begin_rendering(&RenderingPassDescriptor {
            rect: Rect2D::from_extent(64, 64),
            color_attachments: &targets,
        });
        assert!(nested.is_err());
        assert!(recorder
            .transition_texture_layout(target, vk::ImageLayout::PRESENT_SRC_KHR)
            .is_err());
        assert!(recorder.finish().is_err());

        recorder.end_rendering().unwrap();
        recorder.finish().unwrap();
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_reset_forgets_layouts() {
        let gpu = MockGpu::new();
        let mut recorder = recording(&gpu);
        let target = texture(&gpu);

        recorder
            .transition_texture_layout(target, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .unwrap();
        recorder.finish().unwrap();
        recorder.reset().unwrap();
        recorder.begin().unwrap();

        assert_eq!(recorder.tracked_layout(target.image), vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn test_begin_requires_reset() {
        let gpu = MockGpu::new();
        let mut recorder = recording(&gpu);
        recorder.finish().unwrap();

        assert!(recorder.begin().is_err());
    }

    #[test]
    fn test_drop_frees_buffer() {
        let gpu = MockGpu::new();
        let recorder = recording(&gpu);
        let buffer = recorder.raw();
        assert!(gpu.is_live(buffer));

        drop(recorder);

        assert!(!gpu.is_live(buffer));
    }
}
