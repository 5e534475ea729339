//! GPU context and the frame protocol
//!
//! [`GpuContext`] owns the device backend, the image chain, the command pool
//! and the queue synchronization state. A frame is bracketed by
//! [`GpuContext::begin_frame`] and [`GpuContext::end_frame`]:
//!
//! 1. acquire the next image, signaling the spare semaphore
//! 2. swap the spare into the image's slot
//! 3. wait on the timeline for the slot's previous submission to retire
//! 4. reset and begin the slot's recorder
//! 5. (caller records)
//! 6. transition the image for presentation, submit, present
//!
//! With N images in the chain up to N frames are in flight; the timeline wait
//! in step 3 is the only CPU stall.
//!
//! An acquired image stays with the context until a submission consumes its
//! acquire semaphore. If anything between steps 1 and 6 fails (a timeline
//! wait timing out, a rejected submit, an abandoned frame), the next
//! `begin_frame` picks the same image up again instead of acquiring another.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;

use super::backend::{FrameSubmission, GpuBackend};
use super::initialization::device::VulkanDevice;
use super::initialization::error::{ErrorKind, VulkanError, VulkanResult};
use super::initialization::window::Window;
use super::rendering::commands::{CommandRecorder, TextureView};
use super::rendering::pipeline::{RenderPipeline, RenderPipelineDesc};
use super::state::swapchain::{ImageChain, ImageSlot};
use super::state::sync::QueueSync;
use crate::core::config::RendererConfig;
use crate::foundation;
use crate::platform::PlatformGuard;
use crate::render::window::Surface;

/// Handle to the frame between `begin_frame` and `end_frame`
///
/// Only the context hands these out, and `end_frame` consumes it.
#[derive(Debug)]
pub struct Frame {
    slot: usize,
    serial: u64,
    extent: vk::Extent2D,
}

impl Frame {
    /// Extent of the image chain the frame was acquired from
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Index of the acquired image
    pub fn image_index(&self) -> usize {
        self.slot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveFrame {
    slot: usize,
    serial: u64,
}

/// Device, image chain and synchronization owner
pub struct GpuContext<B: GpuBackend> {
    backend: Arc<B>,
    pool: vk::CommandPool,
    sync: QueueSync,
    chain: ImageChain<B>,
    active: Option<ActiveFrame>,
    // Acquired image whose acquire semaphore no submission has waited on yet
    held: Option<usize>,
    next_serial: u64,
    timeout: Duration,
    min_image_count: u32,
}

impl GpuContext<VulkanDevice> {
    /// Create a context rendering to `window`
    pub fn with_window(platform: &PlatformGuard, window: &mut Window, config: &RendererConfig) -> VulkanResult<Self> {
        let device = VulkanDevice::new(platform, window, config)?;
        let (width, height) = window.framebuffer_size();
        Self::new(device, vk::Extent2D { width, height }, config)
    }
}

impl<B: GpuBackend> GpuContext<B> {
    /// Create a context on `backend` with an image chain of `extent`
    pub fn new(backend: B, extent: vk::Extent2D, config: &RendererConfig) -> VulkanResult<Self> {
        let backend = Arc::new(backend);

        let pool = backend.create_command_pool()?;

        let mut sync = match QueueSync::new(backend.as_ref()) {
            Ok(sync) => sync,
            Err(err) => {
                backend.destroy_command_pool(pool);
                return Err(err);
            }
        };

        let chain = match ImageChain::new(&backend, pool, extent, config.min_image_count) {
            Ok(chain) => chain,
            Err(err) => {
                sync.destroy(backend.as_ref());
                backend.destroy_command_pool(pool);
                return Err(err);
            }
        };

        log::info!("GPU context ready with {} swapchain images", chain.len());

        Ok(Self {
            backend,
            pool,
            sync,
            chain,
            active: None,
            held: None,
            next_serial: 0,
            timeout: Duration::from_millis(config.acquire_timeout_ms),
            min_image_count: config.min_image_count,
        })
    }

    /// Acquire the next image and start recording into its slot
    pub fn begin_frame(&mut self) -> VulkanResult<Frame> {
        if self.active.is_some() {
            return Err(VulkanError::new(ErrorKind::FrameInProgress));
        }

        let timeout_ns = u64::try_from(self.timeout.as_nanos()).unwrap_or(u64::MAX);

        let index = match self.held {
            Some(index) => {
                log::debug!("[FRAME] Resuming image {} acquired by an unfinished frame", index);
                index
            }
            None => {
                let index = self.acquire(timeout_ns)?;
                self.held = Some(index);
                index
            }
        };
        let prev_progress = self.slot_mut(index)?.prev_progress;
        self.backend
            .wait_timeline(self.sync.timeline(), prev_progress, timeout_ns)?;

        let slot = self.slot_mut(index)?;
        slot.recorder.reset()?;
        slot.recorder.begin()?;

        let serial = self.next_serial;
        self.next_serial += 1;
        self.active = Some(ActiveFrame { slot: index, serial });

        Ok(Frame {
            slot: index,
            serial,
            extent: self.chain.extent(),
        })
    }

    /// Close `frame` without submitting it
    ///
    /// Recorded commands are discarded. The image stays acquired and the next
    /// `begin_frame` renders into it again.
    pub fn abandon_frame(&mut self, frame: Frame) -> VulkanResult<()> {
        self.check_frame(&frame)?;
        self.active = None;
        log::debug!("[FRAME] Frame on image {} abandoned", frame.slot);
        Ok(())
    }

    /// Finish recording, submit and present the frame
    ///
    /// Submit and present failures are logged and returned. The progress
    /// counter only advances when submission succeeds.
    pub fn end_frame(&mut self, frame: Frame) -> VulkanResult<()> {
        let active = self.check_frame(&frame)?;
        self.active = None;

        let swapchain = self.chain.handle();
        let slot = self
            .chain
            .slot_mut(active.slot)
            .ok_or_else(|| VulkanError::new(ErrorKind::InvalidFrame))?;

        let texture = slot.texture_view();
        slot.recorder
            .transition_texture_layout(texture, vk::ImageLayout::PRESENT_SRC_KHR)?;
        slot.recorder.finish()?;

        let submission = FrameSubmission {
            command_buffer: slot.recorder.raw(),
            wait_semaphore: slot.acquire_semaphore,
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            timeline_semaphore: self.sync.timeline(),
            signal_value: self.sync.next_value(),
            present_semaphore: self.sync.present(),
        };

        // A rejected submit leaves the acquire semaphore signaled, so the
        // image stays held for the next frame
        if let Err(err) = self.backend.queue_submit(&submission) {
            log::error!("Unable to submit frame {}: {}", submission.signal_value, err);
            return Err(err);
        }
        slot.prev_progress = self.sync.advance();
        self.held = None;

        match self
            .backend
            .queue_present(swapchain, active.slot as u32, self.sync.present())
        {
            Ok(suboptimal) => {
                if suboptimal {
                    log::debug!("[FRAME] Presented to a suboptimal swapchain");
                }
                Ok(())
            }
            Err(err) => {
                if err.is_out_of_date() {
                    log::warn!("Swapchain out of date at present");
                } else {
                    log::error!("Unable to present frame {}: {}", self.sync.progress(), err);
                }
                Err(err)
            }
        }
    }

    /// Rebuild the image chain at `width`×`height`, returning any failure
    pub fn try_resize(&mut self, width: u32, height: u32) -> VulkanResult<()> {
        if self.active.is_some() {
            return Err(VulkanError::new(ErrorKind::InvalidOperation {
                reason: "cannot resize the swapchain while a frame is in progress".to_string(),
            }));
        }

        self.backend.queue_wait_idle()?;

        let extent = vk::Extent2D { width, height };
        // The held image belongs to the retired swapchain
        self.held = None;
        self.chain
            .rebuild(&self.backend, self.pool, extent, self.min_image_count)?;

        log::info!("Swapchain resized to {}x{}", width, height);
        Ok(())
    }

    /// Rebuild the image chain at `width`×`height`; failure is fatal
    #[track_caller]
    pub fn resize(&mut self, width: u32, height: u32) {
        if let Err(err) = self.try_resize(width, height) {
            foundation::fatal("Unable to resize swapchain", &err);
        }
    }

    /// Build a pipeline on this context's device
    ///
    /// Without an explicit color format the pipeline targets the swapchain format.
    pub fn create_render_pipeline(&self, desc: &RenderPipelineDesc<'_>) -> VulkanResult<RenderPipeline<B>> {
        let color_format = desc.color_format.unwrap_or(self.chain.format().format);
        RenderPipeline::new(Arc::clone(&self.backend), desc, color_format)
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.backend.device_wait_idle()
    }

    /// Recorder of the active frame
    pub fn command_recorder(&mut self, frame: &Frame) -> VulkanResult<&mut CommandRecorder<B>> {
        let active = self.check_frame(frame)?;
        Ok(&mut self.slot_mut(active.slot)?.recorder)
    }

    /// Render target of the active frame
    pub fn texture_view(&self, frame: &Frame) -> VulkanResult<TextureView> {
        let active = self.check_frame(frame)?;
        self.chain
            .slot(active.slot)
            .map(|slot| slot.texture_view())
            .ok_or_else(|| VulkanError::new(ErrorKind::InvalidFrame))
    }

    /// Current image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.chain.extent()
    }

    /// Swapchain format and color space
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.chain.format()
    }

    /// Number of images in the chain
    pub fn image_count(&self) -> usize {
        self.chain.len()
    }

    /// Number of frames submitted so far
    pub fn progress(&self) -> u64 {
        self.sync.progress()
    }

    /// Progress value slot `index` waits for before reuse
    pub fn slot_progress(&self, index: usize) -> Option<u64> {
        self.chain.slot(index).map(|slot| slot.prev_progress())
    }

    fn acquire(&mut self, timeout_ns: u64) -> VulkanResult<usize> {
        let acquired = self
            .backend
            .acquire_next_image(self.chain.handle(), timeout_ns, self.sync.spare())?;
        if acquired.suboptimal {
            log::debug!("[FRAME] Acquired image {} from a suboptimal swapchain", acquired.index);
        }

        let index = acquired.index as usize;
        let slot = self.chain.slot_mut(index).ok_or_else(|| {
            VulkanError::new(ErrorKind::InvalidOperation {
                reason: format!("acquired image index {index} is outside the swapchain"),
            })
        })?;

        self.sync.exchange_spare(&mut slot.acquire_semaphore);
        Ok(index)
    }

    /// Image acquired by a frame that has not been submitted yet
    pub fn held_image(&self) -> Option<usize> {
        self.held
    }

    fn check_frame(&self, frame: &Frame) -> VulkanResult<ActiveFrame> {
        match self.active {
            Some(active) if active.slot == frame.slot && active.serial == frame.serial => Ok(active),
            _ => Err(VulkanError::new(ErrorKind::InvalidFrame)),
        }
    }

    fn slot_mut(&mut self, index: usize) -> VulkanResult<&mut ImageSlot<B>> {
        self.chain
            .slot_mut(index)
            .ok_or_else(|| VulkanError::new(ErrorKind::InvalidFrame))
    }
}

impl<B: GpuBackend> Drop for GpuContext<B> {
    fn drop(&mut self) {
        if let Err(err) = self.backend.device_wait_idle() {
            log::error!("Failed to wait for device idle during teardown: {}", err);
        }

        self.chain.destroy_slots(self.backend.as_ref());
        self.sync.destroy(self.backend.as_ref());
        self.chain.destroy(self.backend.as_ref());

        if self.pool != vk::CommandPool::null() {
            self.backend.destroy_command_pool(self.pool);
            self.pool = vk::CommandPool::null();
        }

        log::debug!("[CONTEXT] GPU context destroyed");
    }
}
