//! Presentable image chain and per-image bookkeeping
//!
//! Each swapchain image gets an [`ImageSlot`] holding its view, the
//! semaphore its acquisition signals, the command recorder that renders into
//! it, and the progress value its last submission signals. A slot must not be
//! reset or rewritten before the timeline reaches that value.

use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::backend::{GpuBackend, SwapchainRequest};
use crate::render::backends::vulkan::initialization::error::VulkanResult;
use crate::render::backends::vulkan::rendering::commands::{CommandRecorder, TextureView};

/// Resources tied to one presentable image
pub struct ImageSlot<B: GpuBackend> {
    pub(crate) image: vk::Image,
    pub(crate) view: vk::ImageView,
    pub(crate) acquire_semaphore: vk::Semaphore,
    pub(crate) recorder: CommandRecorder<B>,
    pub(crate) prev_progress: u64,
}

impl<B: GpuBackend> ImageSlot<B> {
    /// Image and view as a render target
    pub fn texture_view(&self) -> TextureView {
        TextureView {
            image_view: self.view,
            image: self.image,
        }
    }

    /// Progress value that must be reached before this slot is reused
    pub fn prev_progress(&self) -> u64 {
        self.prev_progress
    }

    fn destroy(self, backend: &B) {
        if self.acquire_semaphore != vk::Semaphore::null() {
            backend.destroy_semaphore(self.acquire_semaphore);
        }
        if self.view != vk::ImageView::null() {
            backend.destroy_image_view(self.view);
        }
        // Frees the command buffer; the pool stays alive
        drop(self.recorder);
    }
}

/// Swapchain plus one [`ImageSlot`] per image
pub struct ImageChain<B: GpuBackend> {
    handle: vk::SwapchainKHR,
    extent: vk::Extent2D,
    format: vk::SurfaceFormatKHR,
    slots: Vec<ImageSlot<B>>,
}

impl<B: GpuBackend> ImageChain<B> {
    /// Create a chain of at least `min_image_count` images at `extent`
    pub fn new(
        backend: &Arc<B>,
        pool: vk::CommandPool,
        extent: vk::Extent2D,
        min_image_count: u32,
    ) -> VulkanResult<Self> {
        let info = backend.create_swapchain(&SwapchainRequest {
            extent,
            min_image_count,
            old_swapchain: vk::SwapchainKHR::null(),
        })?;

        let mut chain = Self {
            handle: info.handle,
            extent: info.extent,
            format: info.format,
            slots: Vec::new(),
        };

        if let Err(err) = chain.build_slots(backend, pool) {
            chain.destroy(backend.as_ref());
            return Err(err);
        }

        log::info!(
            "Swapchain created: {}x{}, {} images, {:?}",
            chain.extent.width,
            chain.extent.height,
            chain.slots.len(),
            chain.format.format
        );

        Ok(chain)
    }

    /// Rebuild the chain at `extent`
    ///
    /// The caller must make sure no submitted work still references the
    /// current slots. The old swapchain is handed to the platform as a reuse
    /// hint and destroyed once the new one exists.
    pub fn rebuild(
        &mut self,
        backend: &Arc<B>,
        pool: vk::CommandPool,
        extent: vk::Extent2D,
        min_image_count: u32,
    ) -> VulkanResult<()> {
        self.destroy_slots(backend.as_ref());

        let info = backend.create_swapchain(&SwapchainRequest {
            extent,
            min_image_count,
            old_swapchain: self.handle,
        })?;

        let old = std::mem::replace(&mut self.handle, info.handle);
        self.extent = info.extent;
        self.format = info.format;

        let built = self.build_slots(backend, pool);

        if old != vk::SwapchainKHR::null() {
            backend.destroy_swapchain(old);
        }
        built?;

        log::info!(
            "Swapchain rebuilt: {}x{}, {} images",
            self.extent.width,
            self.extent.height,
            self.slots.len()
        );

        Ok(())
    }

    fn build_slots(&mut self, backend: &Arc<B>, pool: vk::CommandPool) -> VulkanResult<()> {
        let images = backend.swapchain_images(self.handle)?;

        for image in images {
            let view = backend.create_image_view(image, self.format.format)?;

            let acquire_semaphore = match backend.create_semaphore() {
                Ok(semaphore) => semaphore,
                Err(err) => {
                    backend.destroy_image_view(view);
                    self.destroy_slots(backend.as_ref());
                    return Err(err);
                }
            };

            let recorder = match CommandRecorder::new(Arc::clone(backend), pool) {
                Ok(recorder) => recorder,
                Err(err) => {
                    backend.destroy_semaphore(acquire_semaphore);
                    backend.destroy_image_view(view);
                    self.destroy_slots(backend.as_ref());
                    return Err(err);
                }
            };

            self.slots.push(ImageSlot {
                image,
                view,
                acquire_semaphore,
                recorder,
                prev_progress: 0,
            });
        }

        log::debug!("[SWAPCHAIN] {} image slots ready", self.slots.len());
        Ok(())
    }

    /// Destroy every slot's view, semaphore and command buffer
    pub fn destroy_slots(&mut self, backend: &B) {
        for slot in self.slots.drain(..) {
            slot.destroy(backend);
        }
    }

    /// Destroy the slots and the swapchain
    pub fn destroy(&mut self, backend: &B) {
        self.destroy_slots(backend);
        if self.handle != vk::SwapchainKHR::null() {
            backend.destroy_swapchain(self.handle);
            self.handle = vk::SwapchainKHR::null();
        }
    }

    /// Swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Image format and color space
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Number of images (and slots)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the chain has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot for image `index`
    pub fn slot(&self, index: usize) -> Option<&ImageSlot<B>> {
        self.slots.get(index)
    }

    /// Mutable slot for image `index`
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut ImageSlot<B>> {
        self.slots.get_mut(index)
    }
}
