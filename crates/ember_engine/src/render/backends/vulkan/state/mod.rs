//! Vulkan state modules

/// Swapchain images and their per-slot state
pub mod swapchain;

/// Timeline and present semaphores
pub mod sync;
