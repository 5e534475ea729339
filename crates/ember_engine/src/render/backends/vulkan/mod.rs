//! Vulkan backend implementation
//!
//! Organized into initialization, rendering and state modules, with the
//! frame protocol in [`context`]. Everything above the device talks to the
//! GPU through the [`GpuBackend`] trait.

/// Device-level operations used by the frame protocol
pub mod backend;

/// GPU context and frame lifecycle
pub mod context;

/// Vulkan initialization types (instance, device, window, errors)
pub mod initialization;

/// Command recording and pipelines
pub mod rendering;

/// Image chain and queue synchronization
pub mod state;

#[cfg(test)]
pub(crate) mod tests;

pub use backend::GpuBackend;
pub use context::{Frame, GpuContext};

pub use initialization::device::VulkanDevice;
pub use initialization::error::{ErrorKind, ShaderStage, VulkanError, VulkanResult};
pub use initialization::window::{Window, WindowError};

pub use rendering::commands::{CommandRecorder, Rect2D, RenderingPassDescriptor, TextureView, DEFAULT_CLEAR_COLOR};
pub use rendering::pipeline::{FixedFunctionState, RenderPipeline, RenderPipelineDesc};
