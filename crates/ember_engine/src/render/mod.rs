//! # Rendering
//!
//! The Vulkan backend, the per-frame [`Renderer`] built on it, SPIR-V
//! loading and the window abstraction the renderer draws to.

pub mod backends;
pub mod renderer;
pub mod shader;
pub mod window;

pub use renderer::{FrameOutcome, Renderer};
pub use shader::{ShaderBytecode, ShaderError};
pub use window::Surface;
