//! # Ember Engine
//!
//! Frame lifecycle for a Vulkan renderer: device bring-up, a swapchain image
//! chain, timeline-semaphore queue synchronization, command recording and
//! graphics pipelines, driven once per frame by a [`render::Renderer`].
//!
//! ## Features
//!
//! - **Vulkan 1.3**: dynamic rendering and synchronization2, no render passes
//! - **Bounded latency**: one frame in flight per swapchain image
//! - **Typed frames**: a [`render::backends::vulkan::Frame`] token brackets every frame
//! - **Configurable**: TOML or RON configuration files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ember_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ApplicationConfig::default();
//!     logging::init(&config.engine.log_level);
//!
//!     let platform = PlatformGuard::init()?;
//!     let mut window = Window::new(&platform, &config.window)?;
//!     let context = GpuContext::with_window(&platform, &mut window, &config.renderer)?;
//!     let mut renderer = Renderer::new(context);
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         renderer.render(&window)?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod platform;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::{ApplicationConfig, Config, ConfigError, RendererConfig, ShaderConfig, WindowConfig},
        foundation::logging,
        platform::{PlatformError, PlatformGuard},
        render::{
            backends::vulkan::{
                ErrorKind, Frame, GpuContext, RenderPipelineDesc, VulkanDevice, VulkanError, VulkanResult, Window,
                WindowError,
            },
            FrameOutcome, Renderer, ShaderBytecode, ShaderError, Surface,
        },
    };
}
