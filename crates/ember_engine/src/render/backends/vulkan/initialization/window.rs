//! Window management using GLFW
//!
//! Provides the native window the GPU context presents to, and the event
//! stream the application loop polls.

use thiserror::Error;

use crate::core::config::WindowConfig;
use crate::platform::PlatformGuard;
use crate::render::window::Surface;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW refused to create the window
    #[error("window creation failed: {title:?} ({width}x{height})")]
    CreationFailed {
        /// Requested title
        title: String,
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// GLFW could not provide the instance extensions Vulkan needs
    #[error("GLFW reports no Vulkan support on this system")]
    VulkanUnsupported,

    /// Native surface creation failed
    #[error("failed to create Vulkan surface: {0:?}")]
    SurfaceCreationFailed(ash::vk::Result),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// GLFW window wrapper
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    /// Open a resizable window without a client API, ready for Vulkan
    pub fn new(platform: &PlatformGuard, config: &WindowConfig) -> WindowResult<Self> {
        let mut glfw = platform.glfw().clone();

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or_else(|| WindowError::CreationFailed {
                title: config.title.clone(),
                width: config.width,
                height: config.height,
            })?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::info!("Window created: {:?} {}x{}", config.title, config.width, config.height);

        Ok(Self { glfw, window, events })
    }

    /// Process pending window system events
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
    }

    /// Drain the events received since the last poll
    pub fn flush_events(&self) -> glfw::FlushedMessages<'_, (f64, glfw::WindowEvent)> {
        glfw::flush_messages(&self.events)
    }

    /// Request (or cancel a request) to close the window
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Instance extensions GLFW needs to create a surface
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or(WindowError::VulkanUnsupported)
    }

    /// Create a Vulkan surface for this window
    pub fn create_vulkan_surface(&mut self, instance: ash::vk::Instance) -> WindowResult<ash::vk::SurfaceKHR> {
        let mut surface = ash::vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == ash::vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::SurfaceCreationFailed(result))
        }
    }
}

impl Surface for Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    fn should_close(&self) -> bool {
        self.window.should_close()
    }
}
