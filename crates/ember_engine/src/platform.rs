//! Process-wide platform session
//!
//! [`PlatformGuard`] initializes GLFW and loads the Vulkan loader. Only one
//! guard may exist at a time; create it at the top of `main` and keep it
//! alive until every window and GPU context is gone.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

static PLATFORM_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Platform initialization errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Another guard is still alive
    #[error("the platform is already initialized")]
    AlreadyInitialized,

    /// GLFW could not be initialized
    #[error("GLFW initialization failed: {0}")]
    Glfw(String),

    /// The Vulkan loader library could not be loaded
    #[error("failed to load the Vulkan loader: {0}")]
    VulkanLoader(String),
}

/// Windowing and Vulkan loader session
pub struct PlatformGuard {
    glfw: glfw::Glfw,
    entry: ash::Entry,
}

impl PlatformGuard {
    /// Initialize GLFW and load Vulkan
    pub fn init() -> Result<Self, PlatformError> {
        let session = Session::claim()?;

        let glfw = glfw::init(glfw_error_callback).map_err(|err| PlatformError::Glfw(format!("{err:?}")))?;

        if !glfw.vulkan_supported() {
            return Err(PlatformError::VulkanLoader(
                "GLFW did not find a Vulkan loader".to_string(),
            ));
        }

        let entry = unsafe { ash::Entry::load() }.map_err(|err| PlatformError::VulkanLoader(err.to_string()))?;

        log::info!("Platform initialized (GLFW {})", glfw::get_version_string());

        std::mem::forget(session);
        Ok(Self { glfw, entry })
    }

    /// GLFW handle
    pub fn glfw(&self) -> &glfw::Glfw {
        &self.glfw
    }

    /// Vulkan loader entry points
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }
}

impl Drop for PlatformGuard {
    fn drop(&mut self) {
        PLATFORM_ACTIVE.store(false, Ordering::Release);
        log::debug!("[PLATFORM] Platform session ended");
    }
}

/// Claim on the process-wide flag, released on drop unless forgotten
struct Session;

impl Session {
    fn claim() -> Result<Self, PlatformError> {
        PLATFORM_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self)
            .map_err(|_| PlatformError::AlreadyInitialized)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        PLATFORM_ACTIVE.store(false, Ordering::Release);
    }
}

fn glfw_error_callback(error: glfw::Error, description: String) {
    log::error!("GLFW error {:?}: {}", error, description);
}
