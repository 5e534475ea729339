//! # Application Configuration
//!
//! Settings for logging, the window and the renderer. Every section has
//! defaults, so a configuration file only needs the values it changes:
//!
//! ```toml
//! [window]
//! title = "Ember"
//! width = 1920
//! height = 1080
//!
//! [renderer]
//! acquire_timeout_ms = 2000
//! present_mode = "mailbox"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Directories searched for compiled shaders, in order
const SHADER_DIRS: [&str; 4] = ["target/shaders", "shaders", "resources/shaders", "../target/shaders"];

/// # Shader Configuration
///
/// SPIR-V file names of the built-in triangle pipeline. Relative names are
/// looked up in the usual build output directories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Vertex shader SPIR-V file
    pub vertex_shader: String,
    /// Fragment shader SPIR-V file
    pub fragment_shader: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex_shader: vertex.into(),
            fragment_shader: fragment.into(),
        }
    }

    /// Locate the vertex shader
    pub fn vertex_path(&self) -> PathBuf {
        resolve_shader(&self.vertex_shader)
    }

    /// Locate the fragment shader
    pub fn fragment_path(&self) -> PathBuf {
        resolve_shader(&self.fragment_shader)
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::new("triangle.vert.spv", "triangle.frag.spv")
    }
}

/// First existing candidate for `name`, or `name` itself
fn resolve_shader(name: &str) -> PathBuf {
    let direct = Path::new(name);
    if direct.is_absolute() || direct.exists() {
        return direct.to_path_buf();
    }

    SHADER_DIRS
        .iter()
        .map(|dir| Path::new(dir).join(name))
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| direct.to_path_buf())
}

/// Presentation pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentModePreference {
    /// Vertical sync; always available
    #[default]
    Fifo,
    /// Low-latency triple buffering
    Mailbox,
    /// No synchronization; may tear
    Immediate,
}

/// # Renderer Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the driver
    pub application_name: String,
    /// Whether to enable validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Deadline for image acquisition and for waiting on GPU progress
    pub acquire_timeout_ms: u64,
    /// Minimum number of swapchain images to request
    pub min_image_count: u32,
    /// Preferred present mode, falling back to FIFO
    pub present_mode: PresentModePreference,
    /// Built-in pipeline shaders
    pub shaders: ShaderConfig,
}

impl RendererConfig {
    /// Create a renderer configuration with defaults
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            enable_validation: None,
            acquire_timeout_ms: 5000,
            min_image_count: 2,
            present_mode: PresentModePreference::Fifo,
            shaders: ShaderConfig::default(),
        }
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the acquisition and progress deadline
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("application name cannot be empty".to_string()));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(ConfigError::Invalid("acquire timeout must be positive".to_string()));
        }
        if self.min_image_count < 2 {
            return Err(ConfigError::Invalid(format!(
                "at least 2 swapchain images are required, got {}",
                self.min_image_count
            )));
        }
        if self.shaders.vertex_shader.is_empty() || self.shaders.fragment_shader.is_empty() {
            return Err(ConfigError::Invalid("shader file names cannot be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Ember")
    }
}

/// # Window Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Title bar text
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl WindowConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.title.is_empty() {
            return Err(ConfigError::Invalid("window title cannot be empty".to_string()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// # Engine Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter; `RUST_LOG` takes precedence
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// # Complete Application Configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine-wide settings
    pub engine: EngineConfig,
    /// Window settings
    pub window: WindowConfig,
    /// Renderer settings
    pub renderer: RendererConfig,
}

impl ApplicationConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window.validate()?;
        self.renderer.validate()
    }
}

impl Config for ApplicationConfig {}
