//! # Core Engine Module
//!
//! Shared configuration used by the renderer and the application shell.

pub mod config;

pub use config::{
    ApplicationConfig, Config, ConfigError, EngineConfig, PresentModePreference, RendererConfig, ShaderConfig,
    WindowConfig,
};
