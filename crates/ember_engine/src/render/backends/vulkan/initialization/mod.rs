//! Vulkan initialization modules

/// Error types
pub mod error;

/// Instance and debug messenger
pub mod instance;

/// Physical device selection and the logical device
pub mod device;

/// GLFW window
pub mod window;
