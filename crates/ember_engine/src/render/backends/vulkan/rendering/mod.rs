//! Vulkan rendering modules

/// Command buffer recording
pub mod commands;

/// Graphics pipelines
pub mod pipeline;
