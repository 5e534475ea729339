//! Frame protocol scenarios against the simulated GPU


mod frame_protocol;
mod resize;

use ash::vk;

use self::mock::{MockBackend, MockGpu};
use super::context::GpuContext;
use crate::core::config::RendererConfig;

/// Smallest well-formed SPIR-V header
pub const SPIRV: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 1, 0];

/// Context on `gpu` with a `width`×`height` image chain
pub fn context(gpu: &MockGpu, width: u32, height: u32) -> GpuContext<MockBackend> {
    GpuContext::new(gpu.backend(), vk::Extent2D { width, height }, &RendererConfig::default())
        .expect("mock context creation")
}
