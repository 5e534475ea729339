//! Graphics pipeline object
//!
//! A [`RenderPipeline`] is built once from vertex and fragment SPIR-V and a
//! fixed-function configuration, and is immutable afterwards. Shader modules
//! only live for the duration of creation.

use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::backend::{GpuBackend, GraphicsPipelineRequest};
use crate::render::backends::vulkan::initialization::error::{ErrorKind, ShaderStage, VulkanError, VulkanResult};

/// Fixed-function configuration baked into a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct FixedFunctionState {
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Rasterization polygon mode
    pub polygon_mode: vk::PolygonMode,
    /// Face culling
    pub cull_mode: vk::CullModeFlags,
    /// Winding order of front faces
    pub front_face: vk::FrontFace,
    /// Rasterization sample count
    pub samples: vk::SampleCountFlags,
    /// Whether color blending is enabled on every target
    pub blend_enabled: bool,
    /// Channels written to every color target
    pub color_write_mask: vk::ColorComponentFlags,
    /// State left dynamic and set while recording
    pub dynamic_states: Vec<vk::DynamicState>,
}

impl Default for FixedFunctionState {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            samples: vk::SampleCountFlags::TYPE_1,
            blend_enabled: false,
            color_write_mask: vk::ColorComponentFlags::RGBA,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }
}

/// Description of a pipeline to build
#[derive(Debug, Clone)]
pub struct RenderPipelineDesc<'a> {
    /// Vertex stage SPIR-V
    pub vertex_code: &'a [u32],
    /// Vertex stage entry point
    pub vertex_entry: &'a str,
    /// Fragment stage SPIR-V
    pub fragment_code: &'a [u32],
    /// Fragment stage entry point
    pub fragment_entry: &'a str,
    /// Color target format; `None` uses the swapchain format
    pub color_format: Option<vk::Format>,
    /// Fixed-function configuration
    pub fixed_function: FixedFunctionState,
}

impl<'a> RenderPipelineDesc<'a> {
    /// Describe a pipeline with default fixed-function state and `main` entry points
    pub fn new(vertex_code: &'a [u32], fragment_code: &'a [u32]) -> Self {
        Self {
            vertex_code,
            vertex_entry: "main",
            fragment_code,
            fragment_entry: "main",
            color_format: None,
            fixed_function: FixedFunctionState::default(),
        }
    }
}

/// Immutable compiled draw configuration
pub struct RenderPipeline<B: GpuBackend> {
    backend: Arc<B>,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    color_format: vk::Format,
}

/// Destroys a shader module when dropped
struct TransientModule<'a, B: GpuBackend> {
    backend: &'a B,
    module: vk::ShaderModule,
}

impl<B: GpuBackend> Drop for TransientModule<'_, B> {
    fn drop(&mut self) {
        if self.module != vk::ShaderModule::null() {
            self.backend.destroy_shader_module(self.module);
        }
    }
}

impl<B: GpuBackend> RenderPipeline<B> {
    /// Build a pipeline rendering into `color_format` targets
    pub(crate) fn new(backend: Arc<B>, desc: &RenderPipelineDesc<'_>, color_format: vk::Format) -> VulkanResult<Self> {
        if desc.vertex_code.is_empty() {
            return Err(VulkanError::new(ErrorKind::EmptyShaderBytecode {
                stage: ShaderStage::Vertex,
            }));
        }
        if desc.fragment_code.is_empty() {
            return Err(VulkanError::new(ErrorKind::EmptyShaderBytecode {
                stage: ShaderStage::Fragment,
            }));
        }

        let vertex = TransientModule {
            backend: backend.as_ref(),
            module: backend.create_shader_module(desc.vertex_code)?,
        };
        log::debug!("[PIPELINE] Vertex module created ({} words)", desc.vertex_code.len());

        let fragment = TransientModule {
            backend: backend.as_ref(),
            module: backend.create_shader_module(desc.fragment_code)?,
        };
        log::debug!("[PIPELINE] Fragment module created ({} words)", desc.fragment_code.len());

        let layout = backend.create_empty_pipeline_layout()?;

        let color_formats = [color_format];
        let request = GraphicsPipelineRequest {
            vertex_module: vertex.module,
            vertex_entry: desc.vertex_entry,
            fragment_module: fragment.module,
            fragment_entry: desc.fragment_entry,
            layout,
            color_formats: &color_formats,
            fixed_function: &desc.fixed_function,
        };

        let pipeline = match backend.create_graphics_pipeline(&request) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                backend.destroy_pipeline_layout(layout);
                return Err(err);
            }
        };

        drop(fragment);
        drop(vertex);

        log::debug!("[PIPELINE] Graphics pipeline created for {:?} targets", color_format);

        Ok(Self {
            backend,
            pipeline,
            layout,
            color_format,
        })
    }

    /// Raw pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Pipeline layout
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Color target format the pipeline was built for
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }
}

impl<B: GpuBackend> Drop for RenderPipeline<B> {
    fn drop(&mut self) {
        if self.pipeline != vk::Pipeline::null() {
            self.backend.destroy_pipeline(self.pipeline);
        }
        if self.layout != vk::PipelineLayout::null() {
            self.backend.destroy_pipeline_layout(self.layout);
        }
        log::debug!("[PIPELINE] Graphics pipeline destroyed");
    }
}
