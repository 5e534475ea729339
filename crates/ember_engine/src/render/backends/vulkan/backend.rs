//! Device-level operations used by the frame protocol
//!
//! [`GpuBackend`] is the seam between the frame-lifecycle logic (context, image
//! chain, queue synchronization, command recording, pipelines) and the Vulkan
//! device that actually executes it. [`VulkanDevice`](super::VulkanDevice)
//! implements it on top of `ash`; the test suite implements it with a
//! simulated GPU so the synchronization rules can be checked without hardware.
//!
//! The trait speaks plain `vk` handle types. Implementations are expected to
//! treat every handle they receive as one they created themselves.

use ash::vk;

use super::initialization::error::VulkanResult;
use super::rendering::pipeline::FixedFunctionState;

/// Swapchain creation request
#[derive(Debug, Clone, Copy)]
pub struct SwapchainRequest {
    /// Desired image extent, usually the surface framebuffer size
    pub extent: vk::Extent2D,
    /// Minimum number of presentable images to ask for
    pub min_image_count: u32,
    /// Previous chain, passed to the platform as a reuse hint
    pub old_swapchain: vk::SwapchainKHR,
}

/// A created swapchain and the parameters the platform settled on
#[derive(Debug, Clone, Copy)]
pub struct SwapchainInfo {
    /// Swapchain handle
    pub handle: vk::SwapchainKHR,
    /// Actual image extent
    pub extent: vk::Extent2D,
    /// Image format and color space
    pub format: vk::SurfaceFormatKHR,
}

/// Result of a successful image acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index of the acquired image within the chain
    pub index: u32,
    /// The chain no longer matches the surface exactly but is still usable
    pub suboptimal: bool,
}

/// One image layout transition with its memory dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    /// Image being transitioned
    pub image: vk::Image,
    /// Layout the image is currently in
    pub old_layout: vk::ImageLayout,
    /// Layout after the barrier
    pub new_layout: vk::ImageLayout,
    /// Stages that must complete before the transition
    pub src_stage: vk::PipelineStageFlags2,
    /// Writes made available by the transition
    pub src_access: vk::AccessFlags2,
    /// Stages that wait for the transition
    pub dst_stage: vk::PipelineStageFlags2,
    /// Accesses made visible after the transition
    pub dst_access: vk::AccessFlags2,
}

/// Everything needed to submit one frame's command buffer
#[derive(Debug, Clone, Copy)]
pub struct FrameSubmission {
    /// Recorded command buffer
    pub command_buffer: vk::CommandBuffer,
    /// Binary semaphore signaled when the target image was acquired
    pub wait_semaphore: vk::Semaphore,
    /// Stage at which the acquire wait applies
    pub wait_stage: vk::PipelineStageFlags,
    /// Timeline semaphore tracking GPU progress
    pub timeline_semaphore: vk::Semaphore,
    /// Value the timeline semaphore is signaled with on completion
    pub signal_value: u64,
    /// Binary semaphore signaled for the present request
    pub present_semaphore: vk::Semaphore,
}

/// Inputs for graphics pipeline creation
#[derive(Debug, Clone)]
pub struct GraphicsPipelineRequest<'a> {
    /// Vertex stage module
    pub vertex_module: vk::ShaderModule,
    /// Vertex stage entry point
    pub vertex_entry: &'a str,
    /// Fragment stage module
    pub fragment_module: vk::ShaderModule,
    /// Fragment stage entry point
    pub fragment_entry: &'a str,
    /// Pipeline layout
    pub layout: vk::PipelineLayout,
    /// Formats of the color targets used with dynamic rendering
    pub color_formats: &'a [vk::Format],
    /// Fixed-function configuration
    pub fixed_function: &'a FixedFunctionState,
}

/// Device operations required by the frame protocol
///
/// Destroy/free calls receive handles previously returned by the matching
/// create call and must tolerate null handles.
pub trait GpuBackend {
    // Synchronization

    /// Create an unsignaled binary semaphore
    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore>;

    /// Create a timeline semaphore with the given initial value
    fn create_timeline_semaphore(&self, initial_value: u64) -> VulkanResult<vk::Semaphore>;

    /// Destroy a semaphore
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    /// Block until `semaphore` reaches `value` or `timeout_ns` elapses
    fn wait_timeline(&self, semaphore: vk::Semaphore, value: u64, timeout_ns: u64) -> VulkanResult<()>;

    /// Wait until the queue has finished all submitted work
    fn queue_wait_idle(&self) -> VulkanResult<()>;

    /// Wait until the device has finished all submitted work
    fn device_wait_idle(&self) -> VulkanResult<()>;

    // Command buffers

    /// Create a command pool whose buffers can be reset individually
    fn create_command_pool(&self) -> VulkanResult<vk::CommandPool>;

    /// Destroy a command pool
    fn destroy_command_pool(&self, pool: vk::CommandPool);

    /// Allocate one primary command buffer from `pool`
    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VulkanResult<vk::CommandBuffer>;

    /// Return a command buffer to its pool
    fn free_command_buffer(&self, pool: vk::CommandPool, buffer: vk::CommandBuffer);

    /// Reset a command buffer, releasing its resources
    fn reset_command_buffer(&self, buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Begin recording a one-time-submit command buffer
    fn begin_command_buffer(&self, buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Finish recording
    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Record an image layout transition
    fn cmd_image_barrier(&self, buffer: vk::CommandBuffer, barrier: &ImageBarrier);

    /// Begin a dynamic rendering pass clearing every color target to `clear_color`
    fn cmd_begin_rendering(
        &self,
        buffer: vk::CommandBuffer,
        area: vk::Rect2D,
        color_views: &[vk::ImageView],
        clear_color: [f32; 4],
    );

    /// End the current dynamic rendering pass
    fn cmd_end_rendering(&self, buffer: vk::CommandBuffer);

    /// Bind a graphics pipeline
    fn cmd_bind_pipeline(&self, buffer: vk::CommandBuffer, pipeline: vk::Pipeline);

    /// Set the dynamic viewport and scissor to `area`
    fn cmd_set_viewport_and_scissor(&self, buffer: vk::CommandBuffer, area: vk::Rect2D);

    /// Record a non-indexed draw
    fn cmd_draw(&self, buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32);

    // Image chain

    /// Create a swapchain for the backend's surface
    fn create_swapchain(&self, request: &SwapchainRequest) -> VulkanResult<SwapchainInfo>;

    /// Destroy a swapchain
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    /// Images owned by a swapchain, in chain order
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VulkanResult<Vec<vk::Image>>;

    /// Create a 2D color view over a swapchain image
    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VulkanResult<vk::ImageView>;

    /// Destroy an image view
    fn destroy_image_view(&self, view: vk::ImageView);

    /// Acquire the next presentable image, signaling `semaphore` when it is ready
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> VulkanResult<AcquiredImage>;

    /// Submit one frame's work to the queue
    fn queue_submit(&self, submission: &FrameSubmission) -> VulkanResult<()>;

    /// Present an image once `wait_semaphore` is signaled; returns `true` when suboptimal
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VulkanResult<bool>;

    // Pipelines

    /// Create a shader module from SPIR-V words
    fn create_shader_module(&self, code: &[u32]) -> VulkanResult<vk::ShaderModule>;

    /// Destroy a shader module
    fn destroy_shader_module(&self, module: vk::ShaderModule);

    /// Create a pipeline layout with no descriptor sets or push constants
    fn create_empty_pipeline_layout(&self) -> VulkanResult<vk::PipelineLayout>;

    /// Destroy a pipeline layout
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    /// Create a graphics pipeline for dynamic rendering
    fn create_graphics_pipeline(&self, request: &GraphicsPipelineRequest<'_>) -> VulkanResult<vk::Pipeline>;

    /// Destroy a pipeline
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);
}
