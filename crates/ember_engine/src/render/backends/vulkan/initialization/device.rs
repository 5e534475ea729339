//! Physical device selection and the `ash` implementation of [`GpuBackend`]
//!
//! Selection works on [`DeviceCandidate`] summaries so the rules can be
//! checked without a GPU. A device is accepted when, in order:
//!
//! 1. it is not a virtual or software (CPU) device
//! 2. it reports Vulkan 1.3 or newer
//! 3. it supports `VK_KHR_swapchain`
//! 4. one queue family handles graphics, compute and presentation
//! 5. the surface reports at least one pixel format (the first is used)

use std::ffi::{CStr, CString};
use std::time::Duration;

use ash::extensions::khr;
use ash::{vk, Device};

use super::error::{api, ErrorKind, VulkanError, VulkanResult};
use super::instance::VulkanInstance;
use super::window::Window;
use crate::core::config::{PresentModePreference, RendererConfig};
use crate::platform::PlatformGuard;
use crate::render::backends::vulkan::backend::{
    AcquiredImage, FrameSubmission, GpuBackend, GraphicsPipelineRequest, ImageBarrier, SwapchainInfo, SwapchainRequest,
};

/// What selection needs to know about a physical device
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    /// Driver-reported device name
    pub name: String,
    /// Device class
    pub device_type: vk::PhysicalDeviceType,
    /// Highest supported API version
    pub api_version: u32,
    /// Whether `VK_KHR_swapchain` is available
    pub supports_swapchain: bool,
    /// First queue family supporting graphics, compute and presentation
    pub universal_queue_family: Option<u32>,
    /// Surface formats in driver order
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
}

impl DeviceCandidate {
    /// Why this device cannot be used, if it cannot
    pub fn rejection(&self) -> Option<&'static str> {
        if matches!(
            self.device_type,
            vk::PhysicalDeviceType::VIRTUAL_GPU | vk::PhysicalDeviceType::CPU
        ) {
            return Some("virtual and software devices are not supported");
        }
        if vk::api_version_major(self.api_version) < 1
            || (vk::api_version_major(self.api_version) == 1 && vk::api_version_minor(self.api_version) < 3)
        {
            return Some("Vulkan 1.3 is required");
        }
        if !self.supports_swapchain {
            return Some("VK_KHR_swapchain is not supported");
        }
        if self.universal_queue_family.is_none() {
            return Some("no queue family supports graphics, compute and presentation");
        }
        if self.surface_formats.is_empty() {
            return Some("the surface reports no pixel formats");
        }
        None
    }
}

/// Index of the first acceptable candidate
///
/// Every rejection is logged with its reason.
pub fn select_device(candidates: &[DeviceCandidate]) -> VulkanResult<usize> {
    for (index, candidate) in candidates.iter().enumerate() {
        match candidate.rejection() {
            None => {
                log::info!("Selected GPU: {}", candidate.name);
                return Ok(index);
            }
            Some(reason) => log::info!("Skipping GPU {}: {}", candidate.name, reason),
        }
    }

    Err(VulkanError::new(ErrorKind::NoSuitableDevice))
}

fn present_mode_for(preference: PresentModePreference) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

/// Clamp `requested` to what the surface allows
fn clamp_extent(requested: vk::Extent2D, capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Number of images to request given the surface limits
fn image_count(requested: u32, capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = requested.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

const COLOR_SUBRESOURCE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// Logical device, queue and surface created for one window
pub struct VulkanDevice {
    device: Device,
    physical_device: vk::PhysicalDevice,
    queue: vk::Queue,
    queue_family: u32,
    swapchain_loader: khr::Swapchain,
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    device_name: String,
    // Declared last so it outlives the device and surface
    _instance: VulkanInstance,
}

impl VulkanDevice {
    /// Create an instance, a surface for `window` and a device that can present to it
    pub fn new(platform: &PlatformGuard, window: &mut Window, config: &RendererConfig) -> VulkanResult<Self> {
        let surface_extensions = window
            .required_instance_extensions()
            .map_err(|err| VulkanError::new(ErrorKind::InitializationFailed(err.to_string())))?;

        let validation = config.enable_validation.unwrap_or(cfg!(debug_assertions));
        let instance = VulkanInstance::new(
            platform.entry(),
            &surface_extensions,
            &config.application_name,
            validation,
        )?;

        let surface_loader = khr::Surface::new(platform.entry(), instance.raw());
        let surface = window
            .create_vulkan_surface(instance.raw().handle())
            .map_err(|err| VulkanError::new(ErrorKind::InitializationFailed(err.to_string())))?;

        let opened = Self::open_device(&instance, &surface_loader, surface, config.present_mode);
        let (physical_device, device, queue_family, surface_format, present_mode, device_name) = match opened {
            Ok(parts) => parts,
            Err(err) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(err);
            }
        };

        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let swapchain_loader = khr::Swapchain::new(instance.raw(), &device);

        log::info!(
            "Vulkan device ready: {} (queue family {}, {:?}, {:?})",
            device_name,
            queue_family,
            surface_format.format,
            present_mode
        );

        Ok(Self {
            device,
            physical_device,
            queue,
            queue_family,
            swapchain_loader,
            surface_loader,
            surface,
            surface_format,
            present_mode,
            device_name,
            _instance: instance,
        })
    }

    #[allow(clippy::type_complexity)]
    fn open_device(
        instance: &VulkanInstance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        preference: PresentModePreference,
    ) -> VulkanResult<(vk::PhysicalDevice, Device, u32, vk::SurfaceFormatKHR, vk::PresentModeKHR, String)> {
        let physical_devices =
            unsafe { instance.raw().enumerate_physical_devices() }.map_err(api("vkEnumeratePhysicalDevices"))?;

        let candidates = physical_devices
            .iter()
            .map(|&physical| Self::describe(instance, surface_loader, surface, physical))
            .collect::<VulkanResult<Vec<_>>>()?;

        let index = select_device(&candidates)?;
        let physical = physical_devices[index];
        let candidate = &candidates[index];

        let queue_family = candidate
            .universal_queue_family
            .ok_or_else(|| VulkanError::new(ErrorKind::NoSuitableDevice))?;
        let surface_format = candidate
            .surface_formats
            .first()
            .copied()
            .ok_or_else(|| VulkanError::new(ErrorKind::NoSuitableDevice))?;

        let present_modes = unsafe { surface_loader.get_physical_device_surface_present_modes(physical, surface) }
            .map_err(api("vkGetPhysicalDeviceSurfacePresentModesKHR"))?;
        let wanted = present_mode_for(preference);
        let present_mode = if present_modes.contains(&wanted) {
            wanted
        } else {
            log::warn!("Present mode {:?} unavailable, falling back to FIFO", wanted);
            vk::PresentModeKHR::FIFO
        };

        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities)
            .build()];

        let extensions = [khr::Swapchain::name().as_ptr()];

        let mut features_12 = vk::PhysicalDeviceVulkan12Features::builder().timeline_semaphore(true);
        let mut features_13 = vk::PhysicalDeviceVulkan13Features::builder()
            .dynamic_rendering(true)
            .synchronization2(true);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .push_next(&mut features_12)
            .push_next(&mut features_13);

        let device = unsafe { instance.raw().create_device(physical, &create_info, None) }
            .map_err(api("vkCreateDevice"))?;

        Ok((
            physical,
            device,
            queue_family,
            surface_format,
            present_mode,
            candidate.name.clone(),
        ))
    }

    fn describe(
        instance: &VulkanInstance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        physical: vk::PhysicalDevice,
    ) -> VulkanResult<DeviceCandidate> {
        let raw = instance.raw();
        let properties = unsafe { raw.get_physical_device_properties(physical) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let extensions = unsafe { raw.enumerate_device_extension_properties(physical) }
            .map_err(api("vkEnumerateDeviceExtensionProperties"))?;
        let supports_swapchain = extensions
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == khr::Swapchain::name());

        let queue_families = unsafe { raw.get_physical_device_queue_family_properties(physical) };
        let mut universal_queue_family = None;
        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;
            if !family
                .queue_flags
                .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
            {
                continue;
            }
            let present = unsafe { surface_loader.get_physical_device_surface_support(physical, index, surface) }
                .map_err(api("vkGetPhysicalDeviceSurfaceSupportKHR"))?;
            if present {
                universal_queue_family = Some(index);
                break;
            }
        }

        let surface_formats = unsafe { surface_loader.get_physical_device_surface_formats(physical, surface) }
            .map_err(api("vkGetPhysicalDeviceSurfaceFormatsKHR"))?;

        Ok(DeviceCandidate {
            name,
            device_type: properties.device_type,
            api_version: properties.api_version,
            supports_swapchain,
            universal_queue_family,
            surface_formats,
        })
    }

    /// Name of the selected GPU
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Queue family used for all work
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Surface format swapchains are created with
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    /// Present mode swapchains are created with
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }
}

impl GpuBackend for VulkanDevice {
    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&info, None) }.map_err(api("vkCreateSemaphore"))
    }

    fn create_timeline_semaphore(&self, initial_value: u64) -> VulkanResult<vk::Semaphore> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::builder()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let info = vk::SemaphoreCreateInfo::builder().push_next(&mut type_info);
        unsafe { self.device.create_semaphore(&info, None) }.map_err(api("vkCreateSemaphore"))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        if semaphore != vk::Semaphore::null() {
            unsafe { self.device.destroy_semaphore(semaphore, None) };
        }
    }

    fn wait_timeline(&self, semaphore: vk::Semaphore, value: u64, timeout_ns: u64) -> VulkanResult<()> {
        let semaphores = [semaphore];
        let values = [value];
        let info = vk::SemaphoreWaitInfo::builder()
            .semaphores(&semaphores)
            .values(&values);

        match unsafe { self.device.wait_semaphores(&info, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(VulkanError::new(ErrorKind::ProgressTimeout {
                value,
                timeout: Duration::from_nanos(timeout_ns),
            })),
            Err(result) => Err(api("vkWaitSemaphores")(result)),
        }
    }

    fn queue_wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.queue_wait_idle(self.queue) }.map_err(api("vkQueueWaitIdle"))
    }

    fn device_wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(api("vkDeviceWaitIdle"))
    }

    fn create_command_pool(&self) -> VulkanResult<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(self.queue_family);
        unsafe { self.device.create_command_pool(&info, None) }.map_err(api("vkCreateCommandPool"))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        if pool != vk::CommandPool::null() {
            unsafe { self.device.destroy_command_pool(pool, None) };
        }
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VulkanResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&info) }.map_err(api("vkAllocateCommandBuffers"))?;
        buffers.first().copied().ok_or_else(|| {
            VulkanError::new(ErrorKind::InvalidOperation {
                reason: "driver returned no command buffer".to_string(),
            })
        })
    }

    fn free_command_buffer(&self, pool: vk::CommandPool, buffer: vk::CommandBuffer) {
        if pool != vk::CommandPool::null() && buffer != vk::CommandBuffer::null() {
            unsafe { self.device.free_command_buffers(pool, &[buffer]) };
        }
    }

    fn reset_command_buffer(&self, buffer: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(buffer, vk::CommandBufferResetFlags::empty())
        }
        .map_err(api("vkResetCommandBuffer"))
    }

    fn begin_command_buffer(&self, buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(buffer, &info) }.map_err(api("vkBeginCommandBuffer"))
    }

    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe { self.device.end_command_buffer(buffer) }.map_err(api("vkEndCommandBuffer"))
    }

    fn cmd_image_barrier(&self, buffer: vk::CommandBuffer, barrier: &ImageBarrier) {
        let barriers = [vk::ImageMemoryBarrier2::builder()
            .src_stage_mask(barrier.src_stage)
            .src_access_mask(barrier.src_access)
            .dst_stage_mask(barrier.dst_stage)
            .dst_access_mask(barrier.dst_access)
            .old_layout(barrier.old_layout)
            .new_layout(barrier.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(barrier.image)
            .subresource_range(COLOR_SUBRESOURCE)
            .build()];
        let dependency = vk::DependencyInfo::builder().image_memory_barriers(&barriers);

        unsafe { self.device.cmd_pipeline_barrier2(buffer, &dependency) };
    }

    fn cmd_begin_rendering(
        &self,
        buffer: vk::CommandBuffer,
        area: vk::Rect2D,
        color_views: &[vk::ImageView],
        clear_color: [f32; 4],
    ) {
        let attachments: Vec<vk::RenderingAttachmentInfo> = color_views
            .iter()
            .map(|&view| {
                vk::RenderingAttachmentInfo::builder()
                    .image_view(view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(vk::ClearValue {
                        color: vk::ClearColorValue { float32: clear_color },
                    })
                    .build()
            })
            .collect();

        let info = vk::RenderingInfo::builder()
            .render_area(area)
            .layer_count(1)
            .color_attachments(&attachments);

        unsafe { self.device.cmd_begin_rendering(buffer, &info) };
    }

    fn cmd_end_rendering(&self, buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_rendering(buffer) };
    }

    fn cmd_bind_pipeline(&self, buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(buffer, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    fn cmd_set_viewport_and_scissor(&self, buffer: vk::CommandBuffer, area: vk::Rect2D) {
        let viewport = vk::Viewport {
            x: area.offset.x as f32,
            y: area.offset.y as f32,
            width: area.extent.width as f32,
            height: area.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            self.device.cmd_set_viewport(buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(buffer, 0, &[area]);
        }
    }

    fn cmd_draw(&self, buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        unsafe { self.device.cmd_draw(buffer, vertex_count, instance_count, 0, 0) };
    }

    fn create_swapchain(&self, request: &SwapchainRequest) -> VulkanResult<SwapchainInfo> {
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
        }
        .map_err(api("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))?;

        let extent = clamp_extent(request.extent, &capabilities);
        let min_image_count = image_count(request.min_image_count, &capabilities);

        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(min_image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(request.old_swapchain);

        let handle =
            unsafe { self.swapchain_loader.create_swapchain(&info, None) }.map_err(api("vkCreateSwapchainKHR"))?;

        Ok(SwapchainInfo {
            handle,
            extent,
            format: self.surface_format,
        })
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        if swapchain != vk::SwapchainKHR::null() {
            unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VulkanResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }.map_err(api("vkGetSwapchainImagesKHR"))
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VulkanResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(COLOR_SUBRESOURCE);
        unsafe { self.device.create_image_view(&info, None) }.map_err(api("vkCreateImageView"))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        if view != vk::ImageView::null() {
            unsafe { self.device.destroy_image_view(view, None) };
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> VulkanResult<AcquiredImage> {
        let acquired = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, semaphore, vk::Fence::null())
        };

        match acquired {
            Ok((index, suboptimal)) => Ok(AcquiredImage { index, suboptimal }),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Err(VulkanError::new(ErrorKind::AcquireTimeout {
                timeout: Duration::from_nanos(timeout_ns),
            })),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(VulkanError::new(ErrorKind::SwapchainOutOfDate)),
            Err(result) => Err(api("vkAcquireNextImageKHR")(result)),
        }
    }

    fn queue_submit(&self, submission: &FrameSubmission) -> VulkanResult<()> {
        let wait_semaphores = [submission.wait_semaphore];
        let wait_stages = [submission.wait_stage];
        let wait_values = [0];
        let command_buffers = [submission.command_buffer];
        let signal_semaphores = [submission.timeline_semaphore, submission.present_semaphore];
        let signal_values = [submission.signal_value, 0];

        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::builder()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);

        let submit = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info)
            .build();

        unsafe { self.device.queue_submit(self.queue, &[submit], vk::Fence::null()) }
            .map_err(|result| VulkanError::new(ErrorKind::SubmitFailed(result)))
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VulkanResult<bool> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [swapchain];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        match unsafe { self.swapchain_loader.queue_present(self.queue, &info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(VulkanError::new(ErrorKind::SwapchainOutOfDate)),
            Err(result) => Err(VulkanError::new(ErrorKind::PresentFailed(result))),
        }
    }

    fn create_shader_module(&self, code: &[u32]) -> VulkanResult<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe { self.device.create_shader_module(&info, None) }.map_err(api("vkCreateShaderModule"))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        if module != vk::ShaderModule::null() {
            unsafe { self.device.destroy_shader_module(module, None) };
        }
    }

    fn create_empty_pipeline_layout(&self) -> VulkanResult<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo::default();
        unsafe { self.device.create_pipeline_layout(&info, None) }.map_err(api("vkCreatePipelineLayout"))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        if layout != vk::PipelineLayout::null() {
            unsafe { self.device.destroy_pipeline_layout(layout, None) };
        }
    }

    fn create_graphics_pipeline(&self, request: &GraphicsPipelineRequest<'_>) -> VulkanResult<vk::Pipeline> {
        let entry_name = |name: &str| {
            CString::new(name).map_err(|_| {
                VulkanError::new(ErrorKind::InvalidOperation {
                    reason: format!("shader entry point {name:?} contains a NUL byte"),
                })
            })
        };
        let vertex_entry = entry_name(request.vertex_entry)?;
        let fragment_entry = entry_name(request.fragment_entry)?;

        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(request.vertex_module)
                .name(&vertex_entry)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(request.fragment_module)
                .name(&fragment_entry)
                .build(),
        ];

        let fixed = request.fixed_function;

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(fixed.topology)
            .primitive_restart_enable(false);
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(fixed.polygon_mode)
            .cull_mode(fixed.cull_mode)
            .front_face(fixed.front_face)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::builder().rasterization_samples(fixed.samples);

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = request
            .color_formats
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::builder()
                    .blend_enable(fixed.blend_enabled)
                    .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                    .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                    .color_blend_op(vk::BlendOp::ADD)
                    .src_alpha_blend_factor(vk::BlendFactor::ONE)
                    .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                    .alpha_blend_op(vk::BlendOp::ADD)
                    .color_write_mask(fixed.color_write_mask)
                    .build()
            })
            .collect();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder().attachments(&blend_attachments);
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&fixed.dynamic_states);

        let mut rendering = vk::PipelineRenderingCreateInfo::builder().color_attachment_formats(request.color_formats);

        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(request.layout)
            .push_next(&mut rendering)
            .build();

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        }
        .map_err(|(_, result)| api("vkCreateGraphicsPipelines")(result))?;

        pipelines.first().copied().ok_or_else(|| {
            VulkanError::new(ErrorKind::InvalidOperation {
                reason: "driver returned no pipeline".to_string(),
            })
        })
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        if pipeline != vk::Pipeline::null() {
            unsafe { self.device.destroy_pipeline(pipeline, None) };
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                log::error!("Failed to wait for device idle before destruction: {:?}", err);
            }
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
        log::debug!("[DEVICE] Vulkan device destroyed");
        // `_instance` drops after this, destroying the messenger and instance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_string(),
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            api_version: vk::make_api_version(0, 1, 3, 250),
            supports_swapchain: true,
            universal_queue_family: Some(0),
            surface_formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
        }
    }

    #[test]
    fn test_software_devices_are_rejected() {
        let mut cpu = candidate("llvmpipe");
        cpu.device_type = vk::PhysicalDeviceType::CPU;
        let mut virtual_gpu = candidate("virtio");
        virtual_gpu.device_type = vk::PhysicalDeviceType::VIRTUAL_GPU;

        assert!(cpu.rejection().is_some());
        assert!(virtual_gpu.rejection().is_some());
        assert_eq!(select_device(&[cpu, virtual_gpu, candidate("real")]).unwrap(), 2);
    }

    #[test]
    fn test_device_without_universal_queue_is_rejected() {
        let mut split = candidate("split queues");
        split.universal_queue_family = None;

        let err = select_device(&[split]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NoSuitableDevice);
    }

    #[test]
    fn test_device_without_surface_formats_is_rejected() {
        let mut no_formats = candidate("headless");
        no_formats.surface_formats.clear();

        assert!(no_formats.rejection().is_some());
        assert_eq!(select_device(&[no_formats, candidate("ok")]).unwrap(), 1);
    }

    #[test]
    fn test_old_api_version_is_rejected() {
        let mut old = candidate("old driver");
        old.api_version = vk::make_api_version(0, 1, 2, 198);
        assert_eq!(old.rejection(), Some("Vulkan 1.3 is required"));

        let mut newer = candidate("new driver");
        newer.api_version = vk::make_api_version(0, 1, 4, 0);
        assert_eq!(newer.rejection(), None);
    }

    #[test]
    fn test_first_acceptable_device_wins() {
        let integrated = DeviceCandidate {
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            ..candidate("integrated")
        };
        assert_eq!(select_device(&[integrated, candidate("discrete")]).unwrap(), 0);
    }

    #[test]
    fn test_extent_follows_surface_when_fixed() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 800, height: 600 },
            ..Default::default()
        };
        let requested = vk::Extent2D { width: 1280, height: 720 };

        assert_eq!(clamp_extent(requested, &capabilities), capabilities.current_extent);
    }

    #[test]
    fn test_extent_is_clamped_when_free() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 1024, height: 1024 },
            ..Default::default()
        };
        let requested = vk::Extent2D { width: 1280, height: 720 };

        assert_eq!(
            clamp_extent(requested, &capabilities),
            vk::Extent2D { width: 1024, height: 720 }
        );
    }

    #[test]
    fn test_image_count_respects_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(image_count(2, &capabilities), 3);

        let bounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 1,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(image_count(4, &bounded), 2);
    }
}
