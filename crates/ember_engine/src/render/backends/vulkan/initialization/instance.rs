//! Vulkan instance and validation messenger

use std::ffi::{c_char, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};

use super::error::{api, ErrorKind, VulkanError, VulkanResult};

const VALIDATION_LAYER: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    instance: Instance,
    debug_utils: Option<DebugUtils>,
    debug_messenger: vk::DebugUtilsMessengerEXT,
}

impl VulkanInstance {
    /// Create a Vulkan 1.3 instance with the given surface extensions
    ///
    /// When `enable_validation` is set and the Khronos validation layer is
    /// installed, the layer is enabled and its messages are forwarded to `log`.
    pub fn new(
        entry: &Entry,
        surface_extensions: &[String],
        app_name: &str,
        enable_validation: bool,
    ) -> VulkanResult<Self> {
        let app_name = CString::new(app_name).map_err(|_| {
            VulkanError::new(ErrorKind::InitializationFailed(
                "application name contains a NUL byte".to_string(),
            ))
        })?;
        let engine_name = CString::new("Ember").map_err(|_| {
            VulkanError::new(ErrorKind::InitializationFailed("invalid engine name".to_string()))
        })?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let extension_names = surface_extensions
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| {
                VulkanError::new(ErrorKind::InitializationFailed(
                    "surface extension name contains a NUL byte".to_string(),
                ))
            })?;

        let validation = enable_validation && Self::validation_layer_available(entry);
        if enable_validation && !validation {
            log::warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
        }

        let mut extensions: Vec<*const c_char> = extension_names.iter().map(|name| name.as_ptr()).collect();
        let mut layers: Vec<*const c_char> = Vec::new();
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(api("vkCreateInstance"))?;

        let (debug_utils, debug_messenger) = if validation {
            let debug_utils = DebugUtils::new(entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => (Some(debug_utils), messenger),
                Err(err) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(err);
                }
            }
        } else {
            (None, vk::DebugUtilsMessengerEXT::null())
        };

        log::info!(
            "Vulkan instance created (validation {})",
            if validation { "enabled" } else { "disabled" }
        );

        Ok(Self {
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    /// Raw instance
    pub fn raw(&self) -> &Instance {
        &self.instance
    }

    fn validation_layer_available(entry: &Entry) -> bool {
        match entry.enumerate_instance_layer_properties() {
            Ok(layers) => layers
                .iter()
                .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER),
            Err(err) => {
                log::warn!("Unable to enumerate instance layers: {:?}", err);
                false
            }
        }
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(api("vkCreateDebugUtilsMessengerEXT"))
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug_utils) = &self.debug_utils {
                if self.debug_messenger != vk::DebugUtilsMessengerEXT::null() {
                    debug_utils.destroy_debug_utils_messenger(self.debug_messenger, None);
                }
            }
            self.instance.destroy_instance(None);
        }
        log::debug!("[INSTANCE] Vulkan instance destroyed");
    }
}

/// Log level a driver message of `severity` is forwarded at
pub fn severity_to_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Info
    } else {
        log::Level::Debug
    }
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    log::log!(
        target: "vulkan",
        severity_to_level(message_severity),
        "[Vulkan] {:?} - {}",
        message_type,
        message
    );

    vk::FALSE
}
