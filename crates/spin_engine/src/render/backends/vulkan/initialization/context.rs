//! Vulkan context management
//!
//! Instance, debug messenger, physical device selection and logical device creation,
//! plus the error type shared by the whole renderer.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface as SurfaceLoader, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};
use std::collections::HashSet;
use std::ffi::{c_char, CStr, CString};
use std::panic::Location;
use thiserror::Error;

use crate::core::config::VulkanRendererConfig;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// A Vulkan call failed; records which call and where it was made
    #[error("{operation} failed at {location}: {result:?}")]
    Call {
        /// Name of the Vulkan entry point
        operation: &'static str,
        /// Source location of the call
        location: &'static Location<'static>,
        /// Result code returned by the driver
        result: vk::Result,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Shader loading failed
    #[error("Shader error: {0}")]
    Shader(String),
}

impl VulkanError {
    /// The driver result code, if this error came from a Vulkan call
    pub fn result(&self) -> Option<vk::Result> {
        match self {
            Self::Api(result) | Self::Call { result, .. } => Some(*result),
            _ => None,
        }
    }

    /// Whether the logical device is gone; nothing can recover from this
    pub fn is_device_lost(&self) -> bool {
        self.result() == Some(vk::Result::ERROR_DEVICE_LOST)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Attach the operation name and caller location to a raw Vulkan result
pub trait ResultExt<T> {
    /// Wrap an error as [`VulkanError::Call`]
    fn context(self, operation: &'static str) -> VulkanResult<T>;
}

impl<T> ResultExt<T> for Result<T, vk::Result> {
    #[track_caller]
    fn context(self, operation: &'static str) -> VulkanResult<T> {
        let location = Location::caller();
        self.map_err(|result| VulkanError::Call {
            operation,
            location,
            result,
        })
    }
}

const VALIDATION_LAYER: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance
    ///
    /// `required_extensions` comes from the window system. Validation layers and the
    /// debug messenger are added when the config asks for them.
    pub fn new(required_extensions: &[String], config: &VulkanRendererConfig) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let enable_validation = config.validation_enabled();
        if enable_validation && !Self::validation_layer_available(&entry)? {
            return Err(VulkanError::InitializationFailed(
                "Validation layers requested, but VK_LAYER_KHRONOS_validation is not available".to_string(),
            ));
        }

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|_| VulkanError::InitializationFailed("Application name contains a NUL byte".to_string()))?;
        let engine_name = CString::new("SpinEngine")
            .map_err(|_| VulkanError::InitializationFailed("Engine name contains a NUL byte".to_string()))?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_names = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VulkanError::InitializationFailed("Extension name contains a NUL byte".to_string()))?;
        let mut extensions: Vec<*const c_char> = extension_names.iter().map(|ext| ext.as_ptr()).collect();
        let mut layers: Vec<*const c_char> = Vec::new();

        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None) }.context("vkCreateInstance")?;

        let debug = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::info!(
            "Vulkan instance created (validation {})",
            if enable_validation { "on" } else { "off" }
        );

        Ok(Self { entry, instance, debug })
    }

    fn validation_layer_available(entry: &Entry) -> VulkanResult<bool> {
        let layers = entry
            .enumerate_instance_layer_properties()
            .context("vkEnumerateInstanceLayerProperties")?;
        Ok(layers.iter().any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name == VALIDATION_LAYER
        }))
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
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
            .context("vkCreateDebugUtilsMessengerEXT")
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
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

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select the first device that can render and present to `surface`
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &SurfaceLoader,
    ) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }.context("vkEnumeratePhysicalDevices")?;
        if devices.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "Failed to find GPUs with Vulkan support".to_string(),
            ));
        }

        for device in devices {
            match Self::evaluate_device(instance, device, surface, surface_loader) {
                Ok(device_info) => {
                    log::info!("Selected GPU: {}", device_info.name());
                    return Ok(device_info);
                }
                Err(e) => log::debug!("Skipping GPU: {e}"),
            }
        }

        Err(VulkanError::InitializationFailed("No suitable GPU found".to_string()))
    }

    /// Human-readable device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &SurfaceLoader,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;

        for (index, family) in (0u32..).zip(queue_families.iter()) {
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
                graphics_family = Some(index);
            }

            let present_support = unsafe { surface_loader.get_physical_device_surface_support(device, index, surface) }
                .context("vkGetPhysicalDeviceSurfaceSupportKHR")?;

            if present_support && present_family.is_none() {
                present_family = Some(index);
            }

            if graphics_family.is_some() && present_family.is_some() {
                break;
            }
        }

        let graphics_family = graphics_family
            .ok_or_else(|| VulkanError::InitializationFailed("No graphics queue family found".to_string()))?;
        let present_family = present_family
            .ok_or_else(|| VulkanError::InitializationFailed("No present queue family found".to_string()))?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
            .context("vkEnumerateDeviceExtensionProperties")?;
        let has_swapchain = extensions.iter().any(|available| {
            let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            name == SwapchainLoader::name()
        });
        if !has_swapchain {
            return Err(VulkanError::InitializationFailed(
                "Required device extension VK_KHR_swapchain not supported".to_string(),
            ));
        }

        // A device that reports no formats or present modes cannot drive a window
        let formats = unsafe { surface_loader.get_physical_device_surface_formats(device, surface) }
            .context("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        let present_modes = unsafe { surface_loader.get_physical_device_surface_present_modes(device, surface) }
            .context("vkGetPhysicalDeviceSurfacePresentModesKHR")?;
        if formats.is_empty() || present_modes.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "Surface reports no formats or present modes".to_string(),
            ));
        }

        Ok(Self {
            device,
            properties,
            memory_properties,
            graphics_family,
            present_family,
        })
    }

    /// Find a memory type matching `type_filter` with all of `properties`
    pub fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        (0..self.memory_properties.memory_type_count)
            .find(|&i| {
                (type_filter & (1 << i)) != 0
                    && self.memory_properties.memory_types[i as usize]
                        .property_flags
                        .contains(properties)
            })
            .ok_or(VulkanError::NoSuitableMemoryType)
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create a new logical device with one queue per unique family
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let unique_families: HashSet<u32> = [physical_device_info.graphics_family, physical_device_info.present_family]
            .into_iter()
            .collect();

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let required_extensions = [SwapchainLoader::name().as_ptr()];
        let device_features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe { instance.create_device(physical_device_info.device, &create_info, None) }
            .context("vkCreateDevice")?;

        let graphics_queue = unsafe { device.get_device_queue(physical_device_info.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical_device_info.present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing_call() -> VulkanResult<()> {
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR).context("vkQueuePresentKHR")
    }

    #[test]
    fn test_context_records_operation_and_location() {
        let error = failing_call().unwrap_err();
        match &error {
            VulkanError::Call { operation, location, result } => {
                assert_eq!(*operation, "vkQueuePresentKHR");
                assert!(location.file().ends_with("context.rs"));
                assert_eq!(*result, vk::Result::ERROR_OUT_OF_DATE_KHR);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let message = error.to_string();
        assert!(message.contains("vkQueuePresentKHR"));
        assert!(message.contains("context.rs"));
    }

    #[test]
    fn test_device_lost_classification() {
        assert!(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST).is_device_lost());
        let call: VulkanResult<()> = Err(vk::Result::ERROR_DEVICE_LOST).context("vkQueueSubmit");
        assert!(call.unwrap_err().is_device_lost());
        assert!(!VulkanError::Api(vk::Result::ERROR_OUT_OF_DATE_KHR).is_device_lost());
        assert!(!VulkanError::NoSuitableMemoryType.is_device_lost());
        assert_eq!(VulkanError::Shader("x".into()).result(), None);
    }
}
