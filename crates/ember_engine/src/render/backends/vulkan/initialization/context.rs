//! Vulkan context management
//!
//! Instance, surface, physical device selection and the logical device.
//! Everything here is created once and read-only afterwards; the context is
//! the last thing a [`crate::render::RenderContext`] drops.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;
use ash::{Device, Entry, Instance};
#[cfg(debug_assertions)]
use ash::extensions::ext::DebugUtils;
use std::ffi::{CStr, CString};
use std::path::PathBuf;
use thiserror::Error;

use crate::core::config::RendererConfig;
use crate::render::window::Window;

/// Vulkan-specific error types
///
/// Every variant is fatal to the caller. Transient conditions (stale
/// swapchain, full descriptor pool) are reported as outcomes, never as errors.
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// The device was lost while waiting or submitting
    #[error("Vulkan device lost")]
    DeviceLost,

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// An engine invariant was violated
    #[error("Logic error: {0}")]
    Logic(String),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A SPIR-V file could not be read
    #[error("Failed to load shader {path:?}: {source}")]
    ShaderLoad {
        /// File that failed to load
        path: PathBuf,
        /// Underlying IO failure
        #[source]
        source: std::io::Error,
    },

    /// SPIR-V reflection failed or produced an unusable layout
    #[error("Shader reflection failed: {0}")]
    Reflection(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,
}

impl VulkanError {
    /// Classify a raw result, separating device loss from other API failures
    pub fn from_vk(result: vk::Result) -> Self {
        if result == vk::Result::ERROR_DEVICE_LOST {
            Self::DeviceLost
        } else {
            Self::Api(result)
        }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Debug utilities extension (debug builds)
    #[cfg(debug_assertions)]
    pub debug_utils: Option<DebugUtils>,
    /// Debug messenger handle (debug builds)
    #[cfg(debug_assertions)]
    pub debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance, with validation layers when requested in debug builds
    pub fn new(window: &Window, config: &RendererConfig) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e:?}")))?;

        let enable_validation = cfg!(debug_assertions) && config.validation_enabled();

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid application name: {e}")))?;
        let engine_name = CString::new("Ember")
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let required_extensions = window
            .required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to get required extensions: {e}")))?;

        let cstr_extensions = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

        #[allow(unused_mut)]
        let mut extensions: Vec<*const std::os::raw::c_char> = cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();

        #[cfg(debug_assertions)]
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let validation_layer = CStr::from_bytes_with_nul(b"VK_LAYER_KHRONOS_validation\0")
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let layer_names: Vec<*const std::os::raw::c_char> = if enable_validation {
            vec![validation_layer.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe {
            entry.create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        log::info!(
            "Created Vulkan instance for '{}' (validation {})",
            config.application_name,
            if enable_validation { "on" } else { "off" }
        );

        #[cfg(debug_assertions)]
        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let debug_messenger = Self::setup_debug_messenger(&debug_utils)?;
            (Some(debug_utils), Some(debug_messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug_utils,
            #[cfg(debug_assertions)]
            debug_messenger,
        })
    }

    #[cfg(debug_assertions)]
    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils.create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            if let (Some(debug_utils), Some(debug_messenger)) = (&self.debug_utils, &self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(*debug_messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Routes validation messages into `log`
#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Highest sample count present in `supported` that does not exceed `preferred`
pub fn max_usable_sample_count(supported: vk::SampleCountFlags, preferred: u32) -> vk::SampleCountFlags {
    const CANDIDATES: [(u32, vk::SampleCountFlags); 7] = [
        (64, vk::SampleCountFlags::TYPE_64),
        (32, vk::SampleCountFlags::TYPE_32),
        (16, vk::SampleCountFlags::TYPE_16),
        (8, vk::SampleCountFlags::TYPE_8),
        (4, vk::SampleCountFlags::TYPE_4),
        (2, vk::SampleCountFlags::TYPE_2),
        (1, vk::SampleCountFlags::TYPE_1),
    ];

    CANDIDATES
        .iter()
        .find(|(count, flag)| *count <= preferred && supported.contains(*flag))
        .map_or(vk::SampleCountFlags::TYPE_1, |(_, flag)| *flag)
}

/// Depth formats tried in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Index of a memory type allowed by `type_filter` that has all of `properties`
pub fn find_memory_type_index(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory.memory_type_count).find(|&i| {
        (type_filter & (1 << i)) != 0
            && memory.memory_types[i as usize].property_flags.contains(properties)
    })
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
    /// MSAA sample count used by the main pass and every main-pass pipeline
    pub msaa_samples: vk::SampleCountFlags,
    /// Format for depth attachments
    pub depth_format: vk::Format,
}

impl PhysicalDeviceInfo {
    /// Select the first physical device able to render to `surface`
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        preferred_samples: u32,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance.enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        for device in devices {
            match Self::evaluate_device(instance, device, surface, surface_loader, preferred_samples) {
                Ok(device_info) => {
                    log::info!(
                        "Selected GPU: {} (msaa {:?}, depth {:?})",
                        unsafe { CStr::from_ptr(device_info.properties.device_name.as_ptr()).to_string_lossy() },
                        device_info.msaa_samples,
                        device_info.depth_format
                    );
                    return Ok(device_info);
                }
                Err(e) => log::debug!("Skipping physical device {:?}: {}", device, e),
            }
        }

        Err(VulkanError::InitializationFailed("No suitable GPU found".to_string()))
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        preferred_samples: u32,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;

        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
                graphics_family = Some(index);
            }

            let present_support = unsafe {
                surface_loader.get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::Api)?
            };

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

        let extensions = unsafe {
            instance.enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };

        let has_swapchain = extensions.iter().any(|available| {
            let extension_name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            extension_name == SwapchainLoader::name()
        });

        if !has_swapchain {
            return Err(VulkanError::InitializationFailed(
                "Required device extensions not supported".to_string(),
            ));
        }

        let depth_format = DEPTH_FORMAT_CANDIDATES
            .iter()
            .copied()
            .find(|&format| {
                let props = unsafe { instance.get_physical_device_format_properties(device, format) };
                props
                    .optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            })
            .ok_or_else(|| VulkanError::InitializationFailed("No supported depth format".to_string()))?;

        let limits = &properties.limits;
        let msaa_samples = max_usable_sample_count(
            limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts,
            preferred_samples,
        );

        Ok(Self {
            device,
            properties,
            features,
            memory_properties,
            graphics_family,
            present_family,
            msaa_samples,
            depth_format,
        })
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
    /// Create a new logical device with required queues
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let unique_families: std::collections::BTreeSet<u32> = [
            physical_device_info.graphics_family,
            physical_device_info.present_family,
        ]
        .into_iter()
        .collect();

        let priorities = [1.0];
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

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(physical_device_info.features.sampler_anisotropy == vk::TRUE)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance.create_device(physical_device_info.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

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

/// Main Vulkan context that owns the instance, surface and device
pub struct VulkanContext {
    /// Vulkan surface for rendering
    surface: vk::SurfaceKHR,
    /// Surface extension loader
    surface_loader: Surface,
    /// Selected physical device information
    physical_device: PhysicalDeviceInfo,
    /// Logical device for operations
    device: LogicalDevice,
    /// Vulkan instance and debug utilities
    instance: VulkanInstance,
}

impl VulkanContext {
    /// Create a new Vulkan context for the window
    pub fn new(window: &mut Window, config: &RendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, config)?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {e}")))?;

        let opened = PhysicalDeviceInfo::select_suitable_device(
            &instance.instance,
            surface,
            &surface_loader,
            config.msaa_samples,
        )
        .and_then(|physical| Ok((LogicalDevice::new(&instance.instance, &physical)?, physical)));
        let (device, physical_device) = release_on_error(opened, || unsafe {
            surface_loader.destroy_surface(surface, None);
        })?;

        Ok(Self {
            surface,
            surface_loader,
            physical_device,
            device,
            instance,
        })
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the surface handle
    pub const fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the surface loader
    pub const fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Get the physical device info
    pub const fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Get the logical device
    pub const fn device(&self) -> &Device {
        &self.device.device
    }

    /// Get an owned clone of the device dispatch table
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Get the swapchain loader
    pub const fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.device.swapchain_loader
    }

    /// Get the graphics queue
    pub const fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub const fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Get the graphics queue family index
    pub const fn graphics_queue_family(&self) -> u32 {
        self.physical_device.graphics_family
    }

    /// Sample count shared by the main pass and its pipelines
    pub const fn msaa_samples(&self) -> vk::SampleCountFlags {
        self.physical_device.msaa_samples
    }

    /// Depth attachment format
    pub const fn depth_format(&self) -> vk::Format {
        self.physical_device.depth_format
    }

    /// Memory type index for an allocation
    pub fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        find_memory_type_index(&self.physical_device.memory_properties, type_filter, properties)
            .ok_or(VulkanError::NoSuitableMemoryType)
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle() }.map_err(VulkanError::from_vk)
    }
}

/// Run `release` when `result` is an error, then pass the result through
fn release_on_error<T, E>(result: Result<T, E>, release: impl FnOnce()) -> Result<T, E> {
    if result.is_err() {
        release();
    }
    result
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.surface_loader.destroy_surface(self.surface, None);
        }
        // Remaining fields drop in declaration order: device before instance.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_count_respects_preference_and_support() {
        let supported = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8;

        assert_eq!(max_usable_sample_count(supported, 4), vk::SampleCountFlags::TYPE_4);
        assert_eq!(max_usable_sample_count(supported, 64), vk::SampleCountFlags::TYPE_8);
        assert_eq!(max_usable_sample_count(supported, 1), vk::SampleCountFlags::TYPE_1);
        assert_eq!(
            max_usable_sample_count(vk::SampleCountFlags::TYPE_1, 8),
            vk::SampleCountFlags::TYPE_1
        );
    }

    #[test]
    fn test_memory_type_lookup() {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        memory.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        memory.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        memory.memory_types[2].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type_index(&memory, 0b111, host), Some(1));
        assert_eq!(find_memory_type_index(&memory, 0b101, host), None);
        assert_eq!(
            find_memory_type_index(&memory, 0b101, vk::MemoryPropertyFlags::HOST_VISIBLE),
            Some(2)
        );
    }

    #[test]
    fn test_device_lost_is_classified() {
        assert!(matches!(
            VulkanError::from_vk(vk::Result::ERROR_DEVICE_LOST),
            VulkanError::DeviceLost
        ));
        assert!(matches!(
            VulkanError::from_vk(vk::Result::ERROR_OUT_OF_HOST_MEMORY),
            VulkanError::Api(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
        ));
    }

    #[test]
    fn test_release_runs_only_on_failure() {
        let mut released = 0;
        let ok: Result<u32, VulkanError> = release_on_error(Ok(7), || released += 1);
        assert_eq!(ok.unwrap(), 7);
        assert_eq!(released, 0);

        let failed: Result<u32, VulkanError> =
            release_on_error(Err(VulkanError::NoSuitableMemoryType), || released += 1);
        assert!(matches!(failed, Err(VulkanError::NoSuitableMemoryType)));
        assert_eq!(released, 1);
    }
}
