//! Physical device selection and logical device creation
//!
//! Selection enumerates every physical device, resolves queue families for
//! the four roles (graphics, present, transfer, compute) and scores the
//! candidates. The logical device is created with one queue per distinct
//! family; roles that share the graphics family reuse the graphics queue
//! handle.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Instance};
use std::collections::BTreeSet;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use crate::core::config::DeviceConfig;
use crate::foundation::logging::Logger;
use crate::render::backends::vulkan::initialization::instance::{name_from_raw, to_cstrings};
use crate::render::backends::vulkan::{Surface, VkResultExt, VulkanError, VulkanResult};

/// Queue family per role, as discovered on a physical device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// First family with graphics support
    pub graphics: Option<u32>,
    /// First family that can present to the surface
    pub present: Option<u32>,
    /// Dedicated transfer family, else the graphics family
    pub transfer: Option<u32>,
    /// Dedicated compute family, else the graphics family
    pub compute: Option<u32>,
}

impl QueueFamilyIndices {
    /// Resolve families from their properties.
    ///
    /// `supports_present` is queried per family index until a presenting
    /// family is found.
    pub fn find<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> VulkanResult<Self>
    where
        F: FnMut(u32) -> VulkanResult<bool>,
    {
        let mut indices = Self::default();
        let mut dedicated_transfer = None;
        let mut dedicated_compute = None;

        for (index, family) in (0u32..).zip(families.iter()) {
            if family.queue_count == 0 {
                continue;
            }
            let flags = family.queue_flags;

            if indices.graphics.is_none() && flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }
            if indices.present.is_none() && supports_present(index)? {
                indices.present = Some(index);
            }
            if dedicated_transfer.is_none()
                && flags.contains(vk::QueueFlags::TRANSFER)
                && !flags.intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
            {
                dedicated_transfer = Some(index);
            }
            if dedicated_compute.is_none()
                && flags.contains(vk::QueueFlags::COMPUTE)
                && !flags.contains(vk::QueueFlags::GRAPHICS)
            {
                dedicated_compute = Some(index);
            }
        }

        indices.transfer = dedicated_transfer.or(indices.graphics);
        indices.compute = dedicated_compute.or(indices.graphics);
        Ok(indices)
    }

    /// Graphics and present both resolved
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Collapse into concrete indices, failing when a required role is unset
    pub fn resolve(&self) -> VulkanResult<QueueFamilies> {
        match (self.graphics, self.present) {
            (Some(graphics), Some(present)) => Ok(QueueFamilies {
                graphics,
                present,
                transfer: self.transfer.unwrap_or(graphics),
                compute: self.compute.unwrap_or(graphics),
            }),
            (None, _) => Err(VulkanError::NotFound("graphics queue family".to_string())),
            (_, None) => Err(VulkanError::NotFound("present queue family".to_string())),
        }
    }
}

/// Fully resolved queue family per role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    /// Graphics family
    pub graphics: u32,
    /// Present family
    pub present: u32,
    /// Transfer family
    pub transfer: u32,
    /// Compute family
    pub compute: u32,
}

impl QueueFamilies {
    /// Distinct family indices, one queue is created per entry
    pub fn unique(&self) -> BTreeSet<u32> {
        [self.graphics, self.present, self.transfer, self.compute]
            .into_iter()
            .collect()
    }

    /// Graphics and present are served by different families
    pub fn split_present(&self) -> bool {
        self.graphics != self.present
    }
}

/// Queue handle for `family`, reusing `graphics_queue` for the graphics family
pub fn queue_for_family<F>(family: u32, graphics_family: u32, graphics_queue: vk::Queue, fetch: F) -> vk::Queue
where
    F: FnOnce(u32) -> vk::Queue,
{
    if family == graphics_family {
        graphics_queue
    } else {
        fetch(family)
    }
}

/// Device extensions that must be enabled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceExtensions {
    required: Vec<CString>,
}

impl DeviceExtensions {
    /// Empty extension set
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `VK_KHR_swapchain` plus the configured extensions
    pub fn from_config(config: &DeviceConfig) -> VulkanResult<Self> {
        let mut extensions = Self::new();
        extensions.add_required(SwapchainLoader::name());
        for name in to_cstrings(&config.required_extensions)? {
            extensions.add_required(&name);
        }
        Ok(extensions)
    }

    /// Add a required extension, ignoring duplicates
    pub fn add_required(&mut self, name: &CStr) {
        if !self.required.iter().any(|existing| existing.as_c_str() == name) {
            self.required.push(name.to_owned());
        }
    }

    /// Required extension names
    pub fn required(&self) -> &[CString] {
        &self.required
    }

    /// Fail with a configuration error if any required extension is missing
    pub fn validate(&self, available: &[CString]) -> VulkanResult<()> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|name| !available.contains(name))
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(VulkanError::Configuration(format!(
                "Required device extensions not supported: {}",
                missing.join(", ")
            )))
        }
    }
}

/// First candidate whose tiling features contain `features`.
///
/// Candidates are checked in the given order; `properties_of` supplies the
/// format properties of each one.
pub fn find_supported_format<F>(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    mut properties_of: F,
) -> VulkanResult<vk::Format>
where
    F: FnMut(vk::Format) -> vk::FormatProperties,
{
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = properties_of(format);
            let supported = if tiling == vk::ImageTiling::LINEAR {
                props.linear_tiling_features
            } else {
                props.optimal_tiling_features
            };
            supported.contains(features)
        })
        .ok_or(VulkanError::UnsupportedFormat {
            candidates: candidates.len(),
            features,
        })
}

/// Selection score, higher wins
pub fn score_device(properties: &vk::PhysicalDeviceProperties) -> u32 {
    let type_score = match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 500,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        _ => 0,
    };
    type_score + properties.limits.max_image_dimension2_d / 1024
}

/// Index of the highest score, ties resolved to the earliest candidate
pub fn best_candidate(scores: &[Option<u32>]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .filter_map(|(index, score)| score.map(|score| (index, score)))
        .fold(None, |best: Option<(usize, u32)>, (index, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((index, score)),
        })
        .map(|(index, _)| index)
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
    /// Available queue families
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    /// Resolved queue family per role
    pub families: QueueFamilies,
    /// Device extensions the driver reports
    pub available_extensions: Vec<CString>,
}

impl PhysicalDeviceInfo {
    /// Select the best physical device that can render and present
    pub fn select_suitable_device(
        instance: &Instance,
        surface: &Surface,
        logger: &Logger,
    ) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("vkEnumeratePhysicalDevices")?;

        let mut candidates = Vec::with_capacity(devices.len());
        for device in devices {
            let evaluated = Self::evaluate_device(instance, device, surface)?;
            let name = evaluated.name();
            match Option::<Self>::from(evaluated) {
                Some(info) => {
                    logger.debug(format_args!("GPU candidate: {name} (score {})", score_device(&info.properties)));
                    candidates.push(Some(info));
                }
                None => {
                    logger.debug(format_args!("GPU rejected: {name} lacks graphics or present queue"));
                    candidates.push(None);
                }
            }
        }

        let scores: Vec<Option<u32>> = candidates
            .iter()
            .map(|info| info.as_ref().map(|info| score_device(&info.properties)))
            .collect();
        let best = best_candidate(&scores).ok_or_else(|| {
            logger.error("No GPU exposes both graphics and present queues");
            VulkanError::NoSuitableDevice
        })?;

        let selected = candidates
            .swap_remove(best)
            .ok_or(VulkanError::NoSuitableDevice)?;
        logger.info(format_args!(
            "Selected GPU: {} (graphics {}, present {}, transfer {}, compute {})",
            selected.device_name(),
            selected.families.graphics,
            selected.families.present,
            selected.families.transfer,
            selected.families.compute
        ));
        Ok(selected)
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: &Surface,
    ) -> VulkanResult<EvaluatedDevice> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let indices = QueueFamilyIndices::find(&queue_families, |index| {
            surface.supports_present(device, index)
        })?;
        let Ok(families) = indices.resolve() else {
            return Ok(EvaluatedDevice::Rejected(properties));
        };

        let features = unsafe { instance.get_physical_device_features(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let available_extensions = unsafe { instance.enumerate_device_extension_properties(device) }
            .context("vkEnumerateDeviceExtensionProperties")?
            .iter()
            .map(|props| name_from_raw(&props.extension_name))
            .collect();

        Ok(EvaluatedDevice::Suitable(Box::new(Self {
            device,
            properties,
            features,
            memory_properties,
            queue_families,
            families,
            available_extensions,
        })))
    }

    /// Driver-reported device name
    pub fn device_name(&self) -> String {
        name_from_raw(&self.properties.device_name)
            .to_string_lossy()
            .into_owned()
    }

    /// Format properties for `format`
    pub fn format_properties(&self, instance: &Instance, format: vk::Format) -> vk::FormatProperties {
        unsafe { instance.get_physical_device_format_properties(self.device, format) }
    }

    /// First candidate supporting `features` with the given tiling
    pub fn find_supported_format(
        &self,
        instance: &Instance,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> VulkanResult<vk::Format> {
        find_supported_format(candidates, tiling, features, |format| {
            self.format_properties(instance, format)
        })
    }
}

enum EvaluatedDevice {
    Suitable(Box<PhysicalDeviceInfo>),
    Rejected(vk::PhysicalDeviceProperties),
}

impl EvaluatedDevice {
    fn name(&self) -> String {
        let properties = match self {
            Self::Suitable(info) => &info.properties,
            Self::Rejected(properties) => properties,
        };
        name_from_raw(&properties.device_name)
            .to_string_lossy()
            .into_owned()
    }
}

impl From<EvaluatedDevice> for Option<PhysicalDeviceInfo> {
    fn from(evaluated: EvaluatedDevice) -> Self {
        match evaluated {
            EvaluatedDevice::Suitable(info) => Some(*info),
            EvaluatedDevice::Rejected(_) => None,
        }
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    device: Device,
    families: QueueFamilies,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    transfer_queue: vk::Queue,
    compute_queue: vk::Queue,
    enabled_extensions: Vec<CString>,
    swapchain_loader: SwapchainLoader,
    logger: Logger,
}

impl LogicalDevice {
    /// Create the logical device and fetch one queue per role.
    ///
    /// Required extensions are validated against the physical device first;
    /// nothing is created when one is missing.
    pub fn new(
        instance: &Instance,
        physical: &PhysicalDeviceInfo,
        extensions: &DeviceExtensions,
        config: &DeviceConfig,
        logger: &Logger,
    ) -> VulkanResult<Self> {
        let logger = logger.with_target("render_core::device");
        if let Err(e) = extensions.validate(&physical.available_extensions) {
            logger.error(format_args!("Device creation failed: {e}"));
            return Err(e);
        }

        let families = physical.families;
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let supported = physical.features;
        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(config.sampler_anisotropy && supported.sampler_anisotropy == vk::TRUE)
            .fill_mode_non_solid(config.fill_mode_non_solid && supported.fill_mode_non_solid == vk::TRUE)
            .build();

        let extension_ptrs: Vec<*const c_char> =
            extensions.required().iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&device_features);

        let device = unsafe { instance.create_device(physical.device, &create_info, None) }
            .context("vkCreateDevice")
            .map_err(|e| {
                logger.error(format_args!("Device creation failed: {e}"));
                e
            })?;

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let fetch = |family| unsafe { device.get_device_queue(family, 0) };
        let present_queue = queue_for_family(families.present, families.graphics, graphics_queue, fetch);
        let transfer_queue = queue_for_family(families.transfer, families.graphics, graphics_queue, fetch);
        let compute_queue = queue_for_family(families.compute, families.graphics, graphics_queue, fetch);

        let swapchain_loader = SwapchainLoader::new(instance, &device);

        logger.info(format_args!(
            "Logical device created with {} queue families and {} extensions",
            queue_infos.len(),
            extensions.required().len()
        ));

        Ok(Self {
            device,
            families,
            graphics_queue,
            present_queue,
            transfer_queue,
            compute_queue,
            enabled_extensions: extensions.required().to_vec(),
            swapchain_loader,
            logger,
        })
    }

    /// Raw device function table
    pub fn raw(&self) -> &Device {
        &self.device
    }

    /// Resolved queue families
    pub fn families(&self) -> QueueFamilies {
        self.families
    }

    /// Graphics operations queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Surface presentation queue
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Transfer queue
    pub fn transfer_queue(&self) -> vk::Queue {
        self.transfer_queue
    }

    /// Compute queue
    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    /// Enabled device extensions
    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }

    /// Swapchain extension loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    /// Block until the device finishes all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle() }.context("vkDeviceWaitIdle")
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
        self.logger.debug("Logical device destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn names(list: &[&str]) -> Vec<CString> {
        list.iter()
            .map(|name| CString::new(*name).expect("Should build CString"))
            .collect()
    }

    /// Dedicated transfer and compute families are preferred
    #[test]
    fn test_dedicated_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER | vk::QueueFlags::SPARSE_BINDING),
        ];

        let indices = QueueFamilyIndices::find(&families, |index| Ok(index == 0))
            .expect("Should resolve families");

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        assert_eq!(indices.compute, Some(1));
        assert_eq!(indices.transfer, Some(2));
        let resolved = indices.resolve().expect("Should be complete");
        assert_eq!(resolved.unique().len(), 3);
    }

    /// Without dedicated families, transfer and compute share graphics
    #[test]
    fn test_fallback_to_graphics_family() {
        let families = [family(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
        )];

        let indices = QueueFamilyIndices::find(&families, |_| Ok(true))
            .expect("Should resolve families");
        let resolved = indices.resolve().expect("Should be complete");

        assert_eq!(resolved.transfer, resolved.graphics);
        assert_eq!(resolved.compute, resolved.graphics);
        assert_eq!(resolved.unique().into_iter().collect::<Vec<_>>(), vec![0]);
        assert!(!resolved.split_present());
    }

    /// Present may resolve to a different family than graphics
    #[test]
    fn test_separate_present_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];

        let indices = QueueFamilyIndices::find(&families, |index| Ok(index == 1))
            .expect("Should resolve families");
        let resolved = indices.resolve().expect("Should be complete");

        assert_eq!(resolved.graphics, 0);
        assert_eq!(resolved.present, 1);
        assert!(resolved.split_present());
        assert_eq!(resolved.unique().len(), 2);
    }

    /// Selection fails explicitly when present cannot be resolved
    #[test]
    fn test_missing_present_family() {
        let families = [family(vk::QueueFlags::GRAPHICS)];

        let indices = QueueFamilyIndices::find(&families, |_| Ok(false))
            .expect("Should scan families");

        assert!(!indices.is_complete());
        assert!(matches!(indices.resolve(), Err(VulkanError::NotFound(_))));
    }

    /// Present support queries stop once a family is found
    #[test]
    fn test_present_query_stops_after_match() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
        ];
        let queries = Cell::new(0);

        let indices = QueueFamilyIndices::find(&families, |_| {
            queries.set(queries.get() + 1);
            Ok(true)
        })
        .expect("Should resolve families");

        assert_eq!(indices.present, Some(0));
        assert_eq!(queries.get(), 1);
    }

    /// Roles on the graphics family alias its queue instead of fetching
    #[test]
    fn test_queue_aliasing() {
        use ash::vk::Handle;

        let graphics_queue = vk::Queue::from_raw(0x10);
        let fetched = Cell::new(0);
        let fetch = |family: u32| {
            fetched.set(fetched.get() + 1);
            vk::Queue::from_raw(0x100 + u64::from(family))
        };

        let aliased = queue_for_family(0, 0, graphics_queue, fetch);
        assert_eq!(aliased, graphics_queue);
        assert_eq!(fetched.get(), 0);

        let separate = queue_for_family(2, 0, graphics_queue, fetch);
        assert_eq!(separate, vk::Queue::from_raw(0x102));
        assert_eq!(fetched.get(), 1);
    }

    /// A missing required device extension is a configuration error
    #[test]
    fn test_device_extension_validation() {
        let mut extensions = DeviceExtensions::from_config(&DeviceConfig::default())
            .expect("Should build extension set");
        extensions.add_required(
            CStr::from_bytes_with_nul(b"VK_KHR_ray_query\0").expect("Should be valid CStr"),
        );
        extensions.add_required(SwapchainLoader::name());

        assert_eq!(extensions.required().len(), 2);
        let available = names(&["VK_KHR_swapchain", "VK_KHR_maintenance1"]);

        let err = extensions
            .validate(&available)
            .expect_err("Should reject missing extension");
        assert!(matches!(&err, VulkanError::Configuration(msg) if msg.contains("VK_KHR_ray_query")));

        let available = names(&["VK_KHR_swapchain", "VK_KHR_ray_query"]);
        assert!(extensions.validate(&available).is_ok());
    }

    /// Candidates are scanned in order and the first match wins
    #[test]
    fn test_find_supported_format_order() {
        let properties_of = |format: vk::Format| {
            let mut props = vk::FormatProperties::default();
            if format == vk::Format::D32_SFLOAT_S8_UINT || format == vk::Format::D24_UNORM_S8_UINT {
                props.optimal_tiling_features = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                    | vk::FormatFeatureFlags::SAMPLED_IMAGE;
            }
            if format == vk::Format::D32_SFLOAT {
                props.linear_tiling_features = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
            }
            props
        };
        let candidates = [
            vk::Format::D32_SFLOAT,
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::D24_UNORM_S8_UINT,
        ];

        let optimal = find_supported_format(
            &candidates,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            properties_of,
        )
        .expect("Should find optimal format");
        assert_eq!(optimal, vk::Format::D32_SFLOAT_S8_UINT);

        let linear = find_supported_format(
            &candidates,
            vk::ImageTiling::LINEAR,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            properties_of,
        )
        .expect("Should find linear format");
        assert_eq!(linear, vk::Format::D32_SFLOAT);
    }

    /// Requested features must be a full subset of the supported ones
    #[test]
    fn test_find_supported_format_none_match() {
        let properties_of = |_| vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::SAMPLED_IMAGE,
            ..Default::default()
        };

        let err = find_supported_format(
            &[vk::Format::R8G8B8A8_SRGB],
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::SAMPLED_IMAGE | vk::FormatFeatureFlags::STORAGE_IMAGE,
            properties_of,
        )
        .expect_err("Should report unsupported format");

        assert!(matches!(err, VulkanError::UnsupportedFormat { candidates: 1, .. }));
    }

    /// Discrete GPUs outrank integrated ones, ties keep the first
    #[test]
    fn test_device_scoring() {
        let mut discrete = vk::PhysicalDeviceProperties {
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            ..Default::default()
        };
        discrete.limits.max_image_dimension2_d = 16384;
        let mut integrated = vk::PhysicalDeviceProperties {
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            ..Default::default()
        };
        integrated.limits.max_image_dimension2_d = 16384;

        assert_eq!(score_device(&discrete), 1016);
        assert_eq!(score_device(&integrated), 516);

        let scores = [Some(516), None, Some(1016), Some(1016)];
        assert_eq!(best_candidate(&scores), Some(2));
        assert_eq!(best_candidate(&[None, None]), None);
        assert_eq!(best_candidate(&[]), None);
    }
}
