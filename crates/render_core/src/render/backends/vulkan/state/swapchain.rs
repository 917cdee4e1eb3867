//! Presentation chain
//!
//! Owns the swapchain handle and one image view per swapchain image. The
//! chain is rebuilt from scratch whenever the surface goes out of date:
//! views and the swapchain are destroyed, then the whole selection and
//! creation sequence runs again against the new extent.
//!
//! Acquisition retries at most once after a rebuild. Presentation never
//! retries; the frame is dropped and the next one uses the rebuilt chain.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::core::config::SwapchainConfig;
use crate::foundation::logging::Logger;
use crate::render::backends::vulkan::{
    LogicalDevice, PhysicalDeviceInfo, QueueFamilies, Surface, VkResultExt, VulkanError,
    VulkanResult,
};

/// Usage every swapchain image is created with
const IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::TRANSFER_DST.as_raw(),
);

/// Exact `(format, color space)` match, else the first advertised format
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> VulkanResult<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|candidate| {
            candidate.format == preferred.format && candidate.color_space == preferred.color_space
        })
        .or_else(|| available.first())
        .copied()
        .ok_or_else(|| VulkanError::Configuration("Surface advertises no formats".to_string()))
}

/// FIFO when vsync is forced, else the preferred mode if advertised, else FIFO
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
    vsync: bool,
) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface-defined extent, or the window extent clamped into the surface bounds
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: window
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: window
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// Configured minimum clamped to the surface bounds; a max of 0 is unbounded
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let max = if caps.max_image_count > 0 {
        caps.max_image_count
    } else {
        u32::MAX
    };
    requested.clamp(caps.min_image_count, max.max(caps.min_image_count))
}

/// Concurrent sharing across distinct graphics and present families
pub fn sharing_for(families: &QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.split_present() {
        (
            vk::SharingMode::CONCURRENT,
            vec![families.graphics, families.present],
        )
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    }
}

/// Opaque composition when supported, else the first supported mode
pub fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|&mode| supported.contains(mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Image acquired from the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index into the chain's images
    pub index: u32,
    /// The surface still works but no longer matches exactly
    pub suboptimal: bool,
}

/// Outcome of a present request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// Image queued for display
    Presented,
    /// Image queued but the surface no longer matches exactly
    Suboptimal,
    /// The surface was out of date; the chain was rebuilt and the frame dropped
    Recreated,
}

struct ChainState {
    swapchain: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
}

/// Swapchain plus image views, rebuilt on surface invalidation
pub struct PresentationChain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    physical_device: vk::PhysicalDevice,
    families: QueueFamilies,
    config: SwapchainConfig,
    window_extent: vk::Extent2D,
    state: Option<ChainState>,
    recreate_count: u32,
    logger: Logger,
}

impl PresentationChain {
    /// Create the chain for `surface` at `window_extent`.
    ///
    /// A zero-sized extent (minimized window) defers creation until the
    /// next [`recreate`](Self::recreate).
    pub fn new(
        device: &LogicalDevice,
        physical: &PhysicalDeviceInfo,
        surface: &Surface,
        window_extent: vk::Extent2D,
        config: &SwapchainConfig,
        logger: &Logger,
    ) -> VulkanResult<Self> {
        let mut chain = Self {
            device: device.raw().clone(),
            swapchain_loader: device.swapchain_loader().clone(),
            physical_device: physical.device,
            families: device.families(),
            config: config.clone(),
            window_extent,
            state: None,
            recreate_count: 0,
            logger: logger.with_target("render_core::swapchain"),
        };

        match chain.build(surface) {
            Ok(Some(state)) => {
                chain.logger.info(format_args!(
                    "Swapchain created: {}x{}, {} images, {:?}, {:?}",
                    state.extent.width,
                    state.extent.height,
                    state.images.len(),
                    state.format.format,
                    state.present_mode
                ));
                chain.state = Some(state);
            }
            Ok(None) => chain
                .logger
                .warn("Swapchain creation deferred: surface has zero extent"),
            Err(e) => {
                chain.logger.error(format_args!("Swapchain creation failed: {e}"));
                return Err(e);
            }
        }
        Ok(chain)
    }

    fn build(&self, surface: &Surface) -> VulkanResult<Option<ChainState>> {
        let caps = surface.capabilities(self.physical_device)?;
        let formats = surface.formats(self.physical_device)?;
        let present_modes = surface.present_modes(self.physical_device)?;

        let extent = choose_extent(&caps, self.window_extent);
        if extent.width == 0 || extent.height == 0 {
            return Ok(None);
        }

        let format = choose_surface_format(&formats, self.config.preferred_surface_format())?;
        let present_mode = choose_present_mode(
            &present_modes,
            self.config.preferred_present_mode.to_vk(),
            self.config.enable_vsync,
        );
        let image_count = choose_image_count(&caps, self.config.min_image_count);

        if !caps.supported_usage_flags.contains(IMAGE_USAGE) {
            return Err(VulkanError::Configuration(format!(
                "Surface does not support image usage {IMAGE_USAGE:?}"
            )));
        }

        let (sharing_mode, family_indices) = sharing_for(&self.families);
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(IMAGE_USAGE)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(caps.current_transform)
            .composite_alpha(choose_composite_alpha(caps.supported_composite_alpha))
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
            .context("vkCreateSwapchainKHR")?;

        let mut state = ChainState {
            swapchain,
            format,
            present_mode,
            extent,
            images: Vec::new(),
            image_views: Vec::new(),
        };
        if let Err(e) = self.create_views(&mut state) {
            self.destroy_state(state);
            return Err(e);
        }
        Ok(Some(state))
    }

    fn create_views(&self, state: &mut ChainState) -> VulkanResult<()> {
        state.images = unsafe { self.swapchain_loader.get_swapchain_images(state.swapchain) }
            .context("vkGetSwapchainImagesKHR")?;

        for &image in &state.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(state.format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { self.device.create_image_view(&create_info, None) }
                .context("vkCreateImageView (swapchain)")?;
            state.image_views.push(view);
        }
        Ok(())
    }

    fn destroy_state(&self, state: ChainState) {
        unsafe {
            for view in state.image_views {
                self.device.destroy_image_view(view, None);
            }
            // Images belong to the swapchain
            self.swapchain_loader.destroy_swapchain(state.swapchain, None);
        }
    }

    /// Destroy views and swapchain, then rebuild against `window_extent`.
    ///
    /// Waits for the device to go idle first since the old views may still
    /// be referenced by in-flight work.
    pub fn recreate(
        &mut self,
        surface: &Surface,
        window_extent: vk::Extent2D,
        reason: &str,
    ) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle() }.context("vkDeviceWaitIdle")?;

        self.window_extent = window_extent;
        if let Some(state) = self.state.take() {
            self.destroy_state(state);
        }
        self.recreate_count += 1;

        match self.build(surface) {
            Ok(Some(state)) => {
                self.logger.warn(format_args!(
                    "Swapchain recreated ({reason}): {}x{}, {} images, recreation #{}",
                    state.extent.width,
                    state.extent.height,
                    state.images.len(),
                    self.recreate_count
                ));
                self.state = Some(state);
                Ok(())
            }
            Ok(None) => {
                self.logger.warn(format_args!(
                    "Swapchain recreation deferred ({reason}): surface has zero extent"
                ));
                Ok(())
            }
            Err(e) => {
                self.logger.error(format_args!("Swapchain recreation failed ({reason}): {e}"));
                Err(e)
            }
        }
    }

    fn try_acquire(&self, signal: vk::Semaphore, timeout: u64) -> VulkanResult<AcquiredImage> {
        let state = self.state.as_ref().ok_or(VulkanError::SurfaceOutOfDate)?;
        let (index, suboptimal) = unsafe {
            self.swapchain_loader
                .acquire_next_image(state.swapchain, timeout, signal, vk::Fence::null())
        }
        .context("vkAcquireNextImageKHR")?;
        Ok(AcquiredImage { index, suboptimal })
    }

    /// Acquire the next image, signaling `signal` when it is ready.
    ///
    /// `window_extent` is the drawable size reported by the window layer for
    /// this frame; any rebuild triggered here or by the following present
    /// uses it. An out-of-date surface triggers one rebuild and one retry. A
    /// second out-of-date result is returned as [`VulkanError::SurfaceOutOfDate`].
    pub fn acquire_next_image(
        &mut self,
        surface: &Surface,
        window_extent: vk::Extent2D,
        signal: vk::Semaphore,
        timeout: u64,
    ) -> VulkanResult<AcquiredImage> {
        self.window_extent = window_extent;
        match self.try_acquire(signal, timeout) {
            Err(e) if e.is_out_of_date() => {
                self.recreate(surface, window_extent, "acquire out of date")?;
                self.try_acquire(signal, timeout)
            }
            other => other,
        }
    }

    /// Queue `image_index` for display after `wait` semaphores signal
    pub fn present(
        &mut self,
        surface: &Surface,
        queue: vk::Queue,
        wait: &[vk::Semaphore],
        image_index: u32,
    ) -> VulkanResult<PresentStatus> {
        let Some(state) = self.state.as_ref() else {
            return Err(VulkanError::invalid("present without a swapchain"));
        };

        let swapchains = [state.swapchain];
        let indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
            .context("vkQueuePresentKHR");
        match result {
            Ok(false) => Ok(PresentStatus::Presented),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(e) if e.is_out_of_date() => {
                self.recreate(surface, self.window_extent, "present out of date")?;
                Ok(PresentStatus::Recreated)
            }
            Err(e) => Err(e),
        }
    }

    /// A swapchain currently exists
    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    /// Swapchain handle, null while creation is deferred
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.state
            .as_ref()
            .map_or_else(vk::SwapchainKHR::null, |state| state.swapchain)
    }

    /// Swapchain images
    pub fn images(&self) -> &[vk::Image] {
        self.state
            .as_ref()
            .map_or(&[][..], |state| state.images.as_slice())
    }

    /// One view per swapchain image
    pub fn image_views(&self) -> &[vk::ImageView] {
        self.state
            .as_ref()
            .map_or(&[][..], |state| state.image_views.as_slice())
    }

    /// Selected surface format
    pub fn format(&self) -> Option<vk::SurfaceFormatKHR> {
        self.state.as_ref().map(|state| state.format)
    }

    /// Selected present mode
    pub fn present_mode(&self) -> Option<vk::PresentModeKHR> {
        self.state.as_ref().map(|state| state.present_mode)
    }

    /// Extent of the current images, zero while deferred
    pub fn extent(&self) -> vk::Extent2D {
        self.state
            .as_ref()
            .map_or_else(vk::Extent2D::default, |state| state.extent)
    }

    /// Last extent supplied by the window layer
    pub fn window_extent(&self) -> vk::Extent2D {
        self.window_extent
    }

    /// Number of rebuilds since creation
    pub fn recreate_count(&self) -> u32 {
        self.recreate_count
    }
}

impl Drop for PresentationChain {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.destroy_state(state);
        }
        self.logger.debug("Swapchain destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    /// Vsync forces FIFO even when the preferred mode is available
    #[test]
    fn test_vsync_overrides_mailbox() {
        let available = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];

        let mode = choose_present_mode(&available, vk::PresentModeKHR::MAILBOX, true);
        assert_eq!(mode, vk::PresentModeKHR::FIFO);

        let mode = choose_present_mode(&available, vk::PresentModeKHR::MAILBOX, false);
        assert_eq!(mode, vk::PresentModeKHR::MAILBOX);
    }

    /// Unavailable preferred modes fall back to FIFO
    #[test]
    fn test_present_mode_fallback() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];

        let mode = choose_present_mode(&available, vk::PresentModeKHR::MAILBOX, false);
        assert_eq!(mode, vk::PresentModeKHR::FIFO);
    }

    /// A defined current extent wins over the requested window size
    #[test]
    fn test_defined_current_extent_used_verbatim() {
        let caps = caps((800, 600), (1, 1), (4096, 4096));

        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 1024,
                height: 768,
            },
        );
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    /// An undefined current extent clamps the window size into bounds
    #[test]
    fn test_undefined_extent_is_clamped() {
        let caps = caps((u32::MAX, u32::MAX), (640, 480), (1920, 1080));

        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 4000,
                height: 100,
            },
        );
        assert_eq!((extent.width, extent.height), (1920, 480));
    }

    /// Image counts clamp to surface bounds, max 0 meaning unbounded
    #[test]
    fn test_image_count_clamp() {
        let mut caps = caps((800, 600), (1, 1), (800, 600));
        caps.min_image_count = 2;
        caps.max_image_count = 3;
        assert_eq!(choose_image_count(&caps, 1), 2);
        assert_eq!(choose_image_count(&caps, 2), 2);
        assert_eq!(choose_image_count(&caps, 8), 3);

        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps, 8), 8);
    }

    /// Exact format and color space match first, else the first advertised
    #[test]
    fn test_surface_format_selection() {
        let preferred = surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let available = [
            surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&available, preferred).expect("Should choose format");
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);

        let available = [
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        let chosen = choose_surface_format(&available, preferred).expect("Should choose format");
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);

        assert!(matches!(
            choose_surface_format(&[], preferred),
            Err(VulkanError::Configuration(_))
        ));
    }

    /// Distinct graphics and present families share images concurrently
    #[test]
    fn test_sharing_mode() {
        let shared = QueueFamilies {
            graphics: 0,
            present: 0,
            transfer: 1,
            compute: 0,
        };
        let (mode, indices) = sharing_for(&shared);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(indices.is_empty());

        let split = QueueFamilies {
            present: 2,
            ..shared
        };
        let (mode, indices) = sharing_for(&split);
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(indices, vec![0, 2]);
    }

    /// Opaque composition is preferred when available
    #[test]
    fn test_composite_alpha() {
        let all = vk::CompositeAlphaFlagsKHR::OPAQUE | vk::CompositeAlphaFlagsKHR::INHERIT;
        assert_eq!(choose_composite_alpha(all), vk::CompositeAlphaFlagsKHR::OPAQUE);
        assert_eq!(
            choose_composite_alpha(vk::CompositeAlphaFlagsKHR::INHERIT),
            vk::CompositeAlphaFlagsKHR::INHERIT
        );
    }
}
