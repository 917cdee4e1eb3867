//! Presentation surface
//!
//! [`SurfaceProvider`] is the window-layer capability the core consumes: it
//! names the instance extensions it needs, creates a native surface and
//! reports the drawable extent. Every [`WindowHandle`] gets an
//! implementation through `ash-window`.

use ash::extensions::khr;
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::{CStr, CString};

use crate::render::api::WindowHandle;
use crate::render::backends::vulkan::{GraphicsInstance, VkResultExt, VulkanResult};

/// Window-layer capability consumed by the core
pub trait SurfaceProvider {
    /// Instance extensions required to create the surface
    fn required_extensions(&self) -> VulkanResult<Vec<CString>>;

    /// Create a native drawing surface for `instance`
    fn create_surface(&self, entry: &Entry, instance: &Instance) -> VulkanResult<vk::SurfaceKHR>;

    /// Current drawable size
    fn current_extent(&self) -> vk::Extent2D;
}

impl<W: WindowHandle + ?Sized> SurfaceProvider for W {
    fn required_extensions(&self) -> VulkanResult<Vec<CString>> {
        let names = ash_window::enumerate_required_extensions(self.raw_display_handle())
            .context("enumerate surface extensions")?;
        // Pointers refer to static extension name constants inside ash
        Ok(names
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) }.to_owned())
            .collect())
    }

    fn create_surface(&self, entry: &Entry, instance: &Instance) -> VulkanResult<vk::SurfaceKHR> {
        unsafe {
            ash_window::create_surface(
                entry,
                instance,
                self.raw_display_handle(),
                self.raw_window_handle(),
                None,
            )
            .context("vkCreateSurfaceKHR")
        }
    }

    fn current_extent(&self) -> vk::Extent2D {
        let (width, height) = WindowHandle::current_extent(self);
        vk::Extent2D { width, height }
    }
}

/// Vulkan surface wrapper for presentation
pub struct Surface {
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
}

impl Surface {
    /// Create a surface through the provider
    pub fn new<P: SurfaceProvider + ?Sized>(
        instance: &GraphicsInstance,
        provider: &P,
    ) -> VulkanResult<Self> {
        let surface_loader = khr::Surface::new(instance.entry(), instance.raw());
        let surface = provider.create_surface(instance.entry(), instance.raw())?;

        Ok(Self {
            surface_loader,
            surface,
        })
    }

    /// Get the underlying surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get surface capabilities for a physical device
    pub fn capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .context("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
        }
    }

    /// Get surface formats for a physical device
    pub fn formats(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .context("vkGetPhysicalDeviceSurfaceFormatsKHR")
        }
    }

    /// Get surface present modes for a physical device
    pub fn present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
                .context("vkGetPhysicalDeviceSurfacePresentModesKHR")
        }
    }

    /// Check if a queue family supports presentation to this surface
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> VulkanResult<bool> {
        unsafe {
            self.surface_loader.get_physical_device_surface_support(
                physical_device,
                queue_family_index,
                self.surface,
            )
            .context("vkGetPhysicalDeviceSurfaceSupportKHR")
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
