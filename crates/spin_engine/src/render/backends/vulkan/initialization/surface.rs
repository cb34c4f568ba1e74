//! Vulkan surface management
//!
//! Owns the window surface and answers the capability queries used to negotiate a
//! swapchain. The surface can be recreated in place when the presentation engine
//! reports it lost.

use ash::extensions::khr::Surface as SurfaceLoader;
use ash::{vk, Entry, Instance};

use crate::render::backends::vulkan::{ResultExt, VulkanError, VulkanResult};
use crate::render::system::SurfaceSupport;
use crate::render::window::SurfaceSource;

/// Vulkan surface wrapper for presentation
pub struct Surface {
    instance: vk::Instance,
    surface_loader: SurfaceLoader,
    surface: vk::SurfaceKHR,
    source: SurfaceSource,
}

impl Surface {
    /// Create a surface for the window behind `source`
    pub fn new(entry: &Entry, instance: &Instance, source: SurfaceSource) -> VulkanResult<Self> {
        let surface_loader = SurfaceLoader::new(entry, instance);
        let surface = Self::create_handle(instance.handle(), source)?;

        Ok(Self {
            instance: instance.handle(),
            surface_loader,
            surface,
            source,
        })
    }

    fn create_handle(instance: vk::Instance, source: SurfaceSource) -> VulkanResult<vk::SurfaceKHR> {
        source
            .create_surface(instance)
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to create surface: {e}")))
    }

    /// Get the underlying surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the surface loader
    pub fn loader(&self) -> &SurfaceLoader {
        &self.surface_loader
    }

    /// Destroy the current surface and create a fresh one for the same window
    ///
    /// No swapchain created from the old surface may still exist.
    pub fn recreate(&mut self) -> VulkanResult<()> {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
        self.surface = vk::SurfaceKHR::null();
        self.surface = Self::create_handle(self.instance, self.source)?;
        log::info!("Window surface recreated");
        Ok(())
    }

    /// Get surface capabilities for a physical device
    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
        }
        .context("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
    }

    /// Get surface formats for a physical device
    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)
        }
        .context("vkGetPhysicalDeviceSurfaceFormatsKHR")
    }

    /// Get surface present modes for a physical device
    pub fn present_modes(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
        }
        .context("vkGetPhysicalDeviceSurfacePresentModesKHR")
    }

    /// Everything needed to negotiate a swapchain
    pub fn support(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<SurfaceSupport> {
        Ok(SurfaceSupport {
            capabilities: self.capabilities(physical_device)?,
            formats: self.formats(physical_device)?,
            present_modes: self.present_modes(physical_device)?,
        })
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        if self.surface != vk::SurfaceKHR::null() {
            unsafe {
                self.surface_loader.destroy_surface(self.surface, None);
            }
        }
    }
}
