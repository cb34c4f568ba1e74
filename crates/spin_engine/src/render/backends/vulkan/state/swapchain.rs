//! Swapchain wrapper with RAII cleanup
//!
//! Format, mode and extent negotiation happens in the backend-agnostic
//! `SwapchainManager`; this type only turns a `ChainRequest` into a handle.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;

use crate::render::backends::vulkan::{ResultExt, VulkanResult};
use crate::render::system::{ChainRequest, PresentableChain};

/// Live swapchain and the images the presentation engine gave us
pub struct VulkanChain {
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl VulkanChain {
    /// Create a swapchain for `surface`
    ///
    /// `old_swapchain` lets the driver recycle resources from the chain being replaced;
    /// the caller keeps that chain alive until this call returns.
    pub fn new(
        swapchain_loader: SwapchainLoader,
        surface: vk::SurfaceKHR,
        request: &ChainRequest,
        queue_families: &[u32],
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> VulkanResult<Self> {
        let sharing_mode = if queue_families.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(request.image_count)
            .image_format(request.format.format)
            .image_color_space(request.format.color_space)
            .image_extent(request.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .pre_transform(request.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(request.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain.unwrap_or_else(vk::SwapchainKHR::null));
        if sharing_mode == vk::SharingMode::CONCURRENT {
            create_info = create_info.queue_family_indices(queue_families);
        }

        let swapchain =
            unsafe { swapchain_loader.create_swapchain(&create_info, None) }.context("vkCreateSwapchainKHR")?;

        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e).context("vkGetSwapchainImagesKHR");
            }
        };

        log::info!(
            "Swapchain created: {}x{}, {:?}, {:?}, {} images",
            request.extent.width,
            request.extent.height,
            request.format.format,
            request.present_mode,
            images.len()
        );

        Ok(Self {
            swapchain_loader,
            swapchain,
            images,
            format: request.format,
            extent: request.extent,
        })
    }

    /// Get the swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Get the swapchain images
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Get the swapchain loader
    pub fn loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }
}

impl PresentableChain for VulkanChain {
    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn format(&self) -> vk::Format {
        self.format.format
    }

    fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for VulkanChain {
    fn drop(&mut self) {
        log::debug!("Destroying swapchain {:?}", self.swapchain);
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}
