//! Graphics device capability set
//!
//! The frame/swapchain lifecycle code only talks to the GPU through [`GraphicsDevice`].
//! The Vulkan backend implements it with ash; tests implement it with a journaling mock
//! so the recreation ordering and the pause protocol can be exercised without a driver.
//!
//! Every associated resource type owns its handle and releases it in `Drop`, so the
//! lifecycle code expresses destruction order purely through ownership.

use ash::vk;

use crate::foundation::math::UniformBufferObject;
use crate::render::backends::vulkan::VulkanResult;

/// Surface properties needed to negotiate a swapchain
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Image count, extent and transform limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported color formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Everything needed to create a swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainRequest {
    /// Color format and color space
    pub format: vk::SurfaceFormatKHR,
    /// Presentation mode
    pub present_mode: vk::PresentModeKHR,
    /// Image extent
    pub extent: vk::Extent2D,
    /// Minimum number of images
    pub image_count: u32,
    /// Surface transform to apply
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// Result of acquiring a presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is available; `suboptimal` means the chain still works but should be rebuilt
    Acquired {
        /// Index into the chain's images
        image_index: u32,
        /// The chain no longer matches the surface exactly
        suboptimal: bool,
    },
    /// The chain is out of date and must be recreated before acquiring again
    Stale,
    /// The surface itself is gone
    SurfaceLost,
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented normally
    Presented,
    /// Presented, but the chain should be recreated
    Suboptimal,
    /// Not presented; the chain is out of date
    Stale,
    /// Not presented; the surface is gone
    SurfaceLost,
}

/// A negotiated chain of presentable images
pub trait PresentableChain {
    /// Image extent
    fn extent(&self) -> vk::Extent2D;
    /// Color format of the images
    fn format(&self) -> vk::Format;
    /// Number of images actually created by the presentation engine
    fn image_count(&self) -> usize;
}

/// Capability set consumed by the swapchain/frame lifecycle
///
/// Methods taking `&mut self` touch state that belongs to the device itself (command
/// and descriptor pools, per-image buffers, the surface); the rest only create or use
/// handles.
pub trait GraphicsDevice: Send {
    /// Swapchain
    type Chain: PresentableChain + Send;
    /// Per-image view
    type ImageView: Send;
    /// Per-image framebuffer
    type Framebuffer: Send;
    /// Extent-dependent pipeline bundle (render pass, layouts, pipeline)
    type Pipeline: Send;
    /// GPU-GPU signal
    type Semaphore: Send;
    /// GPU-CPU signal
    type Fence: Send;

    /// Block until the device has finished all submitted work
    fn wait_idle(&self) -> VulkanResult<()>;

    /// Query the surface for chain negotiation
    fn surface_support(&self) -> VulkanResult<SurfaceSupport>;

    /// Create a chain, passing `retiring` as the old-swapchain hint
    fn create_chain(&mut self, request: &ChainRequest, retiring: Option<&Self::Chain>) -> VulkanResult<Self::Chain>;

    /// Create one view per chain image
    fn create_image_views(&self, chain: &Self::Chain) -> VulkanResult<Vec<Self::ImageView>>;

    /// Build the render pass, layouts and pipeline for `format` and `extent`
    fn create_pipeline(&mut self, format: vk::Format, extent: vk::Extent2D) -> VulkanResult<Self::Pipeline>;

    /// Create a framebuffer for one image view
    fn create_framebuffer(
        &self,
        pipeline: &Self::Pipeline,
        view: &Self::ImageView,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self::Framebuffer>;

    /// Reset command and descriptor pools, releasing every per-image recording at once
    fn reset_pools(&mut self) -> VulkanResult<()>;

    /// Record the draw commands for one chain image
    fn record_commands(
        &mut self,
        image_index: usize,
        pipeline: &Self::Pipeline,
        framebuffer: &Self::Framebuffer,
        extent: vk::Extent2D,
    ) -> VulkanResult<()>;

    /// Create a binary semaphore
    fn create_semaphore(&self) -> VulkanResult<Self::Semaphore>;

    /// Create a fence, optionally already signaled
    fn create_fence(&self, signaled: bool) -> VulkanResult<Self::Fence>;

    /// Wait for a fence with a timeout in nanoseconds
    fn wait_for_fence(&self, fence: &Self::Fence, timeout_ns: u64) -> VulkanResult<()>;

    /// Return a fence to the unsignaled state
    fn reset_fence(&self, fence: &Self::Fence) -> VulkanResult<()>;

    /// Acquire the next image, signaling `signal` when it is ready for rendering
    fn acquire_next_image(&self, chain: &Self::Chain, signal: &Self::Semaphore) -> VulkanResult<AcquireOutcome>;

    /// Upload the uniform block used by the recording of `image_index`
    fn write_uniforms(&mut self, image_index: usize, ubo: &UniformBufferObject) -> VulkanResult<()>;

    /// Submit the recording of `image_index`
    fn submit(
        &self,
        image_index: usize,
        wait: &Self::Semaphore,
        signal: &Self::Semaphore,
        fence: &Self::Fence,
    ) -> VulkanResult<()>;

    /// Queue `image_index` for presentation once `wait` is signaled
    fn present(&self, chain: &Self::Chain, image_index: u32, wait: &Self::Semaphore) -> VulkanResult<PresentOutcome>;

    /// Destroy and recreate the window surface
    ///
    /// No chain may exist when this is called.
    fn recreate_surface(&mut self) -> VulkanResult<()>;
}
