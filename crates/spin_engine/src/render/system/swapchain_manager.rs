//! Swapchain lifecycle
//!
//! Recreation runs a small state machine:
//!
//! - **Draining**: the live chain becomes the retiring chain, the device goes idle and
//!   everything derived from the old chain is dropped. The retiring chain itself stays
//!   alive so it can be passed as `old_swapchain`.
//! - **Rebuilding**: a new chain and everything derived from it is built in locals and
//!   only committed once every step succeeded. The pipeline bundle is rebuilt in place
//!   and destroyed again if a later step fails. A zero-sized extent skips this step.
//! - **Live**: the retiring chain and the semaphores that may still reference it are
//!   dropped, whether or not the rebuild happened.

use ash::vk;

use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::system::{
    AcquireOutcome, ChainRequest, FrameResourceSet, FrameSlot, GraphicsDevice, PipelineResources, PresentOutcome,
    PresentableChain, SurfaceSupport,
};

/// Lifecycle state of the swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// No chain exists (startup, minimized, or after surface loss)
    Empty,
    /// Waiting for the GPU and dropping chain-derived resources
    Draining,
    /// Building the replacement
    Rebuilding,
    /// A chain and all of its derived resources exist
    Live,
}

/// Result of a successful recreation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreateOutcome {
    /// A new chain is ready to draw
    Live,
    /// The surface has a zero-sized extent; nothing was built
    Minimized,
}

/// Everything built during the rebuild step, committed only as a whole
struct Rebuilt<D: GraphicsDevice> {
    chain: D::Chain,
    views: Vec<D::ImageView>,
    framebuffers: Vec<D::Framebuffer>,
    frames: FrameResourceSet<D>,
}

/// Owns the live chain, its views and framebuffers, and the retiring chain
///
/// Fields drop in declaration order: framebuffers, views, the live chain, the retiring
/// chain, then the availability semaphores retired with it.
pub struct SwapchainManager<D: GraphicsDevice> {
    framebuffers: Vec<D::Framebuffer>,
    views: Vec<D::ImageView>,
    chain: Option<D::Chain>,
    retiring: Option<D::Chain>,
    retired_semaphores: Vec<D::Semaphore>,
    state: ChainState,
    has_live_chain: bool,
}

impl<D: GraphicsDevice> Default for SwapchainManager<D> {
    fn default() -> Self {
        Self {
            framebuffers: Vec::new(),
            views: Vec::new(),
            chain: None,
            retiring: None,
            retired_semaphores: Vec::new(),
            state: ChainState::Empty,
            has_live_chain: false,
        }
    }
}

impl<D: GraphicsDevice> SwapchainManager<D> {
    /// Query the surface; a surface without formats or present modes is unusable
    pub fn query_support(device: &D) -> VulkanResult<SurfaceSupport> {
        Self::check_support(device.surface_support()?)
    }

    fn check_support(support: SurfaceSupport) -> VulkanResult<SurfaceSupport> {
        if support.formats.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "Surface reports no supported formats".to_string(),
            ));
        }
        if support.present_modes.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "Surface reports no present modes".to_string(),
            ));
        }
        Ok(support)
    }

    /// Prefer sRGB BGRA, else the first format offered
    pub fn choose_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
        formats
            .iter()
            .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .or_else(|| formats.first())
            .copied()
            .unwrap_or_default()
    }

    /// Prefer mailbox; FIFO is always available
    pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
        modes
            .iter()
            .copied()
            .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
            .unwrap_or(vk::PresentModeKHR::FIFO)
    }

    /// Use the surface's extent when it defines one, else clamp the framebuffer size
    pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer_size: (u32, u32)) -> vk::Extent2D {
        if capabilities.current_extent.width != u32::MAX {
            return capabilities.current_extent;
        }
        vk::Extent2D {
            width: framebuffer_size
                .0
                .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
            height: framebuffer_size
                .1
                .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
        }
    }

    /// One more than the minimum, within the maximum when there is one
    pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
        let desired = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            desired.min(capabilities.max_image_count)
        } else {
            desired
        }
    }

    /// Create a chain for `request`, passing the retiring chain as the old-swapchain hint
    pub fn create(&self, device: &mut D, request: &ChainRequest) -> VulkanResult<D::Chain> {
        device.create_chain(request, self.retiring.as_ref())
    }

    /// Acquire the next image, signaling the slot's availability semaphore
    pub fn acquire_next(&self, device: &D, slot: &FrameSlot<D>) -> VulkanResult<AcquireOutcome> {
        match &self.chain {
            Some(chain) => device.acquire_next_image(chain, &slot.image_available),
            None => Ok(AcquireOutcome::Stale),
        }
    }

    /// Queue `image_index` of the live chain for presentation
    pub fn present(&self, device: &D, image_index: u32, wait: &D::Semaphore) -> VulkanResult<PresentOutcome> {
        match &self.chain {
            Some(chain) => device.present(chain, image_index, wait),
            None => Ok(PresentOutcome::Stale),
        }
    }

    /// Tear down and rebuild the chain and everything derived from it
    pub fn recreate(
        &mut self,
        device: &mut D,
        pipeline: &mut PipelineResources<D>,
        frames: &mut FrameResourceSet<D>,
        framebuffer_size: (u32, u32),
        frames_in_flight: usize,
    ) -> VulkanResult<RecreateOutcome> {
        self.state = ChainState::Draining;
        log::debug!("Swapchain draining");
        if let Err(e) = self.drain(device, pipeline, frames) {
            // The retiring chain outlives whatever the failed drain left behind
            self.state = ChainState::Empty;
            return Err(e);
        }

        self.state = ChainState::Rebuilding;
        log::debug!("Swapchain rebuilding for {}x{}", framebuffer_size.0, framebuffer_size.1);
        let rebuilt = self.rebuild(device, pipeline, framebuffer_size, frames_in_flight);

        let outcome = match rebuilt {
            Ok(Some(rebuilt)) => {
                self.views = rebuilt.views;
                self.framebuffers = rebuilt.framebuffers;
                self.chain = Some(rebuilt.chain);
                *frames = rebuilt.frames;
                Ok(RecreateOutcome::Live)
            }
            Ok(None) => Ok(RecreateOutcome::Minimized),
            Err(e) => {
                pipeline.destroy();
                Err(e)
            }
        };

        self.release_retiring();
        self.has_live_chain = self.chain.is_some();
        self.state = if self.has_live_chain {
            ChainState::Live
        } else {
            ChainState::Empty
        };
        log::debug!("Swapchain state now {:?}", self.state);

        outcome
    }

    /// Drop everything that references the surface so it can be recreated
    pub fn teardown_for_surface_loss(
        &mut self,
        device: &mut D,
        pipeline: &mut PipelineResources<D>,
        frames: &mut FrameResourceSet<D>,
    ) -> VulkanResult<()> {
        self.state = ChainState::Draining;
        let drained = self.drain(device, pipeline, frames);
        if drained.is_ok() {
            self.release_retiring();
        }
        self.state = ChainState::Empty;
        drained
    }

    fn drain(
        &mut self,
        device: &mut D,
        pipeline: &mut PipelineResources<D>,
        frames: &mut FrameResourceSet<D>,
    ) -> VulkanResult<()> {
        self.has_live_chain = false;
        if let Some(chain) = self.chain.take() {
            self.retiring = Some(chain);
        }
        if self.retiring.is_some() {
            device.wait_idle()?;
        }

        self.retired_semaphores.extend(frames.retire());
        pipeline.destroy();
        self.framebuffers.clear();
        self.views.clear();
        device.reset_pools()
    }

    /// The old chain goes first, then the semaphores its last acquire may have used
    fn release_retiring(&mut self) {
        self.retiring = None;
        self.retired_semaphores.clear();
    }

    fn rebuild(
        &self,
        device: &mut D,
        pipeline: &mut PipelineResources<D>,
        framebuffer_size: (u32, u32),
        frames_in_flight: usize,
    ) -> VulkanResult<Option<Rebuilt<D>>> {
        let support = Self::query_support(device)?;
        let extent = Self::choose_extent(&support.capabilities, framebuffer_size);
        if extent.width == 0 || extent.height == 0 {
            log::debug!("Surface is zero-sized; skipping rebuild");
            return Ok(None);
        }

        let request = ChainRequest {
            format: Self::choose_format(&support.formats),
            present_mode: Self::choose_present_mode(&support.present_modes),
            extent,
            image_count: Self::choose_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        };

        let chain = self.create(device, &request)?;
        let extent = chain.extent();
        let views = device.create_image_views(&chain)?;
        let bundle = pipeline.rebuild(device, chain.format(), extent)?;
        let framebuffers = views
            .iter()
            .map(|view| device.create_framebuffer(bundle, view, extent))
            .collect::<VulkanResult<Vec<_>>>()?;
        for (image_index, framebuffer) in framebuffers.iter().enumerate() {
            device.record_commands(image_index, bundle, framebuffer, extent)?;
        }
        let frames = FrameResourceSet::create(device, frames_in_flight, chain.image_count())?;

        Ok(Some(Rebuilt {
            chain,
            views,
            framebuffers,
            frames,
        }))
    }

    /// The live chain
    pub fn chain(&self) -> Option<&D::Chain> {
        self.chain.as_ref()
    }

    /// Extent of the live chain, zero when there is none
    pub fn extent(&self) -> vk::Extent2D {
        self.chain.as_ref().map(|chain| chain.extent()).unwrap_or_default()
    }

    /// Framebuffer for one chain image
    pub fn framebuffer(&self, image_index: usize) -> Option<&D::Framebuffer> {
        self.framebuffers.get(image_index)
    }

    /// Number of framebuffers
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Number of image views
    pub fn image_view_count(&self) -> usize {
        self.views.len()
    }

    /// Lifecycle state
    pub fn state(&self) -> ChainState {
        self.state
    }

    /// Whether a non-minimized chain is ready to draw
    pub fn has_live_chain(&self) -> bool {
        self.has_live_chain
    }
}
