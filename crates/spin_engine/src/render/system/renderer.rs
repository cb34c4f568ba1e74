//! Per-frame state machine
//!
//! `Renderer` owns everything the render thread touches: frame slots, the swapchain,
//! the pipeline bundle and the animation state. One call to [`Renderer::draw_frame`]
//! moves through acquire, submit and present and returns to idle, recovering from a
//! stale chain or a lost surface on the way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::config::VulkanRendererConfig;
use crate::foundation::math::SpinTransform;
use crate::foundation::time::Stopwatch;
use crate::input::SpinControl;
use crate::render::backends::vulkan::VulkanResult;
use crate::render::system::{
    AcquireOutcome, FrameResourceSet, GraphicsDevice, PipelineResources, PresentOutcome, RecreateOutcome,
    SwapchainManager,
};

/// Latest framebuffer size reported by the window, packed into one atomic
#[derive(Debug, Default)]
pub struct FramebufferExtent {
    packed: AtomicU64,
}

impl FramebufferExtent {
    /// Start with `width` x `height`
    pub fn new(width: u32, height: u32) -> Self {
        let extent = Self::default();
        extent.publish(width, height);
        extent
    }

    /// Store a new size
    pub fn publish(&self, width: u32, height: u32) {
        let packed = (u64::from(width) << 32) | u64::from(height);
        self.packed.store(packed, Ordering::Release);
    }

    /// Most recently published size
    pub fn get(&self) -> (u32, u32) {
        let packed = self.packed.load(Ordering::Acquire);
        ((packed >> 32) as u32, packed as u32)
    }

    /// Whether either dimension is zero
    pub fn is_minimized(&self) -> bool {
        let (width, height) = self.get();
        width == 0 || height == 0
    }
}

/// What a call to [`Renderer::draw_frame`] ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was queued for presentation
    Presented,
    /// The swapchain was rebuilt
    Recreated,
    /// The surface has no area; nothing was drawn
    Minimized,
}

/// Frame pacing and swapchain lifecycle for one device
///
/// Fields drop in declaration order; the device goes last.
pub struct Renderer<D: GraphicsDevice> {
    frames: FrameResourceSet<D>,
    swapchain: SwapchainManager<D>,
    pipeline: PipelineResources<D>,
    stopwatch: Stopwatch,
    transform: SpinTransform,
    spin: Arc<SpinControl>,
    extent: Arc<FramebufferExtent>,
    fence_timeout_ns: u64,
    frames_in_flight: usize,
    device: D,
}

impl<D: GraphicsDevice> Renderer<D> {
    /// Wrap `device`; the first swapchain is built by [`Self::recreate`] or the first frame
    pub fn new(
        device: D,
        config: &VulkanRendererConfig,
        spin: Arc<SpinControl>,
        extent: Arc<FramebufferExtent>,
    ) -> Self {
        Self {
            frames: FrameResourceSet::default(),
            swapchain: SwapchainManager::default(),
            pipeline: PipelineResources::default(),
            stopwatch: Stopwatch::start_new(),
            transform: SpinTransform::default(),
            spin,
            extent,
            fence_timeout_ns: config.fence_timeout_ns(),
            frames_in_flight: config.max_frames_in_flight,
            device,
        }
    }

    /// Render and present one frame
    pub fn draw_frame(&mut self) -> VulkanResult<FrameOutcome> {
        if self.frames.is_empty() {
            self.recreate()?;
            if self.frames.is_empty() {
                return Ok(FrameOutcome::Minimized);
            }
        }

        self.frames.wait_current(&self.device, self.fence_timeout_ns)?;

        let (image_index, acquire_suboptimal) =
            match self.swapchain.acquire_next(&self.device, self.frames.current())? {
                AcquireOutcome::Acquired {
                    image_index,
                    suboptimal,
                } => (image_index, suboptimal),
                AcquireOutcome::Stale => {
                    log::debug!("Swapchain out of date at acquire");
                    self.recreate()?;
                    return Ok(FrameOutcome::Recreated);
                }
                AcquireOutcome::SurfaceLost => {
                    log::warn!("Surface lost at acquire");
                    self.rebuild_surface()?;
                    return Ok(FrameOutcome::Recreated);
                }
            };
        let image = image_index as usize;

        self.frames
            .wait_for_image_owner(&self.device, image, self.fence_timeout_ns)?;
        self.frames.claim_image(image);

        let extent = self.swapchain.extent();
        let ubo = self.transform.uniforms(
            self.stopwatch.elapsed_secs_f32(),
            self.spin.offset(),
            extent.width,
            extent.height,
        );
        self.device.write_uniforms(image, &ubo)?;

        self.frames.arm_current(&self.device)?;
        let slot = self.frames.current();
        let submitted = self
            .device
            .submit(image, &slot.image_available, &slot.render_finished, &slot.in_flight);
        if let Err(e) = submitted {
            self.frames.disarm_current();
            return Err(e);
        }

        let presented = self
            .swapchain
            .present(&self.device, image_index, &self.frames.current().render_finished)?;
        self.frames.advance();

        match presented {
            PresentOutcome::Presented if !acquire_suboptimal => Ok(FrameOutcome::Presented),
            PresentOutcome::Presented | PresentOutcome::Suboptimal | PresentOutcome::Stale => {
                log::warn!("Swapchain needs recreation after present ({presented:?})");
                self.recreate()?;
                Ok(FrameOutcome::Recreated)
            }
            PresentOutcome::SurfaceLost => {
                log::warn!("Surface lost at present");
                self.rebuild_surface()?;
                Ok(FrameOutcome::Recreated)
            }
        }
    }

    /// Rebuild the swapchain for the latest published framebuffer size
    pub fn recreate(&mut self) -> VulkanResult<RecreateOutcome> {
        let size = self.extent.get();
        self.swapchain.recreate(
            &mut self.device,
            &mut self.pipeline,
            &mut self.frames,
            size,
            self.frames_in_flight,
        )
    }

    /// Replace a lost surface and build a chain on the new one
    pub fn rebuild_surface(&mut self) -> VulkanResult<RecreateOutcome> {
        self.swapchain
            .teardown_for_surface_loss(&mut self.device, &mut self.pipeline, &mut self.frames)?;
        self.device.recreate_surface()?;
        self.recreate()
    }

    /// Whether a chain is ready to draw
    pub fn has_live_chain(&self) -> bool {
        self.swapchain.has_live_chain()
    }

    /// Slot the next frame uses
    pub fn frame_index(&self) -> usize {
        self.frames.current_index()
    }

    /// Swapchain state
    pub fn swapchain(&self) -> &SwapchainManager<D> {
        &self.swapchain
    }

    /// Frame slots
    pub fn frames(&self) -> &FrameResourceSet<D> {
        &self.frames
    }

    /// Pipeline bundle
    pub fn pipeline(&self) -> &PipelineResources<D> {
        &self.pipeline
    }

    /// Underlying device
    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D: GraphicsDevice> Drop for Renderer<D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle during renderer teardown: {e}");
        }
    }
}
