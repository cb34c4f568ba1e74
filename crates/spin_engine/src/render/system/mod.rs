//! Backend-agnostic render core
//!
//! Frame pacing, the swapchain lifecycle and the render-thread handshake, written
//! against the [`GraphicsDevice`] capability set.

pub mod device;
pub mod event_loop;
pub mod frame_resources;
pub mod pause;
pub mod pipeline_resources;
pub mod render_loop;
pub mod renderer;
pub mod swapchain_manager;

#[cfg(test)]
pub mod testing;

pub use device::{AcquireOutcome, ChainRequest, GraphicsDevice, PresentOutcome, PresentableChain, SurfaceSupport};
pub use event_loop::{ResizeHandler, ResizeOutcome};
pub use frame_resources::{FrameResourceSet, FrameSlot};
pub use pause::{PauseCoordinator, PauseOutcome, PauseState};
pub use pipeline_resources::PipelineResources;
pub use render_loop::RenderLoop;
pub use renderer::{FrameOutcome, FramebufferExtent, Renderer};
pub use swapchain_manager::{ChainState, RecreateOutcome, SwapchainManager};
