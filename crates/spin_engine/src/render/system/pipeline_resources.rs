//! Holder for the extent-dependent pipeline bundle

use ash::vk;

use crate::render::backends::vulkan::VulkanResult;
use crate::render::system::GraphicsDevice;

/// The current pipeline bundle, if one is built
pub struct PipelineResources<D: GraphicsDevice> {
    pipeline: Option<D::Pipeline>,
}

impl<D: GraphicsDevice> Default for PipelineResources<D> {
    fn default() -> Self {
        Self { pipeline: None }
    }
}

impl<D: GraphicsDevice> PipelineResources<D> {
    /// Replace the bundle; the old one is dropped before the new one is built
    pub fn rebuild(&mut self, device: &mut D, format: vk::Format, extent: vk::Extent2D) -> VulkanResult<&D::Pipeline> {
        self.pipeline = None;
        let pipeline = device.create_pipeline(format, extent)?;
        Ok(self.pipeline.insert(pipeline))
    }

    /// Drop the bundle
    pub fn destroy(&mut self) {
        self.pipeline = None;
    }

    /// The current bundle
    pub fn get(&self) -> Option<&D::Pipeline> {
        self.pipeline.as_ref()
    }

    /// Whether a bundle exists
    pub fn is_built(&self) -> bool {
        self.pipeline.is_some()
    }
}
