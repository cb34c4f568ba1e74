//! ash implementation of the graphics device capability set
//!
//! Owns the instance, surface, logical device, pools and the static mesh buffers.
//! Per-image command buffers, descriptor sets and uniform buffers are indexed by
//! swapchain image and grown on demand the first time an image is recorded.

use ash::vk;

use crate::core::config::VulkanRendererConfig;
use crate::foundation::math::UniformBufferObject;
use crate::render::backends::vulkan::rendering::{CommandPool, CommandRecorder, PipelineBundle, ShaderCode};
use crate::render::backends::vulkan::resources::{
    write_uniform_descriptor, DescriptorPool, StaticBuffer, UniformBuffer, INDICES, VERTICES,
};
use crate::render::backends::vulkan::state::{Fence, Framebuffer, ImageView, Semaphore, VulkanChain};
use crate::render::backends::vulkan::{
    LogicalDevice, PhysicalDeviceInfo, ResultExt, Surface, VulkanError, VulkanInstance, VulkanResult,
};
use crate::render::system::{
    AcquireOutcome, ChainRequest, GraphicsDevice, PresentOutcome, PresentableChain, SurfaceSupport,
};
use crate::render::window::Window;

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Resources that belong to one swapchain image index
struct ImageResources {
    command_buffer: vk::CommandBuffer,
    descriptor_set: Option<vk::DescriptorSet>,
    uniforms: UniformBuffer<UniformBufferObject>,
}

/// Vulkan device used by the renderer
///
/// Fields drop top to bottom, so every device-level object is gone before the logical
/// device, and the surface before the instance.
pub struct VulkanDevice {
    images: Vec<ImageResources>,
    vertex_buffer: StaticBuffer,
    index_buffer: StaticBuffer,
    descriptor_pool: DescriptorPool,
    command_pool: CommandPool,
    shader_code: ShaderCode,
    logical: LogicalDevice,
    surface: Surface,
    physical: PhysicalDeviceInfo,
    instance: VulkanInstance,
}

impl VulkanDevice {
    /// Initialize Vulkan for `window`
    pub fn new(window: &Window, config: &VulkanRendererConfig) -> VulkanResult<Self> {
        let extensions = window
            .required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

        let instance = VulkanInstance::new(&extensions, config)?;
        let surface = Surface::new(&instance.entry, &instance.instance, window.surface_source())?;
        let physical = PhysicalDeviceInfo::select_suitable_device(&instance.instance, surface.handle(), surface.loader())?;
        let logical = LogicalDevice::new(&instance.instance, &physical)?;
        let device = &logical.device;

        let shader_code = ShaderCode::load(&config.shaders)?;
        let command_pool = CommandPool::new(device.clone(), physical.graphics_family)?;
        let descriptor_pool = DescriptorPool::new(device.clone(), config.max_swapchain_images)?;

        let vertex_buffer = StaticBuffer::upload(
            device,
            &physical,
            &command_pool,
            logical.graphics_queue,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &VERTICES,
        )?;
        let index_buffer = StaticBuffer::upload(
            device,
            &physical,
            &command_pool,
            logical.graphics_queue,
            vk::BufferUsageFlags::INDEX_BUFFER,
            &INDICES,
        )?;

        log::info!("Vulkan device ready on {}", physical.name());

        Ok(Self {
            images: Vec::new(),
            vertex_buffer,
            index_buffer,
            descriptor_pool,
            command_pool,
            shader_code,
            logical,
            surface,
            physical,
            instance,
        })
    }

    fn queue_families(&self) -> Vec<u32> {
        if self.physical.graphics_family == self.physical.present_family {
            vec![self.physical.graphics_family]
        } else {
            vec![self.physical.graphics_family, self.physical.present_family]
        }
    }

    fn image(&self, image_index: usize) -> VulkanResult<&ImageResources> {
        self.images.get(image_index).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("Swapchain image {image_index} has no recorded resources"),
        })
    }

    /// Grow per-image resources so `image_index` exists
    fn ensure_image(&mut self, image_index: usize) -> VulkanResult<()> {
        if image_index >= self.descriptor_pool.capacity() as usize {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Swapchain image {image_index} exceeds the descriptor pool capacity of {}",
                    self.descriptor_pool.capacity()
                ),
            });
        }

        while self.images.len() <= image_index {
            let command_buffers = self.command_pool.allocate_command_buffers(1)?;
            let uniforms = match UniformBuffer::new(self.logical.device.clone(), &self.physical) {
                Ok(uniforms) => uniforms,
                Err(e) => {
                    self.command_pool.free(&command_buffers);
                    return Err(e);
                }
            };
            self.images.push(ImageResources {
                command_buffer: command_buffers[0],
                descriptor_set: None,
                uniforms,
            });
        }
        Ok(())
    }
}

impl GraphicsDevice for VulkanDevice {
    type Chain = VulkanChain;
    type ImageView = ImageView;
    type Framebuffer = Framebuffer;
    type Pipeline = PipelineBundle;
    type Semaphore = Semaphore;
    type Fence = Fence;

    fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.logical.device.device_wait_idle() }.context("vkDeviceWaitIdle")
    }

    fn surface_support(&self) -> VulkanResult<SurfaceSupport> {
        self.surface.support(self.physical.device)
    }

    fn create_chain(&mut self, request: &ChainRequest, retiring: Option<&VulkanChain>) -> VulkanResult<VulkanChain> {
        VulkanChain::new(
            self.logical.swapchain_loader.clone(),
            self.surface.handle(),
            request,
            &self.queue_families(),
            retiring.map(VulkanChain::handle),
        )
    }

    fn create_image_views(&self, chain: &VulkanChain) -> VulkanResult<Vec<ImageView>> {
        chain
            .images()
            .iter()
            .map(|&image| ImageView::new(self.logical.device.clone(), image, chain.format()))
            .collect()
    }

    fn create_pipeline(&mut self, format: vk::Format, extent: vk::Extent2D) -> VulkanResult<PipelineBundle> {
        PipelineBundle::new(&self.logical.device, &self.shader_code, format, extent)
    }

    fn create_framebuffer(
        &self,
        pipeline: &PipelineBundle,
        view: &ImageView,
        extent: vk::Extent2D,
    ) -> VulkanResult<Framebuffer> {
        Framebuffer::new(self.logical.device.clone(), pipeline.render_pass(), view.handle(), extent)
    }

    fn reset_pools(&mut self) -> VulkanResult<()> {
        self.command_pool.reset()?;
        self.descriptor_pool.reset()?;
        for image in &mut self.images {
            image.descriptor_set = None;
        }
        Ok(())
    }

    fn record_commands(
        &mut self,
        image_index: usize,
        pipeline: &PipelineBundle,
        framebuffer: &Framebuffer,
        extent: vk::Extent2D,
    ) -> VulkanResult<()> {
        self.ensure_image(image_index)?;

        let device = self.logical.device.clone();
        let descriptor_set = match self.images[image_index].descriptor_set {
            Some(set) => set,
            None => {
                let sets = self
                    .descriptor_pool
                    .allocate_descriptor_sets(&[pipeline.descriptor_set_layout()])?;
                let set = sets[0];
                let uniforms = &self.images[image_index].uniforms;
                write_uniform_descriptor(&device, set, uniforms.handle(), uniforms.size());
                self.images[image_index].descriptor_set = Some(set);
                set
            }
        };

        let mut recorder = CommandRecorder::new(self.images[image_index].command_buffer, device);
        recorder.begin(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)?;
        {
            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue { float32: CLEAR_COLOR },
            }];
            let render_area = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            let mut pass =
                recorder.begin_render_pass(pipeline.render_pass(), framebuffer.handle(), render_area, &clear_values)?;
            pass.cmd_bind_pipeline(pipeline.pipeline());
            pass.cmd_bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
            pass.cmd_bind_index_buffer(self.index_buffer.handle(), vk::IndexType::UINT16);
            pass.cmd_bind_descriptor_sets(pipeline.layout(), &[descriptor_set]);
            pass.cmd_draw_indexed(self.index_buffer.element_count());
        }
        recorder.end()?;
        Ok(())
    }

    fn create_semaphore(&self) -> VulkanResult<Semaphore> {
        Semaphore::new(self.logical.device.clone())
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<Fence> {
        Fence::new(self.logical.device.clone(), signaled)
    }

    fn wait_for_fence(&self, fence: &Fence, timeout_ns: u64) -> VulkanResult<()> {
        fence.wait(timeout_ns)
    }

    fn reset_fence(&self, fence: &Fence) -> VulkanResult<()> {
        fence.reset()
    }

    fn acquire_next_image(&self, chain: &VulkanChain, signal: &Semaphore) -> VulkanResult<AcquireOutcome> {
        let result = unsafe {
            chain
                .loader()
                .acquire_next_image(chain.handle(), u64::MAX, signal.handle(), vk::Fence::null())
        };
        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Stale),
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => Ok(AcquireOutcome::SurfaceLost),
            Err(e) => Err(e).context("vkAcquireNextImageKHR"),
        }
    }

    fn write_uniforms(&mut self, image_index: usize, ubo: &UniformBufferObject) -> VulkanResult<()> {
        self.image(image_index)?.uniforms.update(ubo)
    }

    fn submit(&self, image_index: usize, wait: &Semaphore, signal: &Semaphore, fence: &Fence) -> VulkanResult<()> {
        let command_buffers = [self.image(image_index)?.command_buffer];
        let wait_semaphores = [wait.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [signal.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.logical
                .device
                .queue_submit(self.logical.graphics_queue, &[submit_info], fence.handle())
        }
        .context("vkQueueSubmit")
    }

    fn present(&self, chain: &VulkanChain, image_index: u32, wait: &Semaphore) -> VulkanResult<PresentOutcome> {
        let wait_semaphores = [wait.handle()];
        let swapchains = [chain.handle()];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { chain.loader().queue_present(self.logical.present_queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => Ok(PresentOutcome::SurfaceLost),
            Err(e) => Err(e).context("vkQueuePresentKHR"),
        }
    }

    fn recreate_surface(&mut self) -> VulkanResult<()> {
        self.surface.recreate()
    }
}
