//! Command pool and type-safe command recording

use ash::{vk, Device};

use crate::render::backends::vulkan::{ResultExt, VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool =
            unsafe { device.create_command_pool(&pool_create_info, None) }.context("vkCreateCommandPool")?;

        Ok(Self { device, command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info) }.context("vkAllocateCommandBuffers")
    }

    /// Return every buffer allocated from the pool to the initial state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::RELEASE_RESOURCES)
        }
        .context("vkResetCommandPool")
    }

    /// Free specific command buffers
    pub fn free(&self, command_buffers: &[vk::CommandBuffer]) {
        if !command_buffers.is_empty() {
            unsafe { self.device.free_command_buffers(self.command_pool, command_buffers) };
        }
    }

    /// Record and submit a one-time command buffer, waiting for it to finish
    pub fn execute_one_time<F>(&self, queue: vk::Queue, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut CommandRecorder),
    {
        let command_buffers = self.allocate_command_buffers(1)?;
        let result = self.submit_and_wait(command_buffers[0], queue, record);
        self.free(&command_buffers);
        result
    }

    fn submit_and_wait<F>(&self, command_buffer: vk::CommandBuffer, queue: vk::Queue, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut CommandRecorder),
    {
        let mut recorder = CommandRecorder::new(command_buffer, self.device.clone());
        recorder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        record(&mut recorder);
        let command_buffer = recorder.end()?;

        let submit_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&submit_buffers).build();
        unsafe {
            self.device
                .queue_submit(queue, &[submit_info], vk::Fence::null())
                .context("vkQueueSubmit")?;
            self.device.queue_wait_idle(queue).context("vkQueueWaitIdle")
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees every buffer allocated from it
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Type-safe command buffer recorder
pub struct CommandRecorder {
    command_buffer: vk::CommandBuffer,
    device: Device,
    recording: bool,
}

impl CommandRecorder {
    /// Create a new command recorder
    pub fn new(command_buffer: vk::CommandBuffer, device: Device) -> Self {
        Self {
            command_buffer,
            device,
            recording: false,
        }
    }

    /// Begin command recording
    pub fn begin(&mut self, flags: vk::CommandBufferUsageFlags) -> VulkanResult<&mut Self> {
        if self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer already recording".to_string(),
            });
        }

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe { self.device.begin_command_buffer(self.command_buffer, &begin_info) }
            .context("vkBeginCommandBuffer")?;

        self.recording = true;
        Ok(self)
    }

    /// Begin render pass
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> VulkanResult<ActiveRenderPass<'_>> {
        if !self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            });
        }

        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(self.command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
        }

        Ok(ActiveRenderPass { recorder: self })
    }

    /// Copy a whole buffer region
    pub fn cmd_copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy::builder().size(size).build();
        unsafe {
            self.device.cmd_copy_buffer(self.command_buffer, src, dst, &[region]);
        }
    }

    /// End command recording
    pub fn end(mut self) -> VulkanResult<vk::CommandBuffer> {
        if !self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            });
        }

        unsafe { self.device.end_command_buffer(self.command_buffer) }.context("vkEndCommandBuffer")?;

        self.recording = false;
        Ok(self.command_buffer)
    }
}

/// Render pass scope; ends the pass when dropped
pub struct ActiveRenderPass<'a> {
    recorder: &'a mut CommandRecorder,
}

impl<'a> ActiveRenderPass<'a> {
    /// Bind graphics pipeline
    pub fn cmd_bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.recorder.device.cmd_bind_pipeline(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Bind vertex buffers
    pub fn cmd_bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        unsafe {
            self.recorder
                .device
                .cmd_bind_vertex_buffers(self.recorder.command_buffer, first_binding, buffers, offsets);
        }
    }

    /// Bind index buffer
    pub fn cmd_bind_index_buffer(&mut self, buffer: vk::Buffer, index_type: vk::IndexType) {
        unsafe {
            self.recorder
                .device
                .cmd_bind_index_buffer(self.recorder.command_buffer, buffer, 0, index_type);
        }
    }

    /// Bind graphics descriptor sets
    pub fn cmd_bind_descriptor_sets(&mut self, layout: vk::PipelineLayout, sets: &[vk::DescriptorSet]) {
        unsafe {
            self.recorder.device.cmd_bind_descriptor_sets(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                sets,
                &[],
            );
        }
    }

    /// Draw indexed
    pub fn cmd_draw_indexed(&mut self, index_count: u32) {
        unsafe {
            self.recorder
                .device
                .cmd_draw_indexed(self.recorder.command_buffer, index_count, 1, 0, 0, 0);
        }
    }
}

impl<'a> Drop for ActiveRenderPass<'a> {
    fn drop(&mut self) {
        unsafe {
            self.recorder.device.cmd_end_render_pass(self.recorder.command_buffer);
        }
    }
}
