//! Shader loading and the extent-dependent pipeline bundle

use ash::{vk, Device};
use std::ffi::CStr;
use std::fs::File;
use std::path::Path;

use crate::core::config::ShaderConfig;
use crate::render::backends::vulkan::rendering::RenderPass;
use crate::render::backends::vulkan::resources::{DescriptorSetLayout, DescriptorSetLayoutBuilder, Vertex};
use crate::render::backends::vulkan::{ResultExt, VulkanError, VulkanResult};

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// SPIR-V words for both stages, read once at startup
#[derive(Debug, Clone)]
pub struct ShaderCode {
    vertex: Vec<u32>,
    fragment: Vec<u32>,
}

impl ShaderCode {
    /// Read both stages named by `config`
    pub fn load(config: &ShaderConfig) -> VulkanResult<Self> {
        Ok(Self {
            vertex: Self::read_spirv(&config.vertex_shader_path)?,
            fragment: Self::read_spirv(&config.fragment_shader_path)?,
        })
    }

    fn read_spirv(path: impl AsRef<Path>) -> VulkanResult<Vec<u32>> {
        let path = path.as_ref();
        let mut file = File::open(path)
            .map_err(|e| VulkanError::Shader(format!("Failed to open {}: {e}", path.display())))?;
        ash::util::read_spv(&mut file)
            .map_err(|e| VulkanError::Shader(format!("Invalid SPIR-V in {}: {e}", path.display())))
    }
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V words
    pub fn new(device: Device, code: &[u32]) -> VulkanResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        let module = unsafe { device.create_shader_module(&create_info, None) }.context("vkCreateShaderModule")?;
        Ok(Self { device, module })
    }

    /// Create shader stage create info
    pub fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Pipeline layout wrapper with RAII cleanup
pub struct PipelineLayout {
    device: Device,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Layout with the given descriptor set layouts and no push constants
    pub fn new(device: Device, set_layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        let layout =
            unsafe { device.create_pipeline_layout(&layout_info, None) }.context("vkCreatePipelineLayout")?;
        Ok(Self { device, layout })
    }

    /// Get layout handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    /// Fixed-function triangle pipeline with viewport and scissor baked to `extent`
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        layout: vk::PipelineLayout,
        code: &ShaderCode,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let vertex_shader = ShaderModule::new(device.clone(), &code.vertex)?;
        let fragment_shader = ShaderModule::new(device.clone(), &code.fragment)?;
        let shader_stages = [
            vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe { device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None) }
            .map_err(|(_, result)| result)
            .context("vkCreateGraphicsPipelines")?;
        let pipeline = pipelines.into_iter().next().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "vkCreateGraphicsPipelines returned no pipeline".to_string(),
        })?;

        Ok(Self { device, pipeline })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

/// Everything that depends on the swapchain format or extent
///
/// Fields drop in declaration order: pipeline, layout, set layout, render pass.
pub struct PipelineBundle {
    pipeline: GraphicsPipeline,
    pipeline_layout: PipelineLayout,
    descriptor_set_layout: DescriptorSetLayout,
    render_pass: RenderPass,
    extent: vk::Extent2D,
}

impl PipelineBundle {
    /// Build the render pass, layouts and pipeline; a failure part way drops what was built
    pub fn new(device: &Device, code: &ShaderCode, format: vk::Format, extent: vk::Extent2D) -> VulkanResult<Self> {
        let render_pass = RenderPass::new_present_pass(device.clone(), format)?;
        let descriptor_set_layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .build(device)?;
        let pipeline_layout = PipelineLayout::new(device.clone(), &[descriptor_set_layout.handle()])?;
        let pipeline = GraphicsPipeline::new(
            device.clone(),
            render_pass.handle(),
            pipeline_layout.handle(),
            code,
            extent,
        )?;

        log::debug!("Pipeline built for {}x{} {:?}", extent.width, extent.height, format);

        Ok(Self {
            pipeline,
            pipeline_layout,
            descriptor_set_layout,
            render_pass,
            extent,
        })
    }

    /// Pipeline handle
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }

    /// Pipeline layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout.handle()
    }

    /// Layout of the per-image uniform descriptor set
    pub fn descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.descriptor_set_layout.handle()
    }

    /// Render pass handle
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Extent baked into the viewport
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
