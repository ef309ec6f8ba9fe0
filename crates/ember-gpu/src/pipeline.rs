//! Graphics pipeline construction.

use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use crate::device::Device;
use crate::render_pass::RenderPass;
use crate::shader::ShaderModule;

/// Pipeline construction errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The pipeline layout could not be created.
    #[error("failed to create the pipeline layout: {0}")]
    LayoutCreationFailed(vk::Result),

    /// The native pipeline call failed.
    #[error("failed to create the graphics pipeline: {0}")]
    CreationFailed(vk::Result),
}

/// An owned graphics pipeline with its layout.
pub struct GraphicsPipeline {
    device: Arc<ash::Device>,
    handle: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Get the raw pipeline handle.
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    /// Get the pipeline layout.
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        // SAFETY: the owner waits for in-flight work before dropping.
        unsafe {
            self.device.destroy_pipeline(self.handle, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Builder for [`GraphicsPipeline`].
pub struct GraphicsPipelineBuilder<'a> {
    device: &'a Device,
    render_pass: vk::RenderPass,
    shaders: Vec<&'a ShaderModule>,
    viewports: Vec<vk::Viewport>,
    scissors: Vec<vk::Rect2D>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    topology: vk::PrimitiveTopology,
    primitive_restart: bool,
    push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    /// Create a builder against a render pass.
    pub fn new(device: &'a Device, render_pass: &RenderPass) -> Self {
        Self {
            device,
            render_pass: render_pass.handle(),
            shaders: Vec::new(),
            viewports: Vec::new(),
            scissors: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
            push_constant_ranges: Vec::new(),
        }
    }

    /// Add a shader stage.
    pub fn add_shader(mut self, shader: &'a ShaderModule) -> Self {
        self.shaders.push(shader);
        self
    }

    /// Add a viewport/scissor pair.
    pub fn add_viewport(mut self, viewport: vk::Viewport, scissor: vk::Rect2D) -> Self {
        self.viewports.push(viewport);
        self.scissors.push(scissor);
        self
    }

    /// Add a vertex buffer binding.
    pub fn add_vertex_binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.vertex_bindings.push(binding);
        self
    }

    /// Add a vertex attribute.
    pub fn add_vertex_attribute(mut self, attribute: vk::VertexInputAttributeDescription) -> Self {
        self.vertex_attributes.push(attribute);
        self
    }

    /// Set the primitive topology.
    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Enable or disable primitive restart.
    pub fn primitive_restart(mut self, enable: bool) -> Self {
        self.primitive_restart = enable;
        self
    }

    /// Add a push constant range.
    pub fn add_push_constant_range(mut self, range: vk::PushConstantRange) -> Self {
        self.push_constant_ranges.push(range);
        self
    }

    /// Build the pipeline.
    pub fn build(self) -> Result<GraphicsPipeline, PipelineError> {
        let device = self.device.handle();

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .push_constant_ranges(&self.push_constant_ranges);

        // SAFETY: the device is valid.
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .map_err(PipelineError::LayoutCreationFailed)?;

        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo<'_>> = self
            .shaders
            .iter()
            .map(|shader| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(shader.stage())
                    .module(shader.handle())
                    .name(c"main")
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology)
            .primitive_restart_enable(self.primitive_restart);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&self.viewports)
            .scissors(&self.scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];

        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(self.render_pass)
            .subpass(0);

        // SAFETY: all referenced state lives until the call returns; the
        // render pass and shaders outlive the builder.
        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        let handle = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                // SAFETY: the layout is unused so far.
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(PipelineError::CreationFailed(e));
            }
        };

        tracing::info!("graphics pipeline created");

        Ok(GraphicsPipeline {
            device: Arc::clone(self.device.shared()),
            handle,
            layout,
        })
    }
}
