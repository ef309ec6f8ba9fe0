//! Render passes recorded into a frame's command buffer.

use ash::vk;

/// Everything a pass needs to record itself for the current frame.
pub struct RecordContext<'a> {
    /// The logical device.
    pub device: &'a ash::Device,
    /// The frame slot's primary command buffer, already begun.
    pub cmd: vk::CommandBuffer,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    /// Full-surface render area.
    pub render_area: vk::Rect2D,
    /// The render pass targeting the swapchain.
    pub render_pass: vk::RenderPass,
    /// Framebuffer for the acquired image.
    pub framebuffer: vk::Framebuffer,
}

/// A unit of rendering work recorded once per frame.
///
/// Each pass brackets its own render-pass instance; passes run in the
/// order they are handed to the orchestrator.
pub trait FramePass {
    fn record(&mut self, ctx: &RecordContext<'_>);
}

/// Clears the swapchain image to a solid color.
pub struct ClearPass {
    clear_color: [f32; 4],
}

impl ClearPass {
    /// Create a clear pass with the given color.
    pub fn new(clear_color: [f32; 4]) -> Self {
        Self { clear_color }
    }
}

impl FramePass for ClearPass {
    fn record(&mut self, ctx: &RecordContext<'_>) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(ctx.render_pass)
            .framebuffer(ctx.framebuffer)
            .render_area(ctx.render_area)
            .clear_values(&clear_values);

        // SAFETY: the command buffer is in the recording state and the
        // framebuffer matches the render pass.
        unsafe {
            ctx.device
                .cmd_begin_render_pass(ctx.cmd, &begin_info, vk::SubpassContents::INLINE);
            ctx.device.cmd_end_render_pass(ctx.cmd);
        }
    }
}

/// Draws a pipeline over three vertices inside a cleared pass.
///
/// The classic fullscreen-triangle shape: vertex positions come from the
/// vertex shader, so no buffers are bound.
pub struct TrianglePass {
    pipeline: vk::Pipeline,
    clear_color: [f32; 4],
}

impl TrianglePass {
    /// Create a triangle pass over an already-built pipeline.
    pub fn new(pipeline: vk::Pipeline, clear_color: [f32; 4]) -> Self {
        Self {
            pipeline,
            clear_color,
        }
    }
}

impl FramePass for TrianglePass {
    fn record(&mut self, ctx: &RecordContext<'_>) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(ctx.render_pass)
            .framebuffer(ctx.framebuffer)
            .render_area(ctx.render_area)
            .clear_values(&clear_values);

        // SAFETY: the command buffer is recording; the pipeline was built
        // against this render pass.
        unsafe {
            ctx.device
                .cmd_begin_render_pass(ctx.cmd, &begin_info, vk::SubpassContents::INLINE);
            ctx.device
                .cmd_bind_pipeline(ctx.cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            ctx.device.cmd_draw(ctx.cmd, 3, 1, 0, 0);
            ctx.device.cmd_end_render_pass(ctx.cmd);
        }
    }
}
