//! Render pass construction.

use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use crate::device::Device;
use crate::swapchain::Swapchain;

/// Render pass construction errors.
#[derive(Error, Debug)]
pub enum RenderPassError {
    /// The native render pass call failed.
    #[error("failed to create the render pass: {0}")]
    CreationFailed(vk::Result),
}

/// An owned render pass targeting swapchain images.
pub struct RenderPass {
    device: Arc<ash::Device>,
    handle: vk::RenderPass,
    format: vk::Format,
}

impl RenderPass {
    /// Get the raw render pass handle.
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    /// The color attachment format the pass was built for.
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        // SAFETY: dependent framebuffers and pipelines drop first by
        // ownership nesting.
        unsafe {
            self.device.destroy_render_pass(self.handle, None);
        }
    }
}

/// Builder for [`RenderPass`].
///
/// Produces a single-subpass pass over one color attachment in the
/// swapchain's format: cleared on load, stored, handed to the
/// presentation engine.
pub struct RenderPassBuilder<'a> {
    device: &'a Device,
    format: vk::Format,
}

impl<'a> RenderPassBuilder<'a> {
    /// Create a builder targeting a swapchain's format.
    pub fn new(device: &'a Device, swapchain: &Swapchain) -> Self {
        Self {
            device,
            format: swapchain.format(),
        }
    }

    /// Build the render pass.
    pub fn build(self) -> Result<RenderPass, RenderPassError> {
        let attachments = [vk::AttachmentDescription::default()
            .format(self.format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

        let color_refs = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];

        let dependencies = [vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        // SAFETY: the create info borrows only from locals outliving the
        // call.
        let handle = unsafe { self.device.handle().create_render_pass(&create_info, None) }
            .map_err(RenderPassError::CreationFailed)?;

        tracing::info!("render pass created");

        Ok(RenderPass {
            device: Arc::clone(self.device.shared()),
            handle,
            format: self.format,
        })
    }
}
