//! Framebuffer construction.

use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use crate::device::Device;
use crate::render_pass::RenderPass;

/// Framebuffer construction errors.
#[derive(Error, Debug)]
pub enum FramebufferError {
    /// The native framebuffer call failed.
    #[error("failed to create the framebuffer: {0}")]
    CreationFailed(vk::Result),
}

/// An owned framebuffer.
///
/// Borrows its attachments (typically swapchain image views) without
/// owning them.
pub struct Framebuffer {
    device: Arc<ash::Device>,
    handle: vk::Framebuffer,
}

impl Framebuffer {
    /// Get the raw framebuffer handle.
    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        // SAFETY: no command buffer referencing the framebuffer is still
        // pending when the owner drops it.
        unsafe {
            self.device.destroy_framebuffer(self.handle, None);
        }
    }
}

/// Builder for [`Framebuffer`].
pub struct FramebufferBuilder<'a> {
    device: &'a Device,
    render_pass: vk::RenderPass,
    attachments: Vec<vk::ImageView>,
    width: u32,
    height: u32,
    layers: u32,
}

impl<'a> FramebufferBuilder<'a> {
    /// Create a builder against a render pass.
    pub fn new(device: &'a Device, render_pass: &RenderPass) -> Self {
        Self {
            device,
            render_pass: render_pass.handle(),
            attachments: Vec::new(),
            width: 0,
            height: 0,
            layers: 1,
        }
    }

    /// Add an attachment view.
    pub fn attachment(mut self, view: vk::ImageView) -> Self {
        self.attachments.push(view);
        self
    }

    /// Set the framebuffer extent.
    pub fn extent(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the layer count.
    pub fn layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    /// Build the framebuffer.
    pub fn build(self) -> Result<Framebuffer, FramebufferError> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(self.render_pass)
            .attachments(&self.attachments)
            .width(self.width)
            .height(self.height)
            .layers(self.layers);

        // SAFETY: the attachments and render pass outlive the framebuffer
        // by ownership nesting.
        let handle = unsafe { self.device.handle().create_framebuffer(&create_info, None) }
            .map_err(FramebufferError::CreationFailed)?;

        Ok(Framebuffer {
            device: Arc::clone(self.device.shared()),
            handle,
        })
    }
}
