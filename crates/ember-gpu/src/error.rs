//! GPU error types.
//!
//! Each builder keeps its own error enum next to the builder; this module
//! provides the uniform boundary type that wraps all of them. Native
//! failures carry the originating `vk::Result` for diagnostics.

use ash::vk;
use thiserror::Error;

use crate::command::CommandPoolError;
use crate::device::{DeviceError, QueueError};
use crate::framebuffer::FramebufferError;
use crate::instance::InstanceError;
use crate::pipeline::PipelineError;
use crate::render_pass::RenderPassError;
use crate::selector::SelectionError;
use crate::shader::ShaderError;
use crate::surface::SurfaceError;
use crate::swapchain::SwapchainError;
use crate::sync::SyncError;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// The Vulkan loader could not be initialized.
    #[error("failed to load the Vulkan library: {0}")]
    LoaderUnavailable(String),

    /// A native call outside any builder failed.
    #[error("Vulkan error: {0}")]
    Native(#[from] vk::Result),

    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Swapchain(#[from] SwapchainError),

    #[error(transparent)]
    RenderPass(#[from] RenderPassError),

    #[error(transparent)]
    Framebuffer(#[from] FramebufferError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    CommandPool(#[from] CommandPoolError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Result type alias.
pub type Result<T, E = GpuError> = std::result::Result<T, E>;
