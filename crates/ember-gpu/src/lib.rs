//! Vulkan abstraction layer for the Ember engine.
//!
//! This crate provides:
//! - Capability probing (layers, extensions, queue families)
//! - Queue family classification and physical device selection
//! - A validated builder chain for instance, device, swapchain,
//!   render pass, pipeline, command pool and sync primitives

pub mod capability;
pub mod command;
pub mod device;
pub mod error;
pub mod framebuffer;
pub mod instance;
pub mod pipeline;
pub mod queue;
pub mod render_pass;
pub mod selector;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use capability::Loader;
pub use command::{CommandPool, CommandPoolBuilder, CommandPoolError};
pub use device::{Device, DeviceBuilder, DeviceError, QueueDescription, QueueError};
pub use error::{GpuError, Result};
pub use framebuffer::{Framebuffer, FramebufferBuilder, FramebufferError};
pub use instance::{Instance, InstanceBuilder, InstanceError};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineBuilder, PipelineError};
pub use queue::{QueueFamily, QueueOps, QueueType};
pub use render_pass::{RenderPass, RenderPassBuilder, RenderPassError};
pub use selector::{
    DeviceSelector, DeviceType, PhysicalDeviceDescription, SelectionCriteria, SelectionError,
};
pub use shader::{ShaderError, ShaderModule};
pub use surface::{Surface, SurfaceError};
pub use swapchain::{Swapchain, SwapchainBuilder, SwapchainError};
pub use sync::{Fence, Semaphore, SyncError};
