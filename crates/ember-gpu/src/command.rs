//! Command pool and buffer management.

use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use crate::device::Device;

/// Command pool construction errors.
#[derive(Error, Debug)]
pub enum CommandPoolError {
    /// The native pool call failed.
    #[error("failed to create the command pool: {0}")]
    CreationFailed(vk::Result),

    /// Primary buffer allocation failed.
    #[error("failed to allocate primary command buffers: {0}")]
    PrimaryAllocationFailed(vk::Result),

    /// Secondary buffer allocation failed.
    #[error("failed to allocate secondary command buffers: {0}")]
    SecondaryAllocationFailed(vk::Result),
}

/// An owned command pool with the buffers allocated from it.
///
/// Buffers are recycled by resetting the whole pool; they die with it.
pub struct CommandPool {
    device: Arc<ash::Device>,
    handle: vk::CommandPool,
    queue_family: u32,
    primary: Vec<vk::CommandBuffer>,
    secondary: Vec<vk::CommandBuffer>,
}

impl CommandPool {
    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    /// The queue family this pool records for.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Primary command buffers allocated at build time.
    pub fn primary_buffers(&self) -> &[vk::CommandBuffer] {
        &self.primary
    }

    /// Secondary command buffers allocated at build time.
    pub fn secondary_buffers(&self) -> &[vk::CommandBuffer] {
        &self.secondary
    }

    /// Reset the pool, recycling every buffer allocated from it.
    ///
    /// No buffer from this pool may still be pending on the GPU.
    pub fn reset(&self) -> Result<(), vk::Result> {
        // SAFETY: the caller's fence wait guarantees the buffers are not
        // in use.
        unsafe {
            self.device
                .reset_command_pool(self.handle, vk::CommandPoolResetFlags::empty())
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // SAFETY: the owner waits for submitted work before dropping;
        // destroying the pool frees its buffers.
        unsafe {
            self.device.destroy_command_pool(self.handle, None);
        }
    }
}

/// Builder for [`CommandPool`].
pub struct CommandPoolBuilder<'a> {
    device: &'a Device,
    queue_family: u32,
    primary_count: u32,
    secondary_count: u32,
}

impl<'a> CommandPoolBuilder<'a> {
    /// Create a builder over a device.
    pub fn new(device: &'a Device) -> Self {
        Self {
            device,
            queue_family: 0,
            primary_count: 0,
            secondary_count: 0,
        }
    }

    /// Set the queue family the pool's buffers will submit to.
    pub fn queue_family_index(mut self, index: u32) -> Self {
        self.queue_family = index;
        self
    }

    /// Number of primary buffers to allocate after creating the pool.
    pub fn primary_buffer_count(mut self, count: u32) -> Self {
        self.primary_count = count;
        self
    }

    /// Number of secondary buffers to allocate after creating the pool.
    pub fn secondary_buffer_count(mut self, count: u32) -> Self {
        self.secondary_count = count;
        self
    }

    /// Build the pool and allocate its buffers.
    pub fn build(self) -> Result<CommandPool, CommandPoolError> {
        let create_info =
            vk::CommandPoolCreateInfo::default().queue_family_index(self.queue_family);

        let device = self.device.handle();

        // SAFETY: the device is valid and the queue family exists.
        let handle = unsafe { device.create_command_pool(&create_info, None) }
            .map_err(CommandPoolError::CreationFailed)?;

        let allocate = |level: vk::CommandBufferLevel,
                        count: u32|
         -> Result<Vec<vk::CommandBuffer>, vk::Result> {
            if count == 0 {
                return Ok(Vec::new());
            }

            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(handle)
                .level(level)
                .command_buffer_count(count);

            // SAFETY: the pool was just created on this device.
            unsafe { device.allocate_command_buffers(&alloc_info) }
        };

        let primary = match allocate(vk::CommandBufferLevel::PRIMARY, self.primary_count) {
            Ok(buffers) => buffers,
            Err(e) => {
                // SAFETY: the pool is unused so far.
                unsafe { device.destroy_command_pool(handle, None) };
                return Err(CommandPoolError::PrimaryAllocationFailed(e));
            }
        };

        let secondary = match allocate(vk::CommandBufferLevel::SECONDARY, self.secondary_count) {
            Ok(buffers) => buffers,
            Err(e) => {
                // SAFETY: as above; primaries die with the pool.
                unsafe { device.destroy_command_pool(handle, None) };
                return Err(CommandPoolError::SecondaryAllocationFailed(e));
            }
        };

        Ok(CommandPool {
            device: Arc::clone(self.device.shared()),
            handle,
            queue_family: self.queue_family,
            primary,
            secondary,
        })
    }
}
