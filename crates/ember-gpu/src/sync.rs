//! Synchronization primitives.
//!
//! Semaphores order queue operations on the GPU timeline; fences gate the
//! CPU/GPU handoff.

use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use crate::device::Device;

/// Sync primitive construction errors.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The native semaphore call failed.
    #[error("failed to create a semaphore: {0}")]
    SemaphoreCreationFailed(vk::Result),

    /// The native fence call failed.
    #[error("failed to create a fence: {0}")]
    FenceCreationFailed(vk::Result),
}

/// An owned binary semaphore.
pub struct Semaphore {
    device: Arc<ash::Device>,
    handle: vk::Semaphore,
}

impl Semaphore {
    /// Create a semaphore.
    pub fn new(device: &Device) -> Result<Self, SyncError> {
        let create_info = vk::SemaphoreCreateInfo::default();

        // SAFETY: the device is valid.
        let handle = unsafe { device.handle().create_semaphore(&create_info, None) }
            .map_err(SyncError::SemaphoreCreationFailed)?;

        Ok(Self {
            device: Arc::clone(device.shared()),
            handle,
        })
    }

    /// Get the raw semaphore handle.
    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: the owner waits for dependent work before dropping.
        unsafe {
            self.device.destroy_semaphore(self.handle, None);
        }
    }
}

/// An owned fence.
pub struct Fence {
    device: Arc<ash::Device>,
    handle: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled.
    ///
    /// Frame fences start signaled so the first wait on them passes.
    pub fn new(device: &Device, signaled: bool) -> Result<Self, SyncError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);

        // SAFETY: the device is valid.
        let handle = unsafe { device.handle().create_fence(&create_info, None) }
            .map_err(SyncError::FenceCreationFailed)?;

        Ok(Self {
            device: Arc::clone(device.shared()),
            handle,
        })
    }

    /// Get the raw fence handle.
    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Block until the fence signals, up to `timeout_ns`.
    pub fn wait(&self, timeout_ns: u64) -> Result<(), vk::Result> {
        // SAFETY: the fence is valid.
        unsafe { self.device.wait_for_fences(&[self.handle], true, timeout_ns) }
    }

    /// Reset the fence to unsignaled.
    pub fn reset(&self) -> Result<(), vk::Result> {
        // SAFETY: the fence is valid and not pending.
        unsafe { self.device.reset_fences(&[self.handle]) }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        // SAFETY: the owner waits for dependent work before dropping.
        unsafe {
            self.device.destroy_fence(self.handle, None);
        }
    }
}
