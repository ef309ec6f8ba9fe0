//! Shader module ownership.
//!
//! SPIR-V bytecode is an opaque input; compiling it is someone else's
//! problem.

use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use crate::device::Device;

/// Shader module errors.
#[derive(Error, Debug)]
pub enum ShaderError {
    /// The native shader module call failed.
    #[error("failed to create the shader module: {0}")]
    CreationFailed(vk::Result),
}

/// An owned shader module tagged with its pipeline stage.
pub struct ShaderModule {
    device: Arc<ash::Device>,
    handle: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
}

impl ShaderModule {
    /// Create a module from SPIR-V words.
    pub fn from_spirv(
        device: &Device,
        words: &[u32],
        stage: vk::ShaderStageFlags,
    ) -> Result<Self, ShaderError> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(words);

        // SAFETY: the words slice outlives the call.
        let handle = unsafe { device.handle().create_shader_module(&create_info, None) }
            .map_err(ShaderError::CreationFailed)?;

        Ok(Self {
            device: Arc::clone(device.shared()),
            handle,
            stage,
        })
    }

    /// Get the raw shader module handle.
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    /// The stage this module is meant for.
    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        // SAFETY: pipelines keep their own compiled copy; the module can
        // go at any time after pipeline creation.
        unsafe {
            self.device.destroy_shader_module(self.handle, None);
        }
    }
}
