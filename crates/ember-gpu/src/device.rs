//! Logical device construction and queue retrieval.

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use crate::capability::{self, contains_name};
use crate::instance::Instance;
use crate::queue::{self, QueueFamily, QueueType};
use crate::selector::PhysicalDeviceDescription;
use crate::surface::Surface;

const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";

/// Device construction errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// A requested device extension is missing from the system list.
    #[error("device extension {0:?} is not supported")]
    ExtensionNotSupported(String),

    /// The native device call failed.
    #[error("failed to create the device: {0}")]
    CreationFailed(vk::Result),
}

/// Queue retrieval errors.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("no queue family supports graphics operations")]
    GraphicsUnavailable,

    #[error("no queue family can present to the surface")]
    PresentUnavailable,

    #[error("no queue family matches the requested compute classification")]
    ComputeUnavailable,

    #[error("no queue family matches the requested transfer classification")]
    TransferUnavailable,

    /// The requested type has no dedicated classification.
    #[error("queue type has no dedicated classification")]
    InvalidType,
}

/// A request for queues out of one family.
#[derive(Debug, Clone)]
pub struct QueueDescription {
    /// Family to allocate from.
    pub family_index: u32,
    /// One priority per requested queue; the queue count follows from the
    /// length of this list.
    pub priorities: Vec<f32>,
}

impl QueueDescription {
    /// Request `count` queues from a family, all at priority 1.0.
    pub fn new(family_index: u32, count: u32) -> Self {
        Self {
            family_index,
            priorities: vec![1.0; count as usize],
        }
    }
}

/// An owned logical device.
///
/// Queue handles are retrieved lazily by classification rather than stored.
/// The raw device is destroyed exactly once on drop; every resource built
/// from it must be dropped first, which ownership nesting guarantees.
pub struct Device {
    physical: PhysicalDeviceDescription,
    device: Arc<ash::Device>,
    version: u32,
    extensions: Vec<String>,
}

impl Device {
    /// Get the raw device.
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Get the shared device for resource wrappers to hold.
    pub fn shared(&self) -> &Arc<ash::Device> {
        &self.device
    }

    /// Description of the physical device this device was built on.
    pub fn physical(&self) -> &PhysicalDeviceDescription {
        &self.physical
    }

    /// Instance-level API version the device was built under.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Extensions the device was created with.
    pub fn enabled_extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Find the family index serving a queue type.
    ///
    /// Compute and transfer resolve through the separated classification;
    /// graphics and present take the first capable family.
    pub fn queue_index(&self, ty: QueueType) -> Result<u32, QueueError> {
        let families = &self.physical.queue_families;
        match ty {
            QueueType::Graphics => {
                queue::graphics_index(families).ok_or(QueueError::GraphicsUnavailable)
            }
            QueueType::Present => {
                queue::present_index(families).ok_or(QueueError::PresentUnavailable)
            }
            QueueType::Compute => {
                queue::separated_compute_index(families).ok_or(QueueError::ComputeUnavailable)
            }
            QueueType::Transfer => {
                queue::separated_transfer_index(families).ok_or(QueueError::TransferUnavailable)
            }
        }
    }

    /// Find the family index of a dedicated queue.
    ///
    /// Only compute and transfer have a dedicated classification.
    pub fn dedicated_queue_index(&self, ty: QueueType) -> Result<u32, QueueError> {
        let families = &self.physical.queue_families;
        match ty {
            QueueType::Compute => {
                queue::dedicated_compute_index(families).ok_or(QueueError::ComputeUnavailable)
            }
            QueueType::Transfer => {
                queue::dedicated_transfer_index(families).ok_or(QueueError::TransferUnavailable)
            }
            QueueType::Graphics | QueueType::Present => Err(QueueError::InvalidType),
        }
    }

    /// Retrieve the first queue serving a type.
    pub fn queue(&self, ty: QueueType) -> Result<vk::Queue, QueueError> {
        let index = self.queue_index(ty)?;
        // SAFETY: the index comes from this device's own family list and
        // every family had at least one queue requested at build time.
        Ok(unsafe { self.device.get_device_queue(index, 0) })
    }

    /// Retrieve the first queue of a dedicated family.
    pub fn dedicated_queue(&self, ty: QueueType) -> Result<vk::Queue, QueueError> {
        let index = self.dedicated_queue_index(ty)?;
        // SAFETY: as above.
        Ok(unsafe { self.device.get_device_queue(index, 0) })
    }

    /// Block until the device is idle.
    pub fn wait_idle(&self) -> Result<(), vk::Result> {
        // SAFETY: the device is valid.
        unsafe { self.device.device_wait_idle() }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // SAFETY: all resources built from the device were dropped first
        // by ownership nesting.
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Builder for [`Device`].
pub struct DeviceBuilder<'a> {
    instance: &'a Instance,
    physical: PhysicalDeviceDescription,
    surface: Option<&'a Surface>,
    queue_descriptions: Vec<QueueDescription>,
    extensions: Vec<String>,
}

impl<'a> DeviceBuilder<'a> {
    /// Create a builder over a selected physical device.
    pub fn new(instance: &'a Instance, physical: PhysicalDeviceDescription) -> Self {
        Self {
            instance,
            physical,
            surface: None,
            queue_descriptions: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// Declare the surface the device will present to.
    ///
    /// Presence of a surface implies the swapchain extension.
    pub fn surface(mut self, surface: &'a Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Override the queue allocation.
    ///
    /// Without an override, one queue is requested from every available
    /// family at priority 1.0.
    pub fn queue_setup(mut self, descriptions: Vec<QueueDescription>) -> Self {
        self.queue_descriptions = descriptions;
        self
    }

    /// Request a device extension.
    pub fn enable_extension(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.extensions.push(name);
        }
        self
    }

    /// Build the device.
    pub fn build(self) -> Result<Device, DeviceError> {
        let descriptions = if self.queue_descriptions.is_empty() {
            default_queue_setup(&self.physical.queue_families)
        } else {
            self.queue_descriptions
        };

        let queue_infos: Vec<vk::DeviceQueueCreateInfo<'_>> = descriptions
            .iter()
            .map(|desc| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(desc.family_index)
                    .queue_priorities(&desc.priorities)
            })
            .collect();

        let mut extensions = self.extensions;
        if self.surface.is_some() {
            extensions.push(SWAPCHAIN_EXTENSION.to_string());
        }

        // SAFETY: instance and physical device are valid.
        let available =
            unsafe { capability::device_extensions(self.instance.handle(), self.physical.handle) };
        check_extensions(&extensions, &available)?;

        for name in &extensions {
            tracing::info!("device extension: {name} - ENABLED");
        }

        let extension_names: Vec<CString> = extensions
            .iter()
            .map(|name| CString::new(name.as_str()).unwrap_or_default())
            .collect();
        let extension_ptrs: Vec<*const i8> =
            extension_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&self.physical.features);

        // SAFETY: the create info borrows only from locals outliving the
        // call; the physical device belongs to this instance.
        let device = unsafe {
            self.instance
                .handle()
                .create_device(self.physical.handle, &create_info, None)
        }
        .map_err(DeviceError::CreationFailed)?;

        tracing::info!("device created");

        Ok(Device {
            physical: self.physical,
            device: Arc::new(device),
            version: self.instance.version(),
            extensions,
        })
    }
}

/// One queue from every family at priority 1.0.
fn default_queue_setup(families: &[QueueFamily]) -> Vec<QueueDescription> {
    families
        .iter()
        .map(|family| QueueDescription::new(family.index, 1))
        .collect()
}

/// Every desired extension must appear in the system-reported list.
fn check_extensions(desired: &[String], available: &[String]) -> Result<(), DeviceError> {
    for name in desired {
        if !contains_name(available, name) {
            return Err(DeviceError::ExtensionNotSupported(name.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueOps;

    #[test]
    fn default_setup_requests_one_queue_per_family() {
        let families = [
            QueueFamily {
                index: 0,
                ops: QueueOps::GRAPHICS,
                count: 16,
            },
            QueueFamily {
                index: 1,
                ops: QueueOps::TRANSFER,
                count: 2,
            },
        ];

        let setup = default_queue_setup(&families);
        assert_eq!(setup.len(), 2);
        assert_eq!(setup[0].family_index, 0);
        assert_eq!(setup[1].family_index, 1);
        for desc in &setup {
            assert_eq!(desc.priorities, vec![1.0]);
        }
    }

    #[test]
    fn missing_extension_short_circuits() {
        let available = vec!["VK_KHR_swapchain".to_string()];

        assert!(check_extensions(&["VK_KHR_swapchain".to_string()], &available).is_ok());

        let err = check_extensions(
            &[
                "VK_KHR_swapchain".to_string(),
                "VK_EXT_imaginary".to_string(),
            ],
            &available,
        )
        .unwrap_err();
        match err {
            DeviceError::ExtensionNotSupported(name) => assert_eq!(name, "VK_EXT_imaginary"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn queue_description_expands_count_into_priorities() {
        let desc = QueueDescription::new(3, 4);
        assert_eq!(desc.family_index, 3);
        assert_eq!(desc.priorities.len(), 4);
    }
}
