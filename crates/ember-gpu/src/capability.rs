//! System capability probing.
//!
//! Read-only queries against the loader, an instance or a physical device.
//! Nothing in this module creates or owns GPU objects except [`Loader`],
//! which holds the dynamically loaded Vulkan entry point and acts as the
//! process-wide initialization guard: construct it once, pass it by
//! reference into the builders that need it.

use std::ffi::CStr;

use ash::vk;

use crate::error::GpuError;
use crate::queue::QueueFamily;
use crate::surface::Surface;

/// Owner of the Vulkan entry point.
pub struct Loader {
    entry: ash::Entry,
}

impl Loader {
    /// Load the Vulkan library.
    pub fn new() -> Result<Self, GpuError> {
        // SAFETY: the loaded library is kept alive by the returned entry.
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::LoaderUnavailable(e.to_string()))?;

        Ok(Self { entry })
    }

    /// Get the raw entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Query the instance-level API version reported by the loader.
    ///
    /// Loaders predating `vkEnumerateInstanceVersion` report 1.0.
    pub fn instance_version(&self) -> Result<u32, vk::Result> {
        // SAFETY: the entry point is valid for the lifetime of self.
        let version = unsafe { self.entry.try_enumerate_instance_version() }?;
        Ok(version.unwrap_or(vk::API_VERSION_1_0))
    }

    /// Names of all instance layers the system reports.
    ///
    /// Enumeration failure degrades to an empty list with a warning; the
    /// builders treat a missing name as unsupported either way.
    pub fn instance_layers(&self) -> Vec<String> {
        // SAFETY: the entry point is valid for the lifetime of self.
        let properties = match unsafe { self.entry.enumerate_instance_layer_properties() } {
            Ok(properties) => properties,
            Err(e) => {
                tracing::warn!("instance layer enumeration failed: {e}");
                Vec::new()
            }
        };

        properties
            .iter()
            .filter_map(|props| {
                // SAFETY: the driver nul-terminates the name array.
                unsafe { CStr::from_ptr(props.layer_name.as_ptr()) }
                    .to_str()
                    .ok()
                    .map(String::from)
            })
            .collect()
    }

    /// Names of all instance extensions the system reports.
    pub fn instance_extensions(&self) -> Vec<String> {
        // SAFETY: the entry point is valid for the lifetime of self.
        let properties = match unsafe { self.entry.enumerate_instance_extension_properties(None) } {
            Ok(properties) => properties,
            Err(e) => {
                tracing::warn!("instance extension enumeration failed: {e}");
                Vec::new()
            }
        };

        properties
            .iter()
            .filter_map(|props| {
                // SAFETY: the driver nul-terminates the name array.
                unsafe { CStr::from_ptr(props.extension_name.as_ptr()) }
                    .to_str()
                    .ok()
                    .map(String::from)
            })
            .collect()
    }
}

/// Names of all device extensions a physical device reports.
///
/// # Safety
/// The instance and physical device must be valid.
pub unsafe fn device_extensions(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Vec<String> {
    // SAFETY: guaranteed by the caller.
    let properties = match unsafe { instance.enumerate_device_extension_properties(physical_device) }
    {
        Ok(properties) => properties,
        Err(e) => {
            tracing::warn!("device extension enumeration failed: {e}");
            Vec::new()
        }
    };

    properties
        .iter()
        .filter_map(|props| {
            // SAFETY: the driver nul-terminates the name array.
            unsafe { CStr::from_ptr(props.extension_name.as_ptr()) }
                .to_str()
                .ok()
                .map(String::from)
        })
        .collect()
}

/// Enumerate the queue families of a physical device.
///
/// When a surface is supplied, every family is probed for presentation
/// support against it and the PRESENT bit set accordingly. Without a
/// surface no family ever carries PRESENT, so present classification
/// cannot match.
///
/// # Safety
/// The instance and physical device must be valid; the surface, if any,
/// must belong to the same instance.
pub unsafe fn queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface: Option<&Surface>,
) -> Vec<QueueFamily> {
    // SAFETY: guaranteed by the caller.
    let properties =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    properties
        .iter()
        .enumerate()
        .map(|(index, props)| {
            let index = index as u32;
            let present = surface.is_some_and(|surface| {
                // SAFETY: surface and device share the caller's instance.
                unsafe { surface.supports_family(physical_device, index) }
            });

            QueueFamily::from_properties(index, props, present)
        })
        .collect()
}

/// Check a name list for an exact entry.
pub(crate) fn contains_name(names: &[String], wanted: &str) -> bool {
    names.iter().any(|name| name == wanted)
}
