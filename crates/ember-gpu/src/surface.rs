//! Presentation surface ownership.
//!
//! The windowing system itself is an external collaborator; all Ember
//! needs from it are raw display/window handles.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use thiserror::Error;

use crate::capability::Loader;
use crate::instance::Instance;

/// Surface creation errors.
#[derive(Error, Debug)]
pub enum SurfaceError {
    /// The window could not hand out its native handles.
    #[error("failed to get a native window handle: {0}")]
    HandleUnavailable(String),

    /// The native surface call failed.
    #[error("failed to create the surface: {0}")]
    CreationFailed(vk::Result),
}

/// An owned presentation surface.
pub struct Surface {
    loader: ash::khr::surface::Instance,
    handle: vk::SurfaceKHR,
}

impl Surface {
    /// Create a surface for a window.
    ///
    /// # Safety
    /// The window handles must remain valid for the surface's lifetime and
    /// the instance must have been created with the platform's surface
    /// extensions enabled.
    pub unsafe fn new<W>(
        loader: &Loader,
        instance: &Instance,
        window: &W,
    ) -> Result<Self, SurfaceError>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| SurfaceError::HandleUnavailable(e.to_string()))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| SurfaceError::HandleUnavailable(e.to_string()))?;

        // SAFETY: guaranteed by the caller.
        let handle = unsafe {
            ash_window::create_surface(
                loader.entry(),
                instance.handle(),
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(SurfaceError::CreationFailed)?;

        let loader = ash::khr::surface::Instance::new(loader.entry(), instance.handle());

        tracing::info!("surface created");

        Ok(Self { loader, handle })
    }

    /// Get the raw surface handle.
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Probe whether a queue family of a device can present to this surface.
    ///
    /// A failed probe counts as no support, matching the classification
    /// engine's "not found" policy.
    ///
    /// # Safety
    /// The physical device must belong to the instance this surface was
    /// created with.
    pub unsafe fn supports_family(
        &self,
        physical_device: vk::PhysicalDevice,
        family_index: u32,
    ) -> bool {
        // SAFETY: guaranteed by the caller.
        match unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, family_index, self.handle)
        } {
            Ok(supported) => supported,
            Err(e) => {
                tracing::warn!("surface support query failed for family {family_index}: {e}");
                false
            }
        }
    }

    /// Query the surface capabilities for a physical device.
    ///
    /// # Safety
    /// The physical device must belong to the surface's instance.
    pub unsafe fn capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::SurfaceCapabilitiesKHR, vk::Result> {
        // SAFETY: guaranteed by the caller.
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(physical_device, self.handle)
        }
    }

    /// Query the supported surface formats for a physical device.
    ///
    /// # Safety
    /// The physical device must belong to the surface's instance.
    pub unsafe fn formats(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, vk::Result> {
        // SAFETY: guaranteed by the caller.
        unsafe {
            self.loader
                .get_physical_device_surface_formats(physical_device, self.handle)
        }
    }

    /// Query the supported present modes for a physical device.
    ///
    /// # Safety
    /// The physical device must belong to the surface's instance.
    pub unsafe fn present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::PresentModeKHR>, vk::Result> {
        // SAFETY: guaranteed by the caller.
        unsafe {
            self.loader
                .get_physical_device_surface_present_modes(physical_device, self.handle)
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the surface outlives every swapchain built from it by
        // ownership nesting.
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}
