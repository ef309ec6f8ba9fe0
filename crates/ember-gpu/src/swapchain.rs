//! Swapchain construction and presentation.

use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use crate::device::{Device, QueueError};
use crate::instance::Instance;
use crate::queue::QueueType;
use crate::surface::Surface;

const DEFAULT_EXTENT: u32 = 256;

/// Swapchain construction errors.
#[derive(Error, Debug)]
pub enum SwapchainError {
    /// The builder was given no surface to build against.
    #[error("no surface was provided")]
    SurfaceNotProvided,

    /// Querying surface support details failed.
    #[error("failed to query surface support details: {0}")]
    SurfaceQueryFailed(vk::Result),

    /// The device lacks a required queue classification.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The native swapchain call failed.
    #[error("failed to create the swapchain: {0}")]
    CreationFailed(vk::Result),

    /// The created swapchain would not hand out its images.
    #[error("failed to get the swapchain images: {0}")]
    ImageRetrievalFailed(vk::Result),

    /// An image view could not be created.
    #[error("failed to create a swapchain image view: {0}")]
    ImageViewCreationFailed(vk::Result),
}

/// An owned swapchain with its images and views.
///
/// The image view count equals the negotiated image count and never
/// changes; resizing means rebuilding with the old handle as a hint.
pub struct Swapchain {
    device: Arc<ash::Device>,
    loader: ash::khr::swapchain::Device,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Get the raw swapchain handle.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// The presentable images, in presentation-engine order.
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// One view per presentable image.
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of negotiated images.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// The negotiated surface format.
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// The negotiated pixel format.
    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    /// The negotiated extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// The negotiated present mode.
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Acquire the next presentable image, blocking up to `timeout_ns`.
    ///
    /// Returns the image index and the suboptimal flag. An out-of-date
    /// surface surfaces as `ERROR_OUT_OF_DATE_KHR`; the caller decides to
    /// rebuild.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<(u32, bool), vk::Result> {
        // SAFETY: handles are valid and owned by this swapchain.
        unsafe {
            self.loader
                .acquire_next_image(self.handle, timeout_ns, semaphore, vk::Fence::null())
        }
    }

    /// Present an acquired image.
    ///
    /// Returns whether the swapchain has gone stale (suboptimal or
    /// out-of-date) and should be rebuilt.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.handle];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: handles are valid; the image index was acquired from
        // this swapchain.
        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(e),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        // SAFETY: the device outlives the swapchain through the Arc; the
        // caller guarantees no frame still uses these views.
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

/// Builder for [`Swapchain`].
pub struct SwapchainBuilder<'a> {
    instance: &'a Instance,
    device: &'a Device,
    surface: Option<&'a Surface>,
    desired_format: Option<vk::SurfaceFormatKHR>,
    format_fallbacks: Vec<vk::SurfaceFormatKHR>,
    desired_present_mode: Option<vk::PresentModeKHR>,
    present_mode_fallbacks: Vec<vk::PresentModeKHR>,
    desired_extent: vk::Extent2D,
    image_usage: vk::ImageUsageFlags,
    composite_alpha: vk::CompositeAlphaFlagsKHR,
    clipped: bool,
    old_swapchain: Option<vk::SwapchainKHR>,
}

impl<'a> SwapchainBuilder<'a> {
    /// Create a builder over a device.
    pub fn new(instance: &'a Instance, device: &'a Device) -> Self {
        Self {
            instance,
            device,
            surface: None,
            desired_format: None,
            format_fallbacks: Vec::new(),
            desired_present_mode: None,
            present_mode_fallbacks: Vec::new(),
            desired_extent: vk::Extent2D {
                width: DEFAULT_EXTENT,
                height: DEFAULT_EXTENT,
            },
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            clipped: true,
            old_swapchain: None,
        }
    }

    /// Set the surface to present to.
    pub fn surface(mut self, surface: &'a Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Set the most wanted surface format.
    pub fn desired_format(mut self, format: vk::SurfaceFormatKHR) -> Self {
        self.desired_format = Some(format);
        self
    }

    /// Add a format to try when the desired one is unavailable.
    pub fn fallback_format(mut self, format: vk::SurfaceFormatKHR) -> Self {
        self.format_fallbacks.push(format);
        self
    }

    /// Set the most wanted present mode.
    pub fn desired_present_mode(mut self, mode: vk::PresentModeKHR) -> Self {
        self.desired_present_mode = Some(mode);
        self
    }

    /// Add a present mode to try when the desired one is unavailable.
    pub fn fallback_present_mode(mut self, mode: vk::PresentModeKHR) -> Self {
        self.present_mode_fallbacks.push(mode);
        self
    }

    /// Set the wanted extent; clamped to what the surface reports.
    pub fn desired_extent(mut self, width: u32, height: u32) -> Self {
        self.desired_extent = vk::Extent2D { width, height };
        self
    }

    /// Replace the image usage flags.
    pub fn image_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.image_usage = usage;
        self
    }

    /// Add to the image usage flags.
    pub fn add_image_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.image_usage |= usage;
        self
    }

    /// Set the composite alpha mode.
    pub fn composite_alpha(mut self, alpha: vk::CompositeAlphaFlagsKHR) -> Self {
        self.composite_alpha = alpha;
        self
    }

    /// Allow the presentation engine to clip obscured pixels.
    pub fn clipped(mut self, clipped: bool) -> Self {
        self.clipped = clipped;
        self
    }

    /// Hand the retired swapchain to the presentation engine as a
    /// recycling hint, so a resize needs no present gap.
    pub fn old_swapchain(mut self, handle: vk::SwapchainKHR) -> Self {
        self.old_swapchain = Some(handle);
        self
    }

    /// Build the swapchain.
    pub fn build(self) -> Result<Swapchain, SwapchainError> {
        let surface = self.surface.ok_or(SwapchainError::SurfaceNotProvided)?;
        let physical = self.device.physical().handle;

        // SAFETY: surface and device share the builder's instance.
        let (capabilities, formats, present_modes) = unsafe {
            (
                surface
                    .capabilities(physical)
                    .map_err(SwapchainError::SurfaceQueryFailed)?,
                surface
                    .formats(physical)
                    .map_err(SwapchainError::SurfaceQueryFailed)?,
                surface
                    .present_modes(physical)
                    .map_err(SwapchainError::SurfaceQueryFailed)?,
            )
        };

        let format = negotiate_format(&self.desired_formats(), &formats);
        let present_mode = negotiate_present_mode(&self.desired_present_modes(), &present_modes);
        let extent = clamp_extent(&capabilities, self.desired_extent);
        let image_count = select_image_count(&capabilities);

        let graphics_index = self.device.queue_index(QueueType::Graphics)?;
        let present_index = self.device.queue_index(QueueType::Present)?;
        let family_indices = [graphics_index, present_index];
        let (sharing_mode, family_indices): (_, &[u32]) = if graphics_index == present_index {
            (vk::SharingMode::EXCLUSIVE, &[])
        } else {
            (vk::SharingMode::CONCURRENT, &family_indices)
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(self.image_usage)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(self.composite_alpha)
            .present_mode(present_mode)
            .clipped(self.clipped)
            .old_swapchain(self.old_swapchain.unwrap_or(vk::SwapchainKHR::null()));

        let loader =
            ash::khr::swapchain::Device::new(self.instance.handle(), self.device.handle());

        // SAFETY: the create info borrows only from locals outliving the
        // call; the surface belongs to the same instance as the device.
        let handle = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(SwapchainError::CreationFailed)?;

        // SAFETY: the swapchain was just created by this loader.
        let images = match unsafe { loader.get_swapchain_images(handle) } {
            Ok(images) => images,
            Err(e) => {
                // SAFETY: nothing references the new swapchain yet.
                unsafe { loader.destroy_swapchain(handle, None) };
                return Err(SwapchainError::ImageRetrievalFailed(e));
            }
        };

        let device = self.device.handle();
        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            // SAFETY: the image belongs to the swapchain created above.
            match unsafe { device.create_image_view(&view_info, None) } {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    // SAFETY: the views and swapchain are unused so far.
                    unsafe {
                        for &view in &image_views {
                            device.destroy_image_view(view, None);
                        }
                        loader.destroy_swapchain(handle, None);
                    }
                    return Err(SwapchainError::ImageViewCreationFailed(e));
                }
            }
        }

        tracing::info!(
            "swapchain created: {}x{}, {} images, {:?}",
            extent.width,
            extent.height,
            images.len(),
            present_mode
        );

        Ok(Swapchain {
            device: Arc::clone(self.device.shared()),
            loader,
            handle,
            images,
            image_views,
            format,
            extent,
            present_mode,
        })
    }

    fn desired_formats(&self) -> Vec<vk::SurfaceFormatKHR> {
        let mut formats = Vec::with_capacity(1 + self.format_fallbacks.len());
        formats.push(self.desired_format.unwrap_or(vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }));
        formats.extend_from_slice(&self.format_fallbacks);
        formats
    }

    fn desired_present_modes(&self) -> Vec<vk::PresentModeKHR> {
        match self.desired_present_mode {
            Some(mode) => {
                let mut modes = Vec::with_capacity(1 + self.present_mode_fallbacks.len());
                modes.push(mode);
                modes.extend_from_slice(&self.present_mode_fallbacks);
                modes
            }
            None => vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
        }
    }
}

/// First wanted format present in the system list, else the first format
/// the system reports. Never fails.
fn negotiate_format(
    desired: &[vk::SurfaceFormatKHR],
    available: &[vk::SurfaceFormatKHR],
) -> vk::SurfaceFormatKHR {
    for want in desired {
        if available
            .iter()
            .any(|have| have.format == want.format && have.color_space == want.color_space)
        {
            return *want;
        }
    }

    available.first().copied().unwrap_or(vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    })
}

/// Same policy as format negotiation; FIFO is the terminal default since
/// every conformant presentation engine supports it.
fn negotiate_present_mode(
    desired: &[vk::PresentModeKHR],
    available: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    for &want in desired {
        if available.contains(&want) {
            return want;
        }
    }

    available
        .first()
        .copied()
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Clamp the wanted extent to what the surface allows. A fixed
/// `current_extent` (anything but the u32::MAX sentinel) wins outright.
fn clamp_extent(capabilities: &vk::SurfaceCapabilitiesKHR, desired: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One image above the minimum, capped by the reported maximum (zero
/// meaning unbounded).
fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        count = capabilities.max_image_count;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRGB: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    const UNORM: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    const RGBA16: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::R16G16B16A16_SFLOAT,
        color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
    };

    #[test]
    fn desired_format_wins_when_available() {
        assert_eq!(negotiate_format(&[SRGB, UNORM], &[UNORM, SRGB]), SRGB);
    }

    #[test]
    fn first_available_fallback_wins() {
        assert_eq!(negotiate_format(&[RGBA16, UNORM], &[UNORM, SRGB]), UNORM);
    }

    #[test]
    fn unmatched_wishes_take_first_reported() {
        assert_eq!(negotiate_format(&[RGBA16], &[UNORM, SRGB]), UNORM);
    }

    #[test]
    fn present_mode_follows_same_policy() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];

        assert_eq!(
            negotiate_present_mode(
                &[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
                &available
            ),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            negotiate_present_mode(&[vk::PresentModeKHR::MAILBOX], &available),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            negotiate_present_mode(&[vk::PresentModeKHR::MAILBOX], &[]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn fixed_current_extent_wins() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        };

        let extent = clamp_extent(
            &capabilities,
            vk::Extent2D {
                width: 1920,
                height: 1080,
            },
        );
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn free_extent_clamps_to_bounds() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..Default::default()
        };

        let extent = clamp_extent(
            &capabilities,
            vk::Extent2D {
                width: 1920,
                height: 32,
            },
        );
        assert_eq!((extent.width, extent.height), (1280, 64));
    }

    #[test]
    fn image_count_respects_reported_maximum() {
        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(select_image_count(&unbounded), 3);

        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(select_image_count(&capped), 2);
    }
}
