//! The render system: one-shot resource bring-up plus the frame loop.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use thiserror::Error;

use ember_gpu::{
    CommandPool, CommandPoolBuilder, Device, DeviceBuilder, DeviceSelector, DeviceType, Fence,
    Framebuffer, FramebufferBuilder, GpuError, Instance, InstanceBuilder, Loader, QueueError,
    QueueType, RenderPass, RenderPassBuilder, Semaphore, Surface, Swapchain, SwapchainBuilder,
};

use crate::frame::{FlightTracker, MAX_FRAMES_IN_FLIGHT};
use crate::pass::{FramePass, RecordContext};

/// Per-frame runtime errors.
#[derive(Error, Debug)]
pub enum FrameError {
    /// The surface no longer matches the swapchain; rebuild and retry.
    #[error("the swapchain is out of date and must be rebuilt")]
    SwapchainOutOfDate,

    /// `render`/`end_frame` was called without an acquired image.
    #[error("no swapchain image has been acquired this frame")]
    NoAcquiredImage,

    /// Waiting on a frame fence failed.
    #[error("failed waiting on a frame fence: {0}")]
    FenceWait(vk::Result),

    /// Image acquisition failed for a reason other than staleness.
    #[error("failed to acquire a swapchain image: {0}")]
    Acquire(vk::Result),

    /// Command recording failed.
    #[error("failed to record the frame: {0}")]
    Record(vk::Result),

    /// Queue submission failed.
    #[error("failed to submit the frame: {0}")]
    Submit(vk::Result),

    /// Presentation failed for a reason other than staleness.
    #[error("failed to present the frame: {0}")]
    Present(vk::Result),

    /// A required queue classification disappeared.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Outcome of a presented frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The image was presented and the swapchain still matches the surface.
    Presented,
    /// The image was presented but the swapchain has gone stale; rebuild
    /// before the next frame.
    SwapchainStale,
}

/// Startup configuration for [`RenderSystem`].
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Application name reported to the driver.
    pub app_name: String,
    /// Initial surface width in pixels.
    pub width: u32,
    /// Initial surface height in pixels.
    pub height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            app_name: "Ember application".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Owns the GPU resource chain and sequences frames through it.
///
/// Construction runs the full builder chain in dependency order and is
/// not retryable: the first failure aborts bring-up. Afterwards each
/// frame is `begin_frame` → `render` → `end_frame`.
pub struct RenderSystem {
    tracker: FlightTracker,
    current_image: Option<u32>,

    // Fields drop in declaration order: everything built from the device
    // stays above it, the device above the surface, the surface above the
    // instance.
    render_finished: Vec<Semaphore>,
    image_available: Vec<Semaphore>,
    in_flight: Vec<Fence>,
    command_pools: Vec<CommandPool>,
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: Device,
    surface: Surface,
    instance: Instance,
    #[allow(dead_code)]
    loader: Loader,
}

impl RenderSystem {
    /// Run the builder chain against a window.
    pub fn new<W>(window: &W, config: &RenderConfig) -> Result<Self, GpuError>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let loader = Loader::new()?;

        let instance = InstanceBuilder::new(&loader)
            .app_name(config.app_name.clone())
            .app_version(0, 1, 0)
            .engine_version(0, 1, 0)
            .build()?;

        // SAFETY: the window outlives the surface; the instance enabled
        // the platform surface extensions or failed to build.
        let surface = unsafe { Surface::new(&loader, &instance, window) }?;

        let physical = DeviceSelector::new(&instance)
            .surface(&surface)
            .preferred_type(DeviceType::Discrete)
            .allow_any_type(true)
            .require_present(true)
            .select()?;

        let device = DeviceBuilder::new(&instance, physical)
            .surface(&surface)
            .build()?;

        let swapchain = SwapchainBuilder::new(&instance, &device)
            .surface(&surface)
            .desired_format(vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            })
            .desired_present_mode(vk::PresentModeKHR::MAILBOX)
            .fallback_present_mode(vk::PresentModeKHR::FIFO)
            .desired_extent(config.width, config.height)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .clipped(true)
            .build()?;

        let render_pass = RenderPassBuilder::new(&device, &swapchain).build()?;

        let framebuffers = build_framebuffers(&device, &render_pass, &swapchain)?;

        let graphics_family = device.queue_index(QueueType::Graphics)?;
        let mut command_pools = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut image_available = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut in_flight = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            command_pools.push(
                CommandPoolBuilder::new(&device)
                    .queue_family_index(graphics_family)
                    .primary_buffer_count(1)
                    .build()?,
            );
            image_available.push(Semaphore::new(&device)?);
            in_flight.push(Fence::new(&device, true)?);
        }

        // One render-finished semaphore per swapchain image, not per
        // frame slot: presentation waits on the image's semaphore.
        let mut render_finished = Vec::with_capacity(swapchain.image_count());
        for _ in 0..swapchain.image_count() {
            render_finished.push(Semaphore::new(&device)?);
        }

        let tracker = FlightTracker::new(MAX_FRAMES_IN_FLIGHT, swapchain.image_count());

        Ok(Self {
            tracker,
            current_image: None,
            render_finished,
            image_available,
            in_flight,
            command_pools,
            framebuffers,
            render_pass,
            swapchain,
            device,
            surface,
            instance,
            loader,
        })
    }

    /// Wait for the current frame slot and acquire the next image.
    ///
    /// Both waits are unbounded. Returns the acquired image index;
    /// [`FrameError::SwapchainOutOfDate`] means the caller must
    /// [`rebuild_swapchain`] and start the frame over.
    ///
    /// [`rebuild_swapchain`]: RenderSystem::rebuild_swapchain
    pub fn begin_frame(&mut self) -> Result<u32, FrameError> {
        let slot = self.tracker.current_slot();

        self.in_flight[slot]
            .wait(u64::MAX)
            .map_err(FrameError::FenceWait)?;

        let acquired = self
            .swapchain
            .acquire_next_image(self.image_available[slot].handle(), u64::MAX);
        let (image_index, _suboptimal) = match acquired {
            Ok(pair) => pair,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Err(FrameError::SwapchainOutOfDate),
            Err(e) => return Err(FrameError::Acquire(e)),
        };

        tracing::debug!("swapchain image {image_index} acquired");

        self.current_image = Some(image_index);

        Ok(image_index)
    }

    /// Reset the frame slot's command pool and record all passes into its
    /// primary buffer.
    pub fn render(&mut self, passes: &mut [&mut dyn FramePass]) -> Result<(), FrameError> {
        let slot = self.tracker.current_slot();
        let image_index = self.current_image.ok_or(FrameError::NoAcquiredImage)?;

        let pool = &self.command_pools[slot];
        pool.reset().map_err(FrameError::Record)?;
        let cmd = pool.primary_buffers()[0];

        let device = self.device.handle();
        let begin_info = vk::CommandBufferBeginInfo::default();

        // SAFETY: the fence wait in begin_frame retired this buffer.
        unsafe { device.begin_command_buffer(cmd, &begin_info) }.map_err(FrameError::Record)?;

        let ctx = RecordContext {
            device,
            cmd,
            image_index,
            render_area: self.scissor(),
            render_pass: self.render_pass.handle(),
            framebuffer: self.framebuffers[image_index as usize].handle(),
        };
        for pass in passes.iter_mut() {
            pass.record(&ctx);
        }

        // SAFETY: the buffer is in the recording state.
        unsafe { device.end_command_buffer(cmd) }.map_err(FrameError::Record)?;

        Ok(())
    }

    /// Submit the recorded frame and present the image.
    ///
    /// Waits out any other frame slot still using the acquired image,
    /// then submits gated on image-available, signalling render-finished
    /// and the slot's fence, and presents gated on render-finished.
    pub fn end_frame(&mut self) -> Result<FrameStatus, FrameError> {
        let slot = self.tracker.current_slot();
        let image_index = self.current_image.take().ok_or(FrameError::NoAcquiredImage)?;

        // The image may still be owned by another slot when the image
        // count and slot count differ.
        if let Some(prior) = self.tracker.claim_image(image_index as usize) {
            self.in_flight[prior]
                .wait(u64::MAX)
                .map_err(FrameError::FenceWait)?;
        }

        self.in_flight[slot].reset().map_err(FrameError::FenceWait)?;

        let wait_semaphores = [self.image_available[slot].handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.render_finished[image_index as usize].handle()];
        let command_buffers = [self.command_pools[slot].primary_buffers()[0]];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let graphics_queue = self.device.queue(QueueType::Graphics)?;
        // SAFETY: all handles are owned by this system; the fence was
        // just reset.
        unsafe {
            self.device
                .handle()
                .queue_submit(graphics_queue, &[submit_info], self.in_flight[slot].handle())
        }
        .map_err(FrameError::Submit)?;

        let present_queue = self.device.queue(QueueType::Present)?;
        let stale = self
            .swapchain
            .present(present_queue, image_index, &signal_semaphores)
            .map_err(FrameError::Present)?;

        self.tracker.advance();

        Ok(if stale {
            FrameStatus::SwapchainStale
        } else {
            FrameStatus::Presented
        })
    }

    /// Rebuild the swapchain for a new surface size.
    ///
    /// The retired swapchain is handed to the presentation engine as a
    /// recycling hint before being destroyed. Framebuffers, per-image
    /// semaphores and the image claim table follow the new image count;
    /// the render pass is rebuilt only if the negotiated format changed.
    pub fn rebuild_swapchain(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
        self.device.wait_idle()?;

        // Framebuffers reference the old image views.
        self.framebuffers.clear();

        let rebuilt = SwapchainBuilder::new(&self.instance, &self.device)
            .surface(&self.surface)
            .desired_format(self.swapchain.surface_format())
            .desired_present_mode(self.swapchain.present_mode())
            .fallback_present_mode(vk::PresentModeKHR::FIFO)
            .desired_extent(width, height)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .clipped(true)
            .old_swapchain(self.swapchain.handle())
            .build()?;

        // The old swapchain must outlive the build that recycles it.
        let retired = std::mem::replace(&mut self.swapchain, rebuilt);
        drop(retired);

        if self.swapchain.format() != self.render_pass.format() {
            self.render_pass = RenderPassBuilder::new(&self.device, &self.swapchain).build()?;
        }

        self.framebuffers = build_framebuffers(&self.device, &self.render_pass, &self.swapchain)?;

        self.render_finished.clear();
        for _ in 0..self.swapchain.image_count() {
            self.render_finished.push(Semaphore::new(&self.device)?);
        }

        self.tracker.reset_images(self.swapchain.image_count());
        self.current_image = None;

        tracing::info!("swapchain rebuilt: {width}x{height}");

        Ok(())
    }

    /// Block until the device finishes all outstanding work.
    pub fn wait(&self) -> Result<(), GpuError> {
        self.device.wait_idle()?;
        Ok(())
    }

    /// The logical device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The current swapchain.
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// The render pass targeting the swapchain.
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Full-surface viewport.
    pub fn viewport(&self) -> vk::Viewport {
        let extent = self.swapchain.extent();
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Full-surface scissor rectangle.
    pub fn scissor(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.swapchain.extent(),
        }
    }
}

impl Drop for RenderSystem {
    fn drop(&mut self) {
        // Runs before the fields drop, so every sync object and pool is
        // idle by the time its Drop destroys it.
        let _ = self.device.wait_idle();
    }
}

fn build_framebuffers(
    device: &Device,
    render_pass: &RenderPass,
    swapchain: &Swapchain,
) -> Result<Vec<Framebuffer>, GpuError> {
    let extent = swapchain.extent();
    swapchain
        .image_views()
        .iter()
        .map(|&view| {
            FramebufferBuilder::new(device, render_pass)
                .attachment(view)
                .extent(extent.width, extent.height)
                .layers(1)
                .build()
                .map_err(GpuError::from)
        })
        .collect()
}
