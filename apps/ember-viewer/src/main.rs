//! Windowed viewer exercising the Ember bring-up chain.
//!
//! With no arguments it clears the swapchain each frame. Pass paths to a
//! vertex and a fragment SPIR-V binary to draw a triangle through a real
//! pipeline:
//!
//! ```text
//! ember-viewer shaders/triangle.vert.spv shaders/triangle.frag.spv
//! ```

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use ash::vk;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use ember_gpu::{GraphicsPipeline, GraphicsPipelineBuilder, ShaderModule};
use ember_render::{
    ClearPass, FrameError, FrameStatus, FramePass, RenderConfig, RenderSystem, TrianglePass,
};

const CLEAR_COLOR: [f32; 4] = [0.05, 0.05, 0.08, 1.0];

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let shaders = match (args.next(), args.next()) {
        (Some(vert), Some(frag)) => Some((PathBuf::from(vert), PathBuf::from(frag))),
        _ => None,
    };

    let event_loop = EventLoop::new().context("failed to create the event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut viewer = Viewer {
        shaders,
        state: None,
    };

    event_loop.run_app(&mut viewer)?;

    Ok(())
}

struct Viewer {
    shaders: Option<(PathBuf, PathBuf)>,
    state: Option<ViewerState>,
}

struct ViewerState {
    // The pipeline drops before the system that owns its device.
    triangle_pipeline: Option<GraphicsPipeline>,
    shader_words: Option<(Vec<u32>, Vec<u32>)>,
    system: RenderSystem,
    window: Arc<Window>,
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                info!("viewer ready");
                self.state = Some(state);
            }
            Err(e) => {
                error!("failed to initialize: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(state) = self.state.take() {
                    if let Err(e) = state.system.wait() {
                        error!("wait on shutdown failed: {e}");
                    }
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.render_frame() {
                        error!("render error: {e:#}");
                        event_loop.exit();
                        return;
                    }
                    state.window.request_redraw();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size) {
                        error!("resize error: {e:#}");
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

impl Viewer {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<ViewerState> {
        let attrs = Window::default_attributes()
            .with_title("Ember viewer")
            .with_inner_size(PhysicalSize::new(1280, 720));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create the window")?,
        );

        let size = window.inner_size();
        let config = RenderConfig {
            app_name: "Ember viewer".to_string(),
            width: size.width.max(1),
            height: size.height.max(1),
        };

        let system = RenderSystem::new(window.as_ref(), &config)?;

        let shader_words = match &self.shaders {
            Some((vert, frag)) => Some((read_spirv(vert)?, read_spirv(frag)?)),
            None => None,
        };
        let triangle_pipeline = match &shader_words {
            Some((vert, frag)) => Some(build_triangle_pipeline(&system, vert, frag)?),
            None => None,
        };

        Ok(ViewerState {
            triangle_pipeline,
            shader_words,
            system,
            window,
        })
    }
}

impl ViewerState {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        match self.system.begin_frame() {
            Ok(_image_index) => {}
            Err(FrameError::SwapchainOutOfDate) => {
                self.rebuild()?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(pipeline) = &self.triangle_pipeline {
            let mut pass = TrianglePass::new(pipeline.handle(), CLEAR_COLOR);
            let mut passes: [&mut dyn FramePass; 1] = [&mut pass];
            self.system.render(&mut passes)?;
        } else {
            let mut pass = ClearPass::new(CLEAR_COLOR);
            let mut passes: [&mut dyn FramePass; 1] = [&mut pass];
            self.system.render(&mut passes)?;
        }

        if self.system.end_frame()? == FrameStatus::SwapchainStale {
            self.rebuild()?;
        }

        Ok(())
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) -> anyhow::Result<()> {
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }
        self.rebuild()
    }

    fn rebuild(&mut self) -> anyhow::Result<()> {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }

        // The old pipeline may reference a render pass about to be
        // replaced, and bakes in the old viewport.
        self.triangle_pipeline = None;

        self.system.rebuild_swapchain(size.width, size.height)?;

        if let Some((vert, frag)) = &self.shader_words {
            self.triangle_pipeline = Some(build_triangle_pipeline(&self.system, vert, frag)?);
        }

        Ok(())
    }
}

fn read_spirv(path: &PathBuf) -> anyhow::Result<Vec<u32>> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open shader {}", path.display()))?;
    ash::util::read_spv(&mut file)
        .with_context(|| format!("failed to read SPIR-V from {}", path.display()))
}

fn build_triangle_pipeline(
    system: &RenderSystem,
    vert_words: &[u32],
    frag_words: &[u32],
) -> anyhow::Result<GraphicsPipeline> {
    let vert = ShaderModule::from_spirv(system.device(), vert_words, vk::ShaderStageFlags::VERTEX)?;
    let frag =
        ShaderModule::from_spirv(system.device(), frag_words, vk::ShaderStageFlags::FRAGMENT)?;

    let pipeline = GraphicsPipelineBuilder::new(system.device(), system.render_pass())
        .add_shader(&vert)
        .add_shader(&frag)
        .add_viewport(system.viewport(), system.scissor())
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart(false)
        .build()?;

    Ok(pipeline)
}
