//! Windowed start-up driven by winit.

use std::sync::Arc;

use tracing::{error, info};
use vkstartup::{InitContextOptions, VkContext, WindowSurfaceLoader};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::targets::RenderTargets;

const SURFACE_ID: &str = "main";

/// Window settings.
#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub validation: bool,
    pub exit_after_init: bool,
}

/// Open a window, start Vulkan for it and wait until it is closed.
pub fn run(config: WindowConfig) -> anyhow::Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut runner = Runner {
        config,
        state: None,
        failure: None,
    };
    event_loop.run_app(&mut runner)?;

    match runner.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct Runner {
    config: WindowConfig,
    state: Option<WindowState>,
    failure: Option<anyhow::Error>,
}

struct WindowState {
    targets: Option<RenderTargets>,
    context: VkContext,
    window: Arc<Window>,
}

impl ApplicationHandler for Runner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                info!("Windowed start-up succeeded");
                self.state = Some(state);
                if self.config.exit_after_init {
                    self.shutdown(event_loop);
                }
            }
            Err(e) => {
                error!("Failed to initialize: {e:#}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size) {
                        error!("Resize error: {e:#}");
                    }
                }
            }
            _ => {}
        }
    }
}

impl Runner {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<WindowState> {
        let window_attrs = Window::default_attributes()
            .with_title("VkStartup Test")
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);
        let size = window.inner_size();

        let context = InitContextOptions::new()
            .app_name("VkStartup Test")
            .validation(self.config.validation)
            .surface_loader(WindowSurfaceLoader::new(
                SURFACE_ID,
                window.clone(),
                size.width,
                size.height,
            ))
            .build()?;

        info!("GPU: {}", context.physical_device_info().summary());

        let targets = RenderTargets::new(&context, SURFACE_ID)?;

        Ok(WindowState {
            targets: Some(targets),
            context,
            window,
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            if let Err(e) = state.release_targets() {
                error!("Cleanup error: {e:#}");
            }
        }
        event_loop.exit();
    }
}

impl WindowState {
    fn release_targets(&mut self) -> anyhow::Result<()> {
        match self.targets.take() {
            Some(targets) => targets.destroy(&self.context),
            None => Ok(()),
        }
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) -> anyhow::Result<()> {
        // Minimized windows have no drawable area.
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }

        self.release_targets()?;
        self.context
            .recreate_swapchain(SURFACE_ID, size.width, size.height)?;
        let targets = RenderTargets::new(&self.context, SURFACE_ID)?;
        info!(
            "Resized to {}x{}",
            targets.buffers().extent.width,
            targets.buffers().extent.height
        );
        self.targets = Some(targets);
        self.window.request_redraw();
        Ok(())
    }
}
