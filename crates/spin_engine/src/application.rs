//! Application lifecycle
//!
//! The main thread owns the window and services its events; a dedicated thread draws.
//! Shutdown stops the render thread before anything it uses is destroyed.

use glfw::WindowEvent;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ConfigError;
use crate::core::config::ApplicationConfig;
use crate::input::{KeyAction, SpinControl};
use crate::render::backends::vulkan::{VulkanDevice, VulkanError};
use crate::render::system::{
    FramebufferExtent, GraphicsDevice, PauseCoordinator, RenderLoop, Renderer, ResizeHandler,
};
use crate::render::window::{wake_event_loop, Window, WindowError};

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Vulkan setup or recreation failed
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Window system failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Invalid or unreadable configuration
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Thread spawn or other I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The render thread ended with an error
    #[error("Render thread failed: {0}")]
    RenderThread(#[source] VulkanError),
}

/// The spinning-triangle application
pub struct Application {
    config: ApplicationConfig,
}

impl Application {
    /// Validate `config`, including that the shader files exist
    pub fn new(config: ApplicationConfig) -> Result<Self, AppError> {
        config.validate()?;
        config.renderer.shaders.validate()?;
        Ok(Self { config })
    }

    /// Open the window, start rendering and block until the window closes
    pub fn run(self) -> Result<(), AppError> {
        let renderer_config = &self.config.renderer;
        let mut window = Window::new(&self.config.window)?;
        let device = VulkanDevice::new(&window, renderer_config)?;

        let (width, height) = window.framebuffer_size();
        let extent = Arc::new(FramebufferExtent::new(width, height));
        let spin = Arc::new(SpinControl::new(renderer_config.spin_step));

        let mut renderer = Renderer::new(device, renderer_config, Arc::clone(&spin), Arc::clone(&extent));
        renderer.recreate()?;
        let renderer = Arc::new(Mutex::new(renderer));

        let coordinator = Arc::new(PauseCoordinator::new(renderer_config.pause_timeout()));
        let resize = ResizeHandler::new(Arc::clone(&renderer), Arc::clone(&coordinator), extent);

        window.show();
        let mut render_loop = RenderLoop::spawn(
            Arc::clone(&renderer),
            coordinator,
            renderer_config.minimized_poll_interval(),
            wake_event_loop,
        )?;
        log::info!("Render thread started");

        Self::event_loop(&mut window, &resize, &spin, &render_loop);

        log::info!("Shutting down");
        let thread_result = render_loop.stop();
        if let Err(e) = renderer.lock().device().wait_idle() {
            log::error!("Failed to wait for device idle: {e}");
        }
        drop(resize);
        drop(renderer);
        drop(window);
        log::info!("Shutdown complete");

        thread_result.map_err(AppError::RenderThread)
    }

    fn event_loop(
        window: &mut Window,
        resize: &ResizeHandler<VulkanDevice>,
        spin: &SpinControl,
        render_loop: &RenderLoop,
    ) {
        while !window.should_close() {
            window.wait_events();
            if render_loop.is_finished() {
                log::error!("Render thread exited; closing");
                break;
            }

            for event in window.flush_events() {
                match event {
                    WindowEvent::FramebufferSize(width, height) => {
                        let width = u32::try_from(width).unwrap_or(0);
                        let height = u32::try_from(height).unwrap_or(0);
                        let outcome = resize.on_framebuffer_resize(width, height);
                        log::debug!("Resize to {width}x{height}: {outcome:?}");
                    }
                    WindowEvent::Key(key, _, action, mods) => match KeyAction::from_key(key, action, mods) {
                        Some(KeyAction::Quit) => window.set_should_close(true),
                        Some(KeyAction::ToggleFullscreen) => {
                            window.toggle_fullscreen();
                            log::debug!("Fullscreen: {}", window.is_fullscreen());
                        }
                        Some(rotation) => {
                            spin.apply(rotation);
                        }
                        None => {}
                    },
                    WindowEvent::Close => window.set_should_close(true),
                    _ => {}
                }
            }
        }
    }
}
