//! Window management using GLFW
//!
//! The window is created hidden and without a client API; the application shows it once
//! the first swapchain exists. Events are delivered through GLFW's polling receivers and
//! drained on the main thread after `wait_events` returns.

use ash::vk;
use glfw::Context;
use thiserror::Error;

use crate::core::config::WindowConfig;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed: {0}")]
    InitializationFailed(String),

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// GLFW has no Vulkan loader or the platform lacks surface support
    #[error("Vulkan is not supported by the window system")]
    VulkanUnsupported,

    /// Surface creation failed
    #[error("Failed to create Vulkan surface: {0:?}")]
    SurfaceCreation(vk::Result),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// Screen-space rectangle used for monitor selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenRect {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width
    pub width: i32,
    /// Height
    pub height: i32,
}

impl ScreenRect {
    /// Area shared by two rectangles
    pub fn overlap_area(&self, other: &Self) -> i64 {
        let overlap_w = (self.x + self.width).min(other.x + other.width) - self.x.max(other.x);
        let overlap_h = (self.y + self.height).min(other.y + other.height) - self.y.max(other.y);
        i64::from(overlap_w.max(0)) * i64::from(overlap_h.max(0))
    }
}

/// Index of the rectangle in `monitors` that overlaps `window` the most
///
/// Ties go to the first candidate; `None` only when `monitors` is empty.
pub fn best_overlap(window: &ScreenRect, monitors: &[ScreenRect]) -> Option<usize> {
    monitors
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, i64)>, (index, monitor)| {
            let area = window.overlap_area(monitor);
            match best {
                Some((_, best_area)) if best_area >= area => best,
                _ => Some((index, area)),
            }
        })
        .map(|(index, _)| index)
}

/// Handle for creating a Vulkan surface for this window from another thread
///
/// `glfwCreateWindowSurface` may be called from any thread, which is what the render
/// thread needs when the surface is lost.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceSource {
    window: *mut glfw::ffi::GLFWwindow,
}

// SAFETY: the pointer is only passed to glfwCreateWindowSurface, which GLFW documents as
// callable from any thread. The application stops the render thread before the window
// is destroyed.
unsafe impl Send for SurfaceSource {}

impl SurfaceSource {
    /// Create a surface for the window
    pub fn create_surface(&self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result =
            unsafe { glfw::ffi::glfwCreateWindowSurface(instance, self.window, std::ptr::null(), &mut surface) };
        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::SurfaceCreation(result))
        }
    }
}

/// Wake a thread blocked in `wait_events`
///
/// Safe to call from any thread once GLFW is initialized.
pub fn wake_event_loop() {
    unsafe { glfw::ffi::glfwPostEmptyEvent() };
}

/// GLFW window wrapper with proper resource management
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    windowed_rect: Option<ScreenRect>,
}

impl Window {
    /// Create a hidden, resizable window without a client API
    pub fn new(config: &WindowConfig) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| WindowError::InitializationFailed(format!("{e:?}")))?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::VulkanUnsupported);
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));
        glfw.window_hint(glfw::WindowHint::Visible(false));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::info!("Window created: {}x{} \"{}\"", config.width, config.height, config.title);

        Ok(Self {
            glfw,
            window,
            events,
            windowed_rect: None,
        })
    }

    /// Make the window visible
    pub fn show(&mut self) {
        self.window.show();
    }

    /// Whether the user or the application asked to close
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request closing
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Block until at least one event arrives
    pub fn wait_events(&mut self) {
        self.glfw.wait_events();
    }

    /// Drain queued events
    pub fn flush_events(&self) -> Vec<glfw::WindowEvent> {
        glfw::flush_messages(&self.events).map(|(_, event)| event).collect()
    }

    /// Framebuffer size in pixels
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (
            u32::try_from(width).unwrap_or(0),
            u32::try_from(height).unwrap_or(0),
        )
    }

    /// Vulkan instance extensions GLFW needs for surface creation
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or(WindowError::VulkanUnsupported)
    }

    /// Create a Vulkan surface for this window
    pub fn create_vulkan_surface(&self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
        self.surface_source().create_surface(instance)
    }

    /// Sendable handle for recreating the surface off the main thread
    pub fn surface_source(&self) -> SurfaceSource {
        SurfaceSource {
            window: self.window.window_ptr(),
        }
    }

    /// Whether the window currently covers a monitor
    pub fn is_fullscreen(&self) -> bool {
        self.windowed_rect.is_some()
    }

    /// Switch between windowed mode and fullscreen on the monitor the window overlaps most
    pub fn toggle_fullscreen(&mut self) {
        if let Some(rect) = self.windowed_rect.take() {
            self.window.set_monitor(
                glfw::WindowMode::Windowed,
                rect.x,
                rect.y,
                u32::try_from(rect.width).unwrap_or(1),
                u32::try_from(rect.height).unwrap_or(1),
                None,
            );
            log::info!("Leaving fullscreen ({}x{})", rect.width, rect.height);
            return;
        }

        let (x, y) = self.window.get_pos();
        let (width, height) = self.window.get_size();
        let current = ScreenRect { x, y, width, height };
        let window = &mut self.window;

        let entered = self.glfw.with_connected_monitors(|_, monitors| {
            let candidates: Vec<(ScreenRect, glfw::VidMode)> = monitors
                .iter()
                .filter_map(|monitor| {
                    let mode = monitor.get_video_mode()?;
                    let (mx, my) = monitor.get_pos();
                    let rect = ScreenRect {
                        x: mx,
                        y: my,
                        width: i32::try_from(mode.width).ok()?,
                        height: i32::try_from(mode.height).ok()?,
                    };
                    Some((rect, mode))
                })
                .collect();
            let rects: Vec<ScreenRect> = candidates.iter().map(|(rect, _)| *rect).collect();

            let index = best_overlap(&current, &rects)?;
            let mode = candidates[index].1;
            let monitor = monitors.get(index)?;
            window.set_monitor(
                glfw::WindowMode::FullScreen(monitor),
                0,
                0,
                mode.width,
                mode.height,
                Some(mode.refresh_rate),
            );
            log::info!("Entering fullscreen at {}x{}@{}", mode.width, mode.height, mode.refresh_rate);
            Some(())
        });

        if entered.is_some() {
            self.windowed_rect = Some(current);
        } else {
            log::warn!("No monitor with a usable video mode; staying windowed");
        }
    }
}
