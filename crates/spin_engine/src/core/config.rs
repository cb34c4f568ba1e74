//! # Application Configuration
//!
//! All tunables for the window, the Vulkan renderer and the engine live here. Every
//! structure derives serde so a partial `triangle.toml` (or `.ron`) only needs to name
//! the fields it overrides.
//!
//! ## Configuration Categories
//!
//! - **Window Config**: title and initial client size
//! - **Renderer Config**: shaders, frames in flight, pause/fence timeouts, validation
//! - **Engine Config**: logging

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::config::{Config, ConfigError};

/// Upper bound for frames in flight
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 8;

/// # Shader Configuration
///
/// SPIR-V paths for the triangle pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Tries the build output directory first, then the usual source locations, so the
    /// binary works from the workspace root or from next to a packaged `shaders/` folder.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        const SHADER_DIRS: [&str; 5] = [
            "target/shaders/",
            "shaders/",
            "resources/shaders/",
            "../target/shaders/",
            "./",
        ];

        let resolve = |name: &str| {
            SHADER_DIRS
                .iter()
                .map(|dir| format!("{dir}{name}"))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("target/shaders/{name}"))
        };

        Self {
            vertex_shader_path: resolve(base_vertex),
            fragment_shader_path: resolve(base_fragment),
        }
    }

    /// Validate that shader files exist
    pub fn validate(&self) -> Result<(), ConfigError> {
        for path in [&self.vertex_shader_path, &self.fragment_shader_path] {
            if !Path::new(path).exists() {
                return Err(ConfigError::Invalid(format!("Shader not found: {path}")));
            }
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("triangle.vert.spv", "triangle.frag.spv")
    }
}

/// # Window Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial client width in screen coordinates
    pub width: u32,
    /// Initial client height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Triangle".to_string(),
            width: 600,
            height: 600,
        }
    }
}

/// # Vulkan Renderer Configuration
///
/// Application metadata, pipelining depth and the timing knobs of the render thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulkanRendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Number of frames the CPU may record ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Whether to enable Vulkan validation layers (`None` = debug builds only)
    pub enable_validation: Option<bool>,
    /// How long a resize waits for the render thread to reach its checkpoint
    pub pause_timeout_ms: u64,
    /// Timeout for per-slot fence waits in milliseconds (`None` = wait indefinitely)
    pub fence_timeout_ms: Option<u64>,
    /// Sleep between render-loop iterations while the window is minimized
    pub minimized_poll_ms: u64,
    /// Capacity of the per-image descriptor pool
    pub max_swapchain_images: u32,
    /// Rotation offset applied per Q/E key press, in degrees per second
    pub spin_step: f32,
}

impl VulkanRendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            shaders: ShaderConfig::default(),
            max_frames_in_flight: 3,
            enable_validation: None,
            pause_timeout_ms: 100,
            fence_timeout_ms: None,
            minimized_poll_ms: 16,
            max_swapchain_images: 8,
            spin_step: 0.1,
        }
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set custom shader configuration
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set maximum frames in flight
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the pause handshake timeout
    pub fn with_pause_timeout_ms(mut self, millis: u64) -> Self {
        self.pause_timeout_ms = millis;
        self
    }

    /// Whether validation layers should be requested for this build
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Pause handshake timeout as a `Duration`
    pub fn pause_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.pause_timeout_ms)
    }

    /// Fence wait timeout in nanoseconds as passed to `vkWaitForFences`
    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ms
            .map_or(u64::MAX, |millis| millis.saturating_mul(1_000_000))
    }

    /// Minimized poll interval as a `Duration`
    pub fn minimized_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.minimized_poll_ms)
    }

    /// Validate the configuration
    ///
    /// Shader files are checked separately by [`ShaderConfig::validate`], since they only
    /// need to exist when a device is actually created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }

        if !(1..=MAX_FRAMES_IN_FLIGHT_LIMIT).contains(&self.max_frames_in_flight) {
            return Err(ConfigError::Invalid(format!(
                "Max frames in flight must be between 1 and {MAX_FRAMES_IN_FLIGHT_LIMIT}, got {}",
                self.max_frames_in_flight
            )));
        }

        if self.pause_timeout_ms == 0 {
            return Err(ConfigError::Invalid("Pause timeout must be non-zero".to_string()));
        }

        if self.max_swapchain_images == 0 {
            return Err(ConfigError::Invalid("Swapchain image capacity must be non-zero".to_string()));
        }

        Ok(())
    }
}

impl Default for VulkanRendererConfig {
    fn default() -> Self {
        Self::new("Vulkan Triangle")
    }
}

/// # Engine Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level for the engine (`error`, `warn`, `info`, `debug`, `trace`)
    pub log_level: String,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration loaded by the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Window configuration
    pub window: WindowConfig,
    /// Rendering system configuration
    pub renderer: VulkanRendererConfig,
}

impl ApplicationConfig {
    /// Create a new application configuration with defaults
    pub fn new(app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();
        Self {
            engine: EngineConfig::default(),
            window: WindowConfig {
                title: app_name.clone(),
                ..WindowConfig::default()
            },
            renderer: VulkanRendererConfig::new(app_name),
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        self.renderer.validate()
    }
}

impl Config for ApplicationConfig {}
