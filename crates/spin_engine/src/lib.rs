//! # Spin Engine
//!
//! A small Vulkan renderer that draws one rotating, vertex-colored triangle from a
//! dedicated render thread while the main thread services window events.
//!
//! ## Features
//!
//! - **Render thread**: frames are acquired, submitted and presented off the main thread
//! - **Resize-safe swapchain**: a pause handshake parks the render thread before any
//!   swapchain-dependent resource is torn down
//! - **Frames in flight**: configurable pipelining depth guarded by per-slot fences
//! - **Configuration**: TOML/RON configuration files with validated defaults
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spin_engine::prelude::*;
//!
//! fn main() -> Result<(), AppError> {
//!     let config = ApplicationConfig::default();
//!     spin_engine::foundation::logging::init_with_level(&config.engine.log_level);
//!     Application::new(config)?.run()
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod input;
pub mod render;

mod application;

pub use application::{AppError, Application};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::config::{ApplicationConfig, Config, EngineConfig, VulkanRendererConfig, WindowConfig},
        foundation::time::Stopwatch,
        input::SpinControl,
        render::system::{PauseCoordinator, PauseOutcome, Renderer},
        AppError, Application,
    };
}
