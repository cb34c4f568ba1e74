//! Rendering
//!
//! `system` holds the backend-agnostic frame and swapchain lifecycle, `backends` the
//! ash implementation, and `window` the GLFW window.

pub mod backends;
pub mod system;
pub mod window;
