//! Vulkan backend
//!
//! RAII wrappers over ash plus [`VulkanDevice`], the implementation of the renderer's
//! device capability set.

pub mod device;
pub mod initialization;
pub mod rendering;
pub mod resources;
pub mod state;

pub use device::VulkanDevice;
pub use initialization::*;
