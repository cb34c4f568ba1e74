// Rendering backends

pub mod vulkan;
