//! The triangle mesh and its Vulkan vertex layout

use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem;

/// Vertex consumed by `triangle.vert`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in model space (location 0)
    pub position: [f32; 2],
    /// Linear RGB color (location 1)
    pub color: [f32; 3],
}

/// Triangle vertices: red apex, green and blue base corners
pub const VERTICES: [Vertex; 3] = [
    Vertex {
        position: [0.0, -1.25],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        position: [1.1, 0.58],
        color: [0.0, 1.0, 0.0],
    },
    Vertex {
        position: [-1.1, 0.58],
        color: [0.0, 0.0, 1.0],
    },
];

/// Triangle indices
pub const INDICES: [u16; 3] = [0, 1, 2];

impl Vertex {
    /// Vertex buffer binding 0, advanced per vertex
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Position and color attributes
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: mem::offset_of!(Self, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: mem::offset_of!(Self, color) as u32,
            },
        ]
    }
}
