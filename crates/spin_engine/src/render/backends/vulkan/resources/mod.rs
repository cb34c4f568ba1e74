// GPU buffers, descriptors and the triangle mesh

pub mod buffer;
pub mod descriptor_set;
pub mod mesh;

pub use buffer::*;
pub use descriptor_set::*;
pub use mesh::*;
