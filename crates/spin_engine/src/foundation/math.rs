//! Math utilities and types
//!
//! nalgebra aliases plus the transform that spins the triangle around the view axis.

pub use nalgebra::{Matrix4, Rotation3, Vector2, Vector3, Vector4};

use bytemuck::{Pod, Zeroable};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Uniform block consumed by `triangle.vert` at binding 0
///
/// Column-major matrices in std140 layout.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    /// Model matrix
    pub model: [[f32; 4]; 4],
    /// View matrix
    pub view: [[f32; 4]; 4],
    /// Projection matrix (Vulkan clip space, Y pointing down)
    pub proj: [[f32; 4]; 4],
}

impl UniformBufferObject {
    /// Size of the block in bytes
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Build from nalgebra matrices
    pub fn from_matrices(model: &Mat4, view: &Mat4, proj: &Mat4) -> Self {
        Self {
            model: (*model).into(),
            view: (*view).into(),
            proj: (*proj).into(),
        }
    }
}

/// Camera and rotation parameters for the spinning triangle
#[derive(Debug, Clone, PartialEq)]
pub struct SpinTransform {
    /// Vertical field of view in degrees
    pub fov_y_degrees: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
    /// Camera distance from the triangle along -Z
    pub camera_distance: f32,
    /// Base rotation rate in degrees per second
    pub base_rate_degrees: f32,
    angle: f32,
    last_time: f32,
}

impl Default for SpinTransform {
    fn default() -> Self {
        Self {
            fov_y_degrees: 60.0,
            near: 0.1,
            far: 100.0,
            camera_distance: 2.25,
            base_rate_degrees: 45.0,
            angle: 0.0,
            last_time: 0.0,
        }
    }
}

impl SpinTransform {
    /// Current rotation angle in radians
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Advance the rotation to `time` seconds
    ///
    /// The rate is integrated over each step; a new offset never moves past rotation.
    pub fn advance(&mut self, time: f32, offset_degrees: f32) -> f32 {
        let delta = (time - self.last_time).max(0.0);
        self.last_time = time;
        self.angle = (self.angle + delta * (self.base_rate_degrees + offset_degrees).to_radians())
            % std::f32::consts::TAU;
        self.angle
    }

    /// Perspective projection flipped for Vulkan's downward Y axis
    pub fn projection(&self, width: u32, height: u32) -> Mat4 {
        let aspect = if height == 0 { 1.0 } else { width as f32 / height as f32 };
        let mut proj = Mat4::new_perspective(aspect, self.fov_y_degrees.to_radians(), self.near, self.far);
        proj[(1, 1)] *= -1.0;
        proj
    }

    /// View matrix: camera on +Z looking at the origin
    pub fn view(&self) -> Mat4 {
        Mat4::new_translation(&Vec3::new(0.0, 0.0, -self.camera_distance))
    }

    /// Model matrix for the current angle
    pub fn model(&self) -> Mat4 {
        Rotation3::from_axis_angle(&Vector3::z_axis(), self.angle).to_homogeneous()
    }

    /// Advance to `time` and build the uniform block for an image of `width` x `height`
    pub fn uniforms(&mut self, time: f32, offset_degrees: f32, width: u32, height: u32) -> UniformBufferObject {
        self.advance(time, offset_degrees);
        UniformBufferObject::from_matrices(&self.model(), &self.view(), &self.projection(width, height))
    }
}
