//! Math type aliases backed by nalgebra

pub use nalgebra::{Matrix4, Vector3, Vector4};

/// 3D vector
pub type Vec3 = Vector3<f32>;

/// 4D vector
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix, column-major
pub type Mat4 = Matrix4<f32>;
