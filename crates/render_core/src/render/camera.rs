//! Camera matrices supplied by the application

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Mat4, Vec3};

/// View and projection computed by the camera system
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraData {
    /// World-to-view transform
    pub view: Mat4,
    /// View-to-clip transform
    pub projection: Mat4,
    /// Eye position in world space
    pub position: Vec3,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            view: Mat4::identity(),
            projection: Mat4::identity(),
            position: Vec3::zeros(),
        }
    }
}

/// std140 layout of the per-frame camera uniform
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraUniform {
    /// World-to-view transform, column-major
    pub view: [[f32; 4]; 4],
    /// View-to-clip transform, column-major
    pub projection: [[f32; 4]; 4],
    /// Projection * view, column-major
    pub view_projection: [[f32; 4]; 4],
    /// Eye position, w unused
    pub position: [f32; 4],
}

unsafe impl Zeroable for CameraUniform {}
unsafe impl Pod for CameraUniform {}

impl From<&CameraData> for CameraUniform {
    fn from(camera: &CameraData) -> Self {
        Self {
            view: camera.view.into(),
            projection: camera.projection.into(),
            view_projection: (camera.projection * camera.view).into(),
            position: [camera.position.x, camera.position.y, camera.position.z, 1.0],
        }
    }
}
