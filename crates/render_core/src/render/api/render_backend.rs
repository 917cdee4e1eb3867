//! Backend abstraction trait for the rendering system

use crate::render::{CameraData, Material, Mesh, RenderError, WindowHandle};

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Rendering backend contract
///
/// Backends are independent implementations of this trait; they share no
/// state with each other.
pub trait RenderBackend {
    /// Create all GPU state for presenting into `window`
    fn init(&mut self, window: &dyn WindowHandle) -> BackendResult<()>;

    /// React to a new drawable size
    fn resize(&mut self, width: u32, height: u32) -> BackendResult<()>;

    /// Record, submit and present one frame
    fn render_frame(&mut self) -> BackendResult<()>;

    /// Replace the mesh being drawn
    fn set_model(&mut self, mesh: &Mesh) -> BackendResult<()>;

    /// Replace the active material
    fn set_material(&mut self, material: &Material) -> BackendResult<()>;

    /// Update camera matrices used by subsequent frames
    fn set_camera(&mut self, camera: &CameraData);
}
