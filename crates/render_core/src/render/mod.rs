//! Rendering system
//!
//! Backend-agnostic scene inputs and errors live here; the Vulkan
//! implementation lives under [`backends::vulkan`].

pub mod api;
pub mod backends;
pub mod camera;
pub mod material;
pub mod mesh;

pub use api::{BackendResult, RenderBackend, WindowHandle};
pub use camera::CameraData;
pub use material::{Material, PixelLayout, TextureData, TextureKind};
pub use mesh::{Mesh, Vertex};

use thiserror::Error;

use crate::render::backends::vulkan::VulkanError;

/// Errors surfaced by rendering backends
#[derive(Error, Debug)]
pub enum RenderError {
    /// Renderer initialization failed during setup
    ///
    /// The renderer stays in its failed state and must be reconstructed.
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// A rendering operation failed during execution
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// Resource creation or management failed
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Operation not allowed in the renderer's current state
    #[error("Invalid renderer state: {0}")]
    InvalidState(String),

    /// Error reported by the Vulkan backend
    #[error("Backend error: {0}")]
    Backend(#[from] VulkanError),
}
