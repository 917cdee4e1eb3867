//! Backend-facing API

pub mod render_backend;
pub mod window;

pub use render_backend::{BackendResult, RenderBackend};
pub use window::WindowHandle;
