// Presentation and per-frame synchronization state

pub mod swapchain;
pub mod sync;

pub use swapchain::*;
pub use sync::*;
