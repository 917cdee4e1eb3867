//! # Render Core
//!
//! GPU resource lifecycle layer for a Vulkan renderer.
//!
//! The crate owns the graphics instance, physical/logical device selection,
//! the presentation chain, descriptor-set allocation and command pools, and
//! composes them into a [`VulkanContext`](render::backends::vulkan::VulkanContext)
//! driven by the [`VulkanRenderer`](render::backends::vulkan::VulkanRenderer)
//! backend.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_core::prelude::*;
//!
//! fn run(window: &dyn WindowHandle) -> Result<(), RenderError> {
//!     let logger = Logger::facade("info");
//!     logger.init();
//!
//!     let mut renderer = VulkanRenderer::new(RendererConfig::default(), logger.clone());
//!     renderer.init(window)?;
//!     renderer.render_frame()?;
//!
//!     drop(renderer);
//!     logger.shutdown();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError},
        core::config::{
            DescriptorAllocatorConfig, DeviceConfig, FrameConfig, InstanceConfig, RendererConfig,
            SwapchainConfig,
        },
        foundation::logging::{FacadeSink, LogSink, Logger, MemorySink},
        render::{
            api::{BackendResult, RenderBackend, WindowHandle},
            backends::vulkan::{VulkanContext, VulkanError, VulkanRenderer, VulkanResult},
            CameraData, Material, Mesh, PixelLayout, RenderError, TextureData, TextureKind, Vertex,
        },
    };
}
