//! Vulkan backend implementation
//!
//! Organized into initialization, state, resources and rendering modules.
//! Construction order is instance, surface, device, presentation chain,
//! descriptor allocator, command pools, frame synchronization; teardown runs
//! in reverse.

/// Error taxonomy shared by every Vulkan component
pub mod error;

/// Instance, surface, device and context creation
pub mod initialization;

/// Vulkan resource management (buffers, textures, descriptors)
pub mod resources;

/// Command pools and shader loading
pub mod rendering;

/// Presentation chain and frame synchronization
pub mod state;

/// [`RenderBackend`](crate::render::RenderBackend) implementation
pub mod renderer;

pub use renderer::VulkanRenderer;

pub use error::{VkResultExt, VulkanError, VulkanResult};
pub use initialization::context::{
    ActiveFrame, ContextState, InitStage, RenderOrchestrator, VulkanContext,
};
pub use initialization::device::{
    find_supported_format, DeviceExtensions, LogicalDevice, PhysicalDeviceInfo, QueueFamilies,
    QueueFamilyIndices,
};
pub use initialization::instance::GraphicsInstance;
pub use initialization::surface::{Surface, SurfaceProvider};

pub use resources::buffer::{find_memory_type, Buffer, UploadContext};
pub use resources::descriptor_allocator::{
    DescriptorAllocator, DescriptorPoolBackend, VulkanPoolBackend,
};
pub use resources::descriptor_set::{DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorWriter};
pub use resources::texture::{channel_format, DeviceImage, LayoutTransition, Sampler};

pub use rendering::commands::{CommandPool, CommandPoolSet, QueueRole};
pub use rendering::shader::{decode_shader_words, load_compiled_shader};

pub use state::swapchain::{AcquiredImage, PresentStatus, PresentationChain};
pub use state::sync::{Fence, FrameSync, FrameSyncSet, Semaphore};
