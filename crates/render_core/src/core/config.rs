//! # Renderer Configuration
//!
//! Serializable settings for every component of the Vulkan core. Each section
//! maps to one component: [`InstanceConfig`] for the graphics instance,
//! [`DeviceConfig`] for device negotiation, [`SwapchainConfig`] for the
//! presentation chain, [`DescriptorAllocatorConfig`] for descriptor pools, and
//! [`FrameConfig`] for per-frame state. [`RendererConfig`] aggregates them and
//! implements [`Config`] for `.toml` / `.ron` files.

use ash::vk;
use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Present mode preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentModePreference {
    /// No synchronization, may tear
    Immediate,
    /// Triple-buffered, replaces queued images
    Mailbox,
    /// Vertical sync, always available
    Fifo,
    /// Vertical sync that tears when late
    FifoRelaxed,
}

impl PresentModePreference {
    /// Vulkan present mode
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Fifo => vk::PresentModeKHR::FIFO,
            Self::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        }
    }
}

/// Presentable color format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorFormat {
    /// `B8G8R8A8_SRGB`
    B8G8R8A8Srgb,
    /// `R8G8B8A8_SRGB`
    R8G8B8A8Srgb,
    /// `B8G8R8A8_UNORM`
    B8G8R8A8Unorm,
    /// `R8G8B8A8_UNORM`
    R8G8B8A8Unorm,
    /// `A2B10G10R10_UNORM_PACK32`
    A2B10G10R10Unorm,
    /// `R16G16B16A16_SFLOAT`
    R16G16B16A16Sfloat,
}

impl ColorFormat {
    /// Vulkan format
    pub fn to_vk(self) -> vk::Format {
        match self {
            Self::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
            Self::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
            Self::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
            Self::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
            Self::A2B10G10R10Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
            Self::R16G16B16A16Sfloat => vk::Format::R16G16B16A16_SFLOAT,
        }
    }
}

/// Presentation color space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    /// sRGB nonlinear, supported everywhere
    SrgbNonlinear,
    /// Display P3 nonlinear
    DisplayP3Nonlinear,
    /// Extended sRGB linear
    ExtendedSrgbLinear,
    /// HDR10 with the ST2084 transfer function
    Hdr10St2084,
}

impl ColorSpace {
    /// Vulkan color space
    pub fn to_vk(self) -> vk::ColorSpaceKHR {
        match self {
            Self::SrgbNonlinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
            Self::DisplayP3Nonlinear => vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            Self::ExtendedSrgbLinear => vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            Self::Hdr10St2084 => vk::ColorSpaceKHR::HDR10_ST2084_EXT,
        }
    }
}

/// Descriptor type used in pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorKind {
    /// Standalone sampler
    Sampler,
    /// Image and sampler in one binding
    CombinedImageSampler,
    /// Sampled image without sampler
    SampledImage,
    /// Storage image
    StorageImage,
    /// Uniform buffer
    UniformBuffer,
    /// Storage buffer
    StorageBuffer,
    /// Uniform buffer with dynamic offset
    UniformBufferDynamic,
    /// Storage buffer with dynamic offset
    StorageBufferDynamic,
    /// Subpass input attachment
    InputAttachment,
}

impl DescriptorKind {
    /// Vulkan descriptor type
    pub fn to_vk(self) -> vk::DescriptorType {
        match self {
            Self::Sampler => vk::DescriptorType::SAMPLER,
            Self::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Self::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
            Self::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            Self::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            Self::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            Self::UniformBufferDynamic => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            Self::StorageBufferDynamic => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
            Self::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
        }
    }
}

/// Share of a pool reserved for one descriptor type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolSizeRatio {
    /// Descriptor type
    pub kind: DescriptorKind,
    /// Descriptors of this type per set
    pub ratio: f32,
}

impl PoolSizeRatio {
    /// Create a ratio entry
    pub const fn new(kind: DescriptorKind, ratio: f32) -> Self {
        Self { kind, ratio }
    }
}

/// # Instance Configuration
///
/// Application metadata, instance extensions and validation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Application name reported to the driver
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Engine name reported to the driver
    pub engine_name: String,
    /// Requested API version (major, minor)
    pub api_version: (u32, u32),
    /// Whether to enable validation layers; `None` follows the build type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_validation: Option<bool>,
    /// Layers enabled when validation is on
    pub validation_layers: Vec<String>,
    /// Extensions that must be present
    pub required_extensions: Vec<String>,
    /// Extensions enabled only when present
    pub optional_extensions: Vec<String>,
}

impl InstanceConfig {
    /// Whether validation layers should be enabled
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            application_name: "PBRRender".to_string(),
            application_version: (1, 3, 0),
            engine_name: "NoEngine".to_string(),
            api_version: (1, 3),
            enable_validation: None,
            validation_layers: vec!["VK_LAYER_KHRONOS_validation".to_string()],
            required_extensions: Vec::new(),
            optional_extensions: vec!["VK_EXT_debug_utils".to_string()],
        }
    }
}

/// # Device Configuration
///
/// Device extensions and optional features. `VK_KHR_swapchain` is always
/// required on top of [`DeviceConfig::required_extensions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Additional device extensions that must be supported
    pub required_extensions: Vec<String>,
    /// Enable anisotropic filtering when the device supports it
    pub sampler_anisotropy: bool,
    /// Enable wireframe fill modes when the device supports it
    pub fill_mode_non_solid: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            required_extensions: Vec::new(),
            sampler_anisotropy: true,
            fill_mode_non_solid: true,
        }
    }
}

/// # Swapchain Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapchainConfig {
    /// Minimum number of presentable images requested
    pub min_image_count: u32,
    /// Preferred surface format
    pub preferred_format: ColorFormat,
    /// Preferred color space
    pub preferred_color_space: ColorSpace,
    /// Preferred present mode when vsync is off
    pub preferred_present_mode: PresentModePreference,
    /// Force FIFO presentation
    pub enable_vsync: bool,
    /// Acquire timeout in nanoseconds
    pub acquire_timeout_ns: u64,
}

impl SwapchainConfig {
    /// Preferred (format, color space) pair
    pub fn preferred_surface_format(&self) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: self.preferred_format.to_vk(),
            color_space: self.preferred_color_space.to_vk(),
        }
    }

    /// Enable or disable vsync
    pub fn with_vsync(mut self, enabled: bool) -> Self {
        self.enable_vsync = enabled;
        self
    }

    /// Set the preferred present mode
    pub fn with_present_mode(mut self, mode: PresentModePreference) -> Self {
        self.preferred_present_mode = mode;
        self
    }

    /// Set the minimum image count
    pub fn with_min_image_count(mut self, count: u32) -> Self {
        self.min_image_count = count;
        self
    }
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            min_image_count: 2,
            preferred_format: ColorFormat::B8G8R8A8Srgb,
            preferred_color_space: ColorSpace::SrgbNonlinear,
            preferred_present_mode: PresentModePreference::Mailbox,
            enable_vsync: false,
            acquire_timeout_ns: u64::MAX,
        }
    }
}

/// # Descriptor Allocator Configuration
///
/// Per-type pool capacity is `ratio * max_sets * capacity_multiplier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorAllocatorConfig {
    /// Sets per pool
    pub max_sets: u32,
    /// Type ratios used to size each pool
    pub size_ratios: Vec<PoolSizeRatio>,
    /// Multiplier applied to every type count
    pub capacity_multiplier: u32,
    /// Create pools with `FREE_DESCRIPTOR_SET`
    pub free_individual_sets: bool,
    /// Append a new pool when the existing ones are exhausted
    pub allow_auto_expand: bool,
}

impl DescriptorAllocatorConfig {
    /// Pool creation flags
    pub fn pool_flags(&self) -> vk::DescriptorPoolCreateFlags {
        if self.free_individual_sets {
            vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET
        } else {
            vk::DescriptorPoolCreateFlags::empty()
        }
    }

    /// Set the per-pool set limit
    pub fn with_max_sets(mut self, max_sets: u32) -> Self {
        self.max_sets = max_sets;
        self
    }

    /// Enable or disable auto-expansion
    pub fn with_auto_expand(mut self, enabled: bool) -> Self {
        self.allow_auto_expand = enabled;
        self
    }

    /// Enable or disable individual set frees
    pub fn with_free_individual_sets(mut self, enabled: bool) -> Self {
        self.free_individual_sets = enabled;
        self
    }

    /// Replace the type ratios
    pub fn with_ratios(mut self, ratios: Vec<PoolSizeRatio>) -> Self {
        self.size_ratios = ratios;
        self
    }
}

impl Default for DescriptorAllocatorConfig {
    fn default() -> Self {
        Self {
            max_sets: 1000,
            size_ratios: vec![
                PoolSizeRatio::new(DescriptorKind::UniformBuffer, 0.5),
                PoolSizeRatio::new(DescriptorKind::CombinedImageSampler, 0.3),
                PoolSizeRatio::new(DescriptorKind::StorageBuffer, 0.2),
            ],
            capacity_multiplier: 10,
            free_individual_sets: true,
            allow_auto_expand: true,
        }
    }
}

/// # Frame Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Frames the CPU may record ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Clear color applied to every presented image
    pub clear_color: [f32; 4],
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 2,
            clear_color: [0.02, 0.02, 0.03, 1.0],
        }
    }
}

/// # Vulkan Renderer Configuration
///
/// Aggregate of every component section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Graphics instance
    pub instance: InstanceConfig,
    /// Device negotiation
    pub device: DeviceConfig,
    /// Presentation chain
    pub swapchain: SwapchainConfig,
    /// Descriptor pools
    pub descriptors: DescriptorAllocatorConfig,
    /// Frames in flight
    pub frames: FrameConfig,
}

impl RendererConfig {
    /// Create a configuration for the named application
    pub fn new(app_name: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.instance.application_name = app_name.into();
        config
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.instance.application_version = (major, minor, patch);
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.instance.enable_validation = Some(enabled);
        self
    }

    /// Replace the swapchain section
    pub fn with_swapchain(mut self, swapchain: SwapchainConfig) -> Self {
        self.swapchain = swapchain;
        self
    }

    /// Replace the descriptor section
    pub fn with_descriptors(mut self, descriptors: DescriptorAllocatorConfig) -> Self {
        self.descriptors = descriptors;
        self
    }

    /// Set maximum frames in flight
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames.max_frames_in_flight = frames;
        self
    }
}

impl Config for RendererConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.instance.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }
        if self.frames.max_frames_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "Max frames in flight must be at least 1".to_string(),
            ));
        }
        if self.swapchain.min_image_count == 0 {
            return Err(ConfigError::Invalid(
                "Swapchain needs at least one image".to_string(),
            ));
        }
        let descriptors = &self.descriptors;
        if descriptors.max_sets == 0 {
            return Err(ConfigError::Invalid("Descriptor max_sets must be positive".to_string()));
        }
        if descriptors.capacity_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "Descriptor capacity multiplier must be positive".to_string(),
            ));
        }
        if descriptors.size_ratios.is_empty() {
            return Err(ConfigError::Invalid("Descriptor ratios cannot be empty".to_string()));
        }
        if let Some(bad) = descriptors
            .size_ratios
            .iter()
            .find(|entry| !(entry.ratio > 0.0 && entry.ratio.is_finite()))
        {
            return Err(ConfigError::Invalid(format!(
                "Descriptor ratio for {:?} must be positive, got {}",
                bad.kind, bad.ratio
            )));
        }
        Ok(())
    }
}
