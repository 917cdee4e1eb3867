//! Vulkan error taxonomy

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// Missing extension or layer, or an unsatisfiable request
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Descriptor pools are full and may not grow
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// No candidate format supports the requested features
    #[error("No supported format among {candidates} candidates for {features:?}")]
    UnsupportedFormat {
        /// Number of formats that were checked
        candidates: usize,
        /// Features that were required
        features: vk::FormatFeatureFlags,
    },

    /// Handle not owned by the component it was passed to
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// The surface no longer matches the presentation chain
    #[error("Surface is out of date")]
    SurfaceOutOfDate,

    /// Unrecoverable error reported by the driver
    #[error("{context} failed: {result:?}")]
    Device {
        /// Operation and resource that failed
        context: String,
        /// Raw result code
        result: vk::Result,
    },

    /// Reading a file failed or produced malformed data
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Vulkan loader could not be opened
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No physical device exposes graphics and present queues
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,
}

impl VulkanError {
    /// Build an [`VulkanError::InvalidOperation`]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }

    /// Whether the error is recovered by rebuilding the presentation chain
    pub fn is_out_of_date(&self) -> bool {
        matches!(self, Self::SurfaceOutOfDate)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Attach operation context to raw `ash` results
pub trait VkResultExt<T> {
    /// Wrap the error with the failing operation
    fn context(self, context: &str) -> VulkanResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn context(self, context: &str) -> VulkanResult<T> {
        self.map_err(|result| match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => VulkanError::SurfaceOutOfDate,
            result => VulkanError::Device {
                context: context.to_string(),
                result,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Out-of-date results become the recoverable variant
    #[test]
    fn test_out_of_date_is_recoverable() {
        let err = Err::<(), _>(vk::Result::ERROR_OUT_OF_DATE_KHR)
            .context("vkAcquireNextImageKHR")
            .expect_err("Should fail");
        assert!(err.is_out_of_date());
    }

    /// Other results keep their code and the operation name
    #[test]
    fn test_device_error_carries_context() {
        let err = Err::<(), _>(vk::Result::ERROR_DEVICE_LOST)
            .context("vkQueueSubmit(graphics)")
            .expect_err("Should fail");

        match &err {
            VulkanError::Device { context, result } => {
                assert_eq!(context, "vkQueueSubmit(graphics)");
                assert_eq!(*result, vk::Result::ERROR_DEVICE_LOST);
            }
            other => panic!("Unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("vkQueueSubmit(graphics)"));
        assert!(!err.is_out_of_date());
    }
}
