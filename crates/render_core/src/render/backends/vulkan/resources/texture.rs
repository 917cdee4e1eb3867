//! Device images, samplers and staged texture uploads

use ash::{vk, Device};

use crate::render::backends::vulkan::{
    find_memory_type, QueueRole, UploadContext, VkResultExt, VulkanError, VulkanResult,
};
use crate::render::material::PixelLayout;

/// 8-bit format matching `layout`, sRGB-encoded when `srgb` is set
pub fn channel_format(layout: PixelLayout, srgb: bool) -> vk::Format {
    match (layout, srgb) {
        (PixelLayout::R, true) => vk::Format::R8_SRGB,
        (PixelLayout::R, false) => vk::Format::R8_UNORM,
        (PixelLayout::Rg, true) => vk::Format::R8G8_SRGB,
        (PixelLayout::Rg, false) => vk::Format::R8G8_UNORM,
        (PixelLayout::Rgb, true) => vk::Format::R8G8B8_SRGB,
        (PixelLayout::Rgb, false) => vk::Format::R8G8B8_UNORM,
        (PixelLayout::Rgba, true) => vk::Format::R8G8B8A8_SRGB,
        (PixelLayout::Rgba, false) => vk::Format::R8G8B8A8_UNORM,
        (PixelLayout::Bgr, true) => vk::Format::B8G8R8_SRGB,
        (PixelLayout::Bgr, false) => vk::Format::B8G8R8_UNORM,
        (PixelLayout::Bgra, true) => vk::Format::B8G8R8A8_SRGB,
        (PixelLayout::Bgra, false) => vk::Format::B8G8R8A8_UNORM,
    }
}

/// Bytes per texel of the 8-bit color formats produced by [`channel_format`]
pub fn texel_size(format: vk::Format) -> Option<usize> {
    match format {
        vk::Format::R8_UNORM | vk::Format::R8_SRGB => Some(1),
        vk::Format::R8G8_UNORM | vk::Format::R8G8_SRGB => Some(2),
        vk::Format::R8G8B8_UNORM
        | vk::Format::R8G8B8_SRGB
        | vk::Format::B8G8R8_UNORM
        | vk::Format::B8G8R8_SRGB => Some(3),
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB => Some(4),
        _ => None,
    }
}

/// Fails unless `len` bytes exactly cover an image of `extent` and `format`
fn check_upload_len(extent: vk::Extent2D, format: vk::Format, len: usize) -> VulkanResult<()> {
    let texel = texel_size(format)
        .ok_or_else(|| VulkanError::invalid(format!("no staged upload path for {format:?}")))?;
    let expected = extent.width as usize * extent.height as usize * texel;
    if len != expected {
        return Err(VulkanError::invalid(format!(
            "{}x{} {format:?} image needs {expected} bytes, got {len}",
            extent.width, extent.height
        )));
    }
    Ok(())
}

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// Layout change of a single-mip color image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    /// Layout before the barrier
    pub old_layout: vk::ImageLayout,
    /// Layout after the barrier
    pub new_layout: vk::ImageLayout,
    /// Accesses made available
    pub src_access: vk::AccessFlags,
    /// Accesses made visible
    pub dst_access: vk::AccessFlags,
    /// Stages waited on
    pub src_stage: vk::PipelineStageFlags,
    /// Stages blocked
    pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
    /// Fresh image ready to receive a copy
    pub const UPLOAD_BEGIN: Self = Self {
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        src_access: vk::AccessFlags::empty(),
        dst_access: vk::AccessFlags::TRANSFER_WRITE,
        src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
        dst_stage: vk::PipelineStageFlags::TRANSFER,
    };

    /// Copied image ready for sampling
    pub const UPLOAD_END: Self = Self {
        old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        src_access: vk::AccessFlags::TRANSFER_WRITE,
        dst_access: vk::AccessFlags::SHADER_READ,
        src_stage: vk::PipelineStageFlags::TRANSFER,
        dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
    };

    /// Acquired swapchain image ready to be cleared
    pub const CLEAR_BEGIN: Self = Self {
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        src_access: vk::AccessFlags::empty(),
        dst_access: vk::AccessFlags::TRANSFER_WRITE,
        src_stage: vk::PipelineStageFlags::TRANSFER,
        dst_stage: vk::PipelineStageFlags::TRANSFER,
    };

    /// Cleared swapchain image ready for presentation
    pub const PRESENT: Self = Self {
        old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        src_access: vk::AccessFlags::TRANSFER_WRITE,
        dst_access: vk::AccessFlags::empty(),
        src_stage: vk::PipelineStageFlags::TRANSFER,
        dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
    };

    /// Record the barrier into `command_buffer`
    pub fn record(self, device: &Device, command_buffer: vk::CommandBuffer, image: vk::Image) {
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(COLOR_RANGE)
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .build();

        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                self.src_stage,
                self.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }
}

/// Single-mip 2D image with its memory and view
pub struct DeviceImage {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl DeviceImage {
    /// Create a device-local, optimally tiled image with a color view
    pub fn new(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> VulkanResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(VulkanError::invalid("image extent must be non-zero"));
        }

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe { device.create_image(&image_info, None) }.context("vkCreateImage")?;
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let memory = find_memory_type(
            memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .and_then(|memory_type_index| {
            let alloc_info = vk::MemoryAllocateInfo::builder()
                .allocation_size(requirements.size)
                .memory_type_index(memory_type_index);
            unsafe { device.allocate_memory(&alloc_info, None) }.context("vkAllocateMemory (image)")
        });
        let memory = match memory {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let view = unsafe { device.bind_image_memory(image, memory, 0) }
            .context("vkBindImageMemory")
            .and_then(|()| {
                let view_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format)
                    .subresource_range(COLOR_RANGE);
                unsafe { device.create_image_view(&view_info, None) }.context("vkCreateImageView")
            });
        let view = match view {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                }
                return Err(e);
            }
        };

        Ok(Self {
            device: device.clone(),
            image,
            memory,
            view,
            format,
            extent,
        })
    }

    /// Image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Color view over the whole image
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Pixel format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for DeviceImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

impl UploadContext<'_> {
    /// Sampled image that can receive transfer copies
    pub fn create_device_image(&self, extent: vk::Extent2D, format: vk::Format) -> VulkanResult<DeviceImage> {
        DeviceImage::new(
            self.device,
            self.memory_properties,
            extent,
            format,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )
    }

    /// Copy `pixels` into `image` through a staging buffer.
    ///
    /// Runs on the graphics queue since the final layout transition targets
    /// fragment shader reads. The image ends in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn upload_via_staging_buffer(&self, image: &DeviceImage, pixels: &[u8]) -> VulkanResult<()> {
        let extent = image.extent();
        check_upload_len(extent, image.format(), pixels.len())?;
        let staging = self.staging_buffer(pixels)?;

        self.commands
            .submit_single_time(QueueRole::Graphics, self.graphics_queue, |device, cmd| {
                LayoutTransition::UPLOAD_BEGIN.record(device, cmd, image.handle());

                let region = vk::BufferImageCopy::builder()
                    .buffer_offset(0)
                    .buffer_row_length(0)
                    .buffer_image_height(0)
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .image_offset(vk::Offset3D::default())
                    .image_extent(vk::Extent3D {
                        width: extent.width,
                        height: extent.height,
                        depth: 1,
                    })
                    .build();
                unsafe {
                    device.cmd_copy_buffer_to_image(
                        cmd,
                        staging.handle(),
                        image.handle(),
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }

                LayoutTransition::UPLOAD_END.record(device, cmd, image.handle());
            })
    }
}

/// Sampler wrapper with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Linear, repeating sampler; anisotropy is used when `max_anisotropy` is set
    pub fn new(device: &Device, max_anisotropy: Option<f32>) -> VulkanResult<Self> {
        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(max_anisotropy.is_some())
            .max_anisotropy(max_anisotropy.unwrap_or(1.0))
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .min_lod(0.0)
            .max_lod(0.0);
        let sampler = unsafe { device.create_sampler(&sampler_info, None) }.context("vkCreateSampler")?;

        Ok(Self {
            device: device.clone(),
            sampler,
        })
    }

    /// Sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Channel layouts map to matching 8-bit formats
    #[test]
    fn test_channel_format() {
        assert_eq!(channel_format(PixelLayout::Rgba, true), vk::Format::R8G8B8A8_SRGB);
        assert_eq!(channel_format(PixelLayout::Rgba, false), vk::Format::R8G8B8A8_UNORM);
        assert_eq!(channel_format(PixelLayout::Bgr, true), vk::Format::B8G8R8_SRGB);
        assert_eq!(channel_format(PixelLayout::R, false), vk::Format::R8_UNORM);
        assert_eq!(
            channel_format(PixelLayout::Rgb.with_alpha(), false),
            vk::Format::R8G8B8A8_UNORM
        );
    }

    /// Pixel data must cover the image exactly
    #[test]
    fn test_upload_len_matches_extent() {
        let extent = vk::Extent2D {
            width: 4,
            height: 2,
        };

        check_upload_len(extent, vk::Format::R8G8B8A8_SRGB, 32).expect("Should accept exact length");
        check_upload_len(extent, vk::Format::B8G8R8_UNORM, 24).expect("Should accept packed RGB");

        let short = check_upload_len(extent, vk::Format::R8G8B8A8_UNORM, 31);
        assert!(matches!(short, Err(VulkanError::InvalidOperation { .. })));
        let empty = check_upload_len(extent, vk::Format::R8_UNORM, 0);
        assert!(matches!(empty, Err(VulkanError::InvalidOperation { .. })));
        let unknown = check_upload_len(extent, vk::Format::D32_SFLOAT, 32);
        assert!(matches!(unknown, Err(VulkanError::InvalidOperation { .. })));
    }

    /// Every format from `channel_format` has a texel size
    #[test]
    fn test_texel_size_covers_channel_formats() {
        let layouts = [
            PixelLayout::R,
            PixelLayout::Rg,
            PixelLayout::Rgb,
            PixelLayout::Rgba,
            PixelLayout::Bgr,
            PixelLayout::Bgra,
        ];
        for layout in layouts {
            for srgb in [true, false] {
                assert_eq!(
                    texel_size(channel_format(layout, srgb)),
                    Some(layout.bytes_per_pixel())
                );
            }
        }
    }

    /// Upload transitions chain into each other
    #[test]
    fn test_upload_transitions_chain() {
        let begin = LayoutTransition::UPLOAD_BEGIN;
        let end = LayoutTransition::UPLOAD_END;

        assert_eq!(begin.new_layout, end.old_layout);
        assert_eq!(begin.dst_access, end.src_access);
        assert_eq!(end.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(
            LayoutTransition::CLEAR_BEGIN.new_layout,
            LayoutTransition::PRESENT.old_layout
        );
    }
}
