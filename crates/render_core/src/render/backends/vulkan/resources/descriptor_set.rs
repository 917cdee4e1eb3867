//! Descriptor set layouts and descriptor writes

use ash::{vk, Device};

use crate::render::backends::vulkan::{VkResultExt, VulkanResult};

/// Builder for reusable descriptor set layouts
#[derive(Debug, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Start with no bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single-descriptor binding of `ty`
    pub fn add_binding(
        mut self,
        binding: u32,
        ty: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add_binding(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Add a combined image sampler binding
    pub fn add_combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add_binding(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    /// Add a storage buffer binding
    pub fn add_storage_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add_binding(binding, vk::DescriptorType::STORAGE_BUFFER, stage_flags)
    }

    /// Bindings added so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Create the layout on `device`
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .context("vkCreateDescriptorSetLayout")?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
            bindings: self.bindings,
        })
    }
}

/// Descriptor set layout with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Bindings the layout was created with
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PendingInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    binding: u32,
    ty: vk::DescriptorType,
    info: PendingInfo,
}

/// Collects descriptor writes for one set and applies them together.
///
/// Infos are stored by value; the raw write structs are assembled only in
/// [`update`](Self::update), so no pointer outlives its info.
#[derive(Debug)]
pub struct DescriptorWriter {
    set: vk::DescriptorSet,
    pending: Vec<PendingWrite>,
}

impl DescriptorWriter {
    /// Writer targeting `set`
    pub fn new(set: vk::DescriptorSet) -> Self {
        Self {
            set,
            pending: Vec::new(),
        }
    }

    /// Bind a buffer range at `binding`
    pub fn write_buffer(
        mut self,
        binding: u32,
        ty: vk::DescriptorType,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> Self {
        self.pending.push(PendingWrite {
            binding,
            ty,
            info: PendingInfo::Buffer(vk::DescriptorBufferInfo {
                buffer,
                offset,
                range,
            }),
        });
        self
    }

    /// Bind an image view and sampler at `binding`
    pub fn write_image(
        mut self,
        binding: u32,
        ty: vk::DescriptorType,
        image_view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    ) -> Self {
        self.pending.push(PendingWrite {
            binding,
            ty,
            info: PendingInfo::Image(vk::DescriptorImageInfo {
                sampler,
                image_view,
                image_layout: layout,
            }),
        });
        self
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// No writes queued
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply all queued writes
    pub fn update(self, device: &Device) {
        let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = self
            .pending
            .iter()
            .map(|write| match write.info {
                PendingInfo::Buffer(info) => [info],
                PendingInfo::Image(_) => [vk::DescriptorBufferInfo::default()],
            })
            .collect();
        let image_infos: Vec<[vk::DescriptorImageInfo; 1]> = self
            .pending
            .iter()
            .map(|write| match write.info {
                PendingInfo::Image(info) => [info],
                PendingInfo::Buffer(_) => [vk::DescriptorImageInfo::default()],
            })
            .collect();

        let writes: Vec<vk::WriteDescriptorSet> = self
            .pending
            .iter()
            .enumerate()
            .map(|(i, write)| {
                let builder = vk::WriteDescriptorSet::builder()
                    .dst_set(self.set)
                    .dst_binding(write.binding)
                    .dst_array_element(0)
                    .descriptor_type(write.ty);
                match write.info {
                    PendingInfo::Buffer(_) => builder.buffer_info(&buffer_infos[i]).build(),
                    PendingInfo::Image(_) => builder.image_info(&image_infos[i]).build(),
                }
            })
            .collect();

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    /// Helper bindings carry the expected descriptor types
    #[test]
    fn test_layout_builder_bindings() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .add_combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
            .add_storage_buffer(2, vk::ShaderStageFlags::COMPUTE);

        let bindings = builder.bindings();
        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(bindings[2].binding, 2);
        assert!(bindings.iter().all(|binding| binding.descriptor_count == 1));
    }

    /// Writes queue up until applied
    #[test]
    fn test_writer_queues_writes() {
        let writer = DescriptorWriter::new(vk::DescriptorSet::from_raw(1))
            .write_buffer(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::Buffer::from_raw(2),
                0,
                vk::WHOLE_SIZE,
            )
            .write_image(
                1,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ImageView::from_raw(3),
                vk::Sampler::from_raw(4),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );

        assert_eq!(writer.len(), 2);
        assert!(!writer.is_empty());
    }
}
