//! Device buffers and staging uploads

use ash::{vk, Device};
use bytemuck::Pod;

use crate::render::backends::vulkan::{
    CommandPoolSet, QueueFamilies, QueueRole, VkResultExt, VulkanError, VulkanResult,
};

/// First memory type allowed by `type_filter` that has all of `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            type_filter & (1 << i) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// Buffer wrapper owning its memory
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory to it.
    ///
    /// `queue_families` lists the families that access the buffer; more than
    /// one distinct family makes the buffer concurrently shared.
    pub fn new(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        queue_families: &[u32],
    ) -> VulkanResult<Self> {
        let mut families = queue_families.to_vec();
        families.sort_unstable();
        families.dedup();

        let mut buffer_info = vk::BufferCreateInfo::builder().size(size).usage(usage);
        buffer_info = if families.len() > 1 {
            buffer_info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        } else {
            buffer_info.sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let buffer = unsafe { device.create_buffer(&buffer_info, None) }.context("vkCreateBuffer")?;
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory = find_memory_type(memory_properties, requirements.memory_type_bits, properties)
            .and_then(|memory_type_index| {
                let alloc_info = vk::MemoryAllocateInfo::builder()
                    .allocation_size(requirements.size)
                    .memory_type_index(memory_type_index);
                unsafe { device.allocate_memory(&alloc_info, None) }
                    .context("vkAllocateMemory (buffer)")
            });
        let memory = match memory {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) }.context("vkBindBufferMemory") {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(e);
        }

        Ok(Self {
            device: device.clone(),
            buffer,
            memory,
            size,
        })
    }

    /// Copy `data` to the start of host-visible memory
    pub fn write<T: Pod>(&self, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::invalid(format!(
                "write of {} bytes exceeds buffer size {}",
                bytes.len(),
                self.size
            )));
        }

        unsafe {
            let mapped = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .context("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Requested size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Everything a staging upload borrows from the context
#[derive(Clone, Copy)]
pub struct UploadContext<'a> {
    /// Logical device
    pub device: &'a Device,
    /// Memory types of the physical device
    pub memory_properties: &'a vk::PhysicalDeviceMemoryProperties,
    /// Command pools for one-shot submissions
    pub commands: &'a CommandPoolSet,
    /// Resolved queue families
    pub families: QueueFamilies,
    /// Queue for buffer copies
    pub transfer_queue: vk::Queue,
    /// Queue for image layout transitions and copies
    pub graphics_queue: vk::Queue,
}

impl UploadContext<'_> {
    /// Host-visible staging buffer filled with `data`
    pub fn staging_buffer<T: Pod>(&self, data: &[T]) -> VulkanResult<Buffer> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let staging = Buffer::new(
            self.device,
            self.memory_properties,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            &[],
        )?;
        staging.write(bytes)?;
        Ok(staging)
    }

    /// Device-local buffer with `usage`, filled through a staging copy on the
    /// transfer queue
    pub fn upload_buffer_via_staging<T: Pod>(
        &self,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Buffer> {
        if data.is_empty() {
            return Err(VulkanError::invalid("cannot upload an empty buffer"));
        }
        let staging = self.staging_buffer(data)?;
        let size = staging.size();

        let buffer = Buffer::new(
            self.device,
            self.memory_properties,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            &[self.families.transfer, self.families.graphics],
        )?;

        self.commands
            .submit_single_time(QueueRole::Transfer, self.transfer_queue, |device, cmd| {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size,
                };
                unsafe {
                    device.cmd_copy_buffer(cmd, staging.handle(), buffer.handle(), &[region]);
                }
            })?;
        Ok(buffer)
    }
}
