//! Command pools per queue role
//!
//! One pool is created for each of the graphics, transfer and compute
//! families. Pools are never shared across threads; a thread recording in
//! parallel needs its own set.

use ash::{vk, Device};
use std::fmt;

use crate::foundation::logging::Logger;
use crate::render::backends::vulkan::{
    Fence, LogicalDevice, QueueFamilies, VkResultExt, VulkanError, VulkanResult,
};

/// Queue role a command pool serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueRole {
    /// Draw and clear work, re-recorded every frame
    Graphics,
    /// One-shot uploads
    Transfer,
    /// Compute dispatch
    Compute,
}

impl QueueRole {
    /// Every role, in pool creation order
    pub const ALL: [Self; 3] = [Self::Graphics, Self::Transfer, Self::Compute];

    /// Creation flags for this role's pool
    pub fn pool_flags(self) -> vk::CommandPoolCreateFlags {
        match self {
            Self::Graphics | Self::Compute => vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            Self::Transfer => vk::CommandPoolCreateFlags::TRANSIENT,
        }
    }

    /// Family serving this role
    pub fn family(self, families: &QueueFamilies) -> u32 {
        match self {
            Self::Graphics => families.graphics,
            Self::Transfer => families.transfer,
            Self::Compute => families.compute,
        }
    }
}

impl fmt::Display for QueueRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Graphics => "graphics",
            Self::Transfer => "transfer",
            Self::Compute => "compute",
        };
        f.write_str(name)
    }
}

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
    family: u32,
}

impl CommandPool {
    /// Create a pool on `queue_family_index`
    pub fn new(
        device: Device,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(flags)
            .queue_family_index(queue_family_index);
        let command_pool = unsafe { device.create_command_pool(&pool_create_info, None) }
            .context("vkCreateCommandPool")?;

        Ok(Self {
            device,
            command_pool,
            family: queue_family_index,
        })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .context("vkAllocateCommandBuffers")
    }

    /// Return command buffers to the pool
    pub fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        if command_buffers.is_empty() {
            return;
        }
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, command_buffers);
        }
    }

    /// Pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Queue family the pool records for
    pub fn family(&self) -> u32 {
        self.family
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees its command buffers
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Graphics, transfer and compute command pools
pub struct CommandPoolSet {
    device: Device,
    graphics: CommandPool,
    transfer: CommandPool,
    compute: CommandPool,
    logger: Logger,
}

impl CommandPoolSet {
    /// Create all three pools; any failure aborts the whole set
    pub fn new(device: &LogicalDevice, logger: &Logger) -> VulkanResult<Self> {
        let logger = logger.with_target("render_core::commands");
        let families = device.families();

        let create = |role: QueueRole| {
            CommandPool::new(device.raw().clone(), role.family(&families), role.pool_flags()).map_err(
                |e| {
                    logger.error(format_args!("Command pool creation failed ({role}): {e}"));
                    e
                },
            )
        };
        let graphics = create(QueueRole::Graphics)?;
        let transfer = create(QueueRole::Transfer)?;
        let compute = create(QueueRole::Compute)?;

        logger.info(format_args!(
            "Command pools created (graphics {}, transfer {}, compute {})",
            graphics.family(),
            transfer.family(),
            compute.family()
        ));

        Ok(Self {
            device: device.raw().clone(),
            graphics,
            transfer,
            compute,
            logger,
        })
    }

    /// Pool for `role`
    pub fn pool(&self, role: QueueRole) -> &CommandPool {
        match role {
            QueueRole::Graphics => &self.graphics,
            QueueRole::Transfer => &self.transfer,
            QueueRole::Compute => &self.compute,
        }
    }

    /// Allocate `count` primary buffers from the `role` pool
    pub fn allocate(&self, role: QueueRole, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        self.pool(role).allocate_command_buffers(count)
    }

    /// Free buffers previously allocated from the `role` pool
    pub fn free(&self, role: QueueRole, command_buffers: &[vk::CommandBuffer]) {
        self.pool(role).free_command_buffers(command_buffers);
    }

    /// Record with `record`, submit to `queue` and block until it completes
    pub fn submit_single_time<F>(&self, role: QueueRole, queue: vk::Queue, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer),
    {
        let command_buffer = self
            .allocate(role, 1)?
            .pop()
            .ok_or_else(|| VulkanError::invalid("no command buffer allocated"))?;

        let result = self.record_and_wait(command_buffer, queue, record);
        self.free(role, &[command_buffer]);
        if let Err(e) = &result {
            self.logger
                .error(format_args!("Single-time {role} submission failed: {e}"));
        }
        result
    }

    fn record_and_wait<F>(&self, command_buffer: vk::CommandBuffer, queue: vk::Queue, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer),
    {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) }
            .context("vkBeginCommandBuffer (single-time)")?;

        record(&self.device, command_buffer);

        unsafe { self.device.end_command_buffer(command_buffer) }
            .context("vkEndCommandBuffer (single-time)")?;

        let fence = Fence::new(self.device.clone(), false)?;
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
        unsafe { self.device.queue_submit(queue, &[submit_info], fence.handle()) }
            .context("vkQueueSubmit (single-time)")?;
        fence.wait(u64::MAX)
    }
}
