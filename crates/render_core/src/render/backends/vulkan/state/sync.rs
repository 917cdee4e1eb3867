//! Synchronization primitives for frames in flight
//!
//! Each frame slot owns an "image available" semaphore, a "render finished"
//! semaphore, a fence and a primary command buffer. Slots are indexed by
//! `frame % N`; recording for frame `k + N` waits on the fence of frame `k`.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VkResultExt, VulkanResult};

/// Semaphore wrapper with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None) }
            .context("vkCreateSemaphore")?;

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None) }.context("vkCreateFence")?;

        Ok(Self { device, fence })
    }

    /// Block until the fence is signaled or `timeout` nanoseconds pass
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, timeout) }
            .context("vkWaitForFences")
    }

    /// Whether the fence is currently signaled
    pub fn is_signaled(&self) -> VulkanResult<bool> {
        unsafe { self.device.get_fence_status(self.fence) }.context("vkGetFenceStatus")
    }

    /// Return the fence to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]) }.context("vkResetFences")
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects and command buffer for one frame slot
pub struct FrameSync {
    /// Signaled when the acquired swapchain image is ready
    pub image_available: Semaphore,
    /// Signaled when the frame's commands finish
    pub render_finished: Semaphore,
    /// Signaled when the slot may be recorded again
    pub in_flight: Fence,
    /// Primary command buffer, owned by the graphics command pool
    pub command_buffer: vk::CommandBuffer,
}

impl FrameSync {
    /// Create the slot's objects; the fence starts signaled so the first wait passes
    pub fn new(device: &Device, command_buffer: vk::CommandBuffer) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device.clone(), true)?,
            command_buffer,
        })
    }
}

/// Slot used by `frame` when `frames_in_flight` slots rotate
pub fn frame_slot(frame: u64, frames_in_flight: usize) -> usize {
    let count = frames_in_flight.max(1) as u64;
    // Bounded by frames_in_flight, which is a usize
    (frame % count) as usize
}

/// Ring of frame slots
pub struct FrameSyncSet {
    frames: Vec<FrameSync>,
    frame: u64,
}

impl FrameSyncSet {
    /// One slot per command buffer
    pub fn new(device: &Device, command_buffers: &[vk::CommandBuffer]) -> VulkanResult<Self> {
        let frames = command_buffers
            .iter()
            .map(|&command_buffer| FrameSync::new(device, command_buffer))
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok(Self { frames, frame: 0 })
    }

    /// Number of frames in flight
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// No slots were created
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Monotonic frame counter
    pub fn frame_number(&self) -> u64 {
        self.frame
    }

    /// Slot index of the current frame
    pub fn current_index(&self) -> usize {
        frame_slot(self.frame, self.frames.len())
    }

    /// Objects of the current frame slot
    pub fn current(&self) -> &FrameSync {
        &self.frames[self.current_index()]
    }

    /// Objects of the current frame slot, mutably
    pub fn current_mut(&mut self) -> &mut FrameSync {
        let index = self.current_index();
        &mut self.frames[index]
    }

    /// Move to the next frame
    pub fn advance(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Frames rotate through slots modulo the frame count
    #[test]
    fn test_frame_slot_rotation() {
        let slots: Vec<usize> = (0..6).map(|frame| frame_slot(frame, 2)).collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0, 1]);

        assert_eq!(frame_slot(7, 3), 1);
        assert_eq!(frame_slot(u64::MAX, 2), 1);
    }

    /// A zero slot count never divides by zero
    #[test]
    fn test_frame_slot_zero_frames() {
        assert_eq!(frame_slot(5, 0), 0);
    }
}
