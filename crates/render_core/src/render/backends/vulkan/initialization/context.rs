//! Vulkan context and initialization state machine
//!
//! [`VulkanContext`] exclusively owns every core component. Construction
//! runs the stages of [`InitStage`] in order; a failure drops whatever was
//! already built, in reverse. Fields are declared in teardown order so the
//! same reverse order holds when a ready context is dropped.
//!
//! [`RenderOrchestrator`] wraps construction in a three-state machine. A
//! failed initialization is terminal: the orchestrator must be dropped and
//! rebuilt.

use ash::vk;
use std::fmt;

use crate::config::Config;
use crate::core::config::RendererConfig;
use crate::foundation::logging::Logger;
use crate::render::backends::vulkan::{
    CommandPoolSet, DescriptorAllocator, DeviceExtensions, Fence, FrameSyncSet, GraphicsInstance,
    LogicalDevice, PhysicalDeviceInfo, PresentStatus, PresentationChain, QueueRole, Surface,
    SurfaceProvider, UploadContext, VkResultExt, VulkanError, VulkanResult,
};

/// Initialization stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InitStage {
    /// Runtime instance and debug messenger
    Instance,
    /// Presentation surface
    Surface,
    /// Physical device selection and logical device
    Device,
    /// Swapchain and image views
    SwapChain,
    /// Descriptor pools
    DescriptorAllocator,
    /// Graphics, transfer and compute command pools
    CommandPools,
    /// Per-frame semaphores, fences and command buffers
    FrameSync,
}

impl InitStage {
    /// Every stage in execution order
    pub const ORDER: [Self; 7] = [
        Self::Instance,
        Self::Surface,
        Self::Device,
        Self::SwapChain,
        Self::DescriptorAllocator,
        Self::CommandPools,
        Self::FrameSync,
    ];
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Instance => "instance",
            Self::Surface => "surface",
            Self::Device => "device",
            Self::SwapChain => "swapchain",
            Self::DescriptorAllocator => "descriptor allocator",
            Self::CommandPools => "command pools",
            Self::FrameSync => "frame sync",
        };
        f.write_str(name)
    }
}

/// Orchestrator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Nothing created yet
    Uninitialized,
    /// Every stage succeeded
    Ready,
    /// A stage failed; terminal
    Failed,
}

/// Frame being recorded between [`VulkanContext::begin_frame`] and
/// [`VulkanContext::end_frame`]
#[derive(Debug, Clone, Copy)]
pub struct ActiveFrame {
    /// Frame slot in the synchronization ring
    pub slot: usize,
    /// Acquired swapchain image index
    pub image_index: u32,
    /// Acquired swapchain image
    pub image: vk::Image,
    /// Slot command buffer, already begun
    pub command_buffer: vk::CommandBuffer,
    /// Swapchain extent
    pub extent: vk::Extent2D,
}

fn run_stage<T>(logger: &Logger, stage: InitStage, build: impl FnOnce() -> VulkanResult<T>) -> VulkanResult<T> {
    logger.debug(format_args!("Initializing {stage}"));
    build().map_err(|e| {
        logger.error(format_args!("Initialization failed at {stage}: {e}"));
        e
    })
}

/// Owner of every core Vulkan component
pub struct VulkanContext {
    // Field order is teardown order
    frames: FrameSyncSet,
    command_pools: CommandPoolSet,
    descriptor_allocator: DescriptorAllocator,
    swapchain: PresentationChain,
    device: LogicalDevice,
    physical_device: PhysicalDeviceInfo,
    surface: Surface,
    instance: GraphicsInstance,
    config: RendererConfig,
    logger: Logger,
}

impl VulkanContext {
    /// Run every initialization stage against `provider`
    pub fn new<P: SurfaceProvider + ?Sized>(
        provider: &P,
        config: &RendererConfig,
        logger: &Logger,
    ) -> VulkanResult<Self> {
        let logger = logger.with_target("render_core::context");
        config
            .validate()
            .map_err(|e| VulkanError::Configuration(e.to_string()))?;

        let instance = run_stage(&logger, InitStage::Instance, || {
            let platform_extensions = provider.required_extensions()?;
            GraphicsInstance::new(&config.instance, &platform_extensions, &logger)
        })?;

        let surface = run_stage(&logger, InitStage::Surface, || {
            let surface = Surface::new(&instance, provider)?;
            logger.info("Surface created");
            Ok(surface)
        })?;

        let (physical_device, device) = run_stage(&logger, InitStage::Device, || {
            let physical = PhysicalDeviceInfo::select_suitable_device(instance.raw(), &surface, &logger)?;
            let extensions = DeviceExtensions::from_config(&config.device)?;
            let device = LogicalDevice::new(instance.raw(), &physical, &extensions, &config.device, &logger)?;
            Ok((physical, device))
        })?;

        let swapchain = run_stage(&logger, InitStage::SwapChain, || {
            PresentationChain::new(
                &device,
                &physical_device,
                &surface,
                provider.current_extent(),
                &config.swapchain,
                &logger,
            )
        })?;

        let descriptor_allocator = run_stage(&logger, InitStage::DescriptorAllocator, || {
            DescriptorAllocator::for_device(device.raw(), &config.descriptors, &logger)
        })?;

        let command_pools = run_stage(&logger, InitStage::CommandPools, || {
            CommandPoolSet::new(&device, &logger)
        })?;

        let frames = run_stage(&logger, InitStage::FrameSync, || {
            let count = u32::try_from(config.frames.max_frames_in_flight)
                .map_err(|_| VulkanError::Configuration("too many frames in flight".to_string()))?;
            let command_buffers = command_pools.allocate(QueueRole::Graphics, count)?;
            FrameSyncSet::new(device.raw(), &command_buffers)
        })?;

        logger.info(format_args!(
            "Vulkan context ready: {} on {}, {} frames in flight",
            config.instance.application_name,
            physical_device.device_name(),
            frames.len()
        ));

        Ok(Self {
            frames,
            command_pools,
            descriptor_allocator,
            swapchain,
            device,
            physical_device,
            surface,
            instance,
            config: config.clone(),
            logger,
        })
    }

    /// Wait for the current slot, acquire an image and begin recording.
    ///
    /// Returns `None` when the frame must be skipped. That happens while
    /// swapchain creation is deferred and `window_extent` is still zero, when the
    /// surface is still out of date after one rebuild, or when acquisition
    /// timed out.
    ///
    /// `window_extent` is the drawable size the window layer reports now. It
    /// is used for any rebuild triggered by this frame's acquire or present.
    ///
    /// The slot's fence stays signaled until [`end_frame`](Self::end_frame)
    /// submits, so a frame abandoned after this call never blocks the slot.
    pub fn begin_frame(&mut self, window_extent: vk::Extent2D) -> VulkanResult<Option<ActiveFrame>> {
        if !self.swapchain.is_ready() {
            if window_extent.width > 0 && window_extent.height > 0 {
                self.swapchain
                    .recreate(&self.surface, window_extent, "surface restored")?;
            }
            if !self.swapchain.is_ready() {
                self.logger.debug("Frame skipped: swapchain creation deferred");
                return Ok(None);
            }
        }

        let timeout = self.config.swapchain.acquire_timeout_ns;
        let slot = self.frames.current_index();
        let sync = self.frames.current();
        sync.in_flight.wait(u64::MAX)?;

        let acquired = match self.swapchain.acquire_next_image(
            &self.surface,
            window_extent,
            sync.image_available.handle(),
            timeout,
        ) {
            Ok(acquired) => acquired,
            Err(e) if e.is_out_of_date() => {
                self.logger.warn("Frame skipped: surface out of date after rebuild");
                return Ok(None);
            }
            Err(VulkanError::Device {
                result: vk::Result::TIMEOUT | vk::Result::NOT_READY,
                ..
            }) => {
                self.logger.debug("Frame skipped: no swapchain image ready");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let image = self
            .swapchain
            .images()
            .get(acquired.index as usize)
            .copied()
            .ok_or_else(|| VulkanError::invalid("acquired image index out of range"))?;

        let command_buffer = sync.command_buffer;
        let raw = self.device.raw();
        unsafe { raw.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty()) }
            .context("vkResetCommandBuffer")?;
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { raw.begin_command_buffer(command_buffer, &begin_info) }
            .context("vkBeginCommandBuffer")?;

        Ok(Some(ActiveFrame {
            slot,
            image_index: acquired.index,
            image,
            command_buffer,
            extent: self.swapchain.extent(),
        }))
    }

    /// Finish recording, submit to the graphics queue, present, and advance
    pub fn end_frame(&mut self, frame: ActiveFrame) -> VulkanResult<PresentStatus> {
        let raw = self.device.raw();
        unsafe { raw.end_command_buffer(frame.command_buffer) }.context("vkEndCommandBuffer")?;

        let sync = self.frames.current();
        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages =
            [vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished.handle()];
        let command_buffers = [frame.command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        // Unsignaled only while a submission that will signal it is pending
        sync.in_flight.reset()?;
        let submitted = unsafe {
            raw.queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                sync.in_flight.handle(),
            )
        }
        .context("vkQueueSubmit");
        if let Err(e) = submitted {
            self.logger.error(format_args!(
                "Frame {} submit failed: {e}",
                self.frames.frame_number()
            ));
            self.frames.current_mut().in_flight = Fence::new(raw.clone(), true)?;
            return Err(e);
        }

        let status = self.swapchain.present(
            &self.surface,
            self.device.present_queue(),
            &signal_semaphores,
            frame.image_index,
        );
        self.frames.advance();
        status
    }

    /// Rebuild the swapchain for a new window extent
    pub fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> VulkanResult<()> {
        self.swapchain.recreate(&self.surface, extent, "window resized")
    }

    /// Borrowed handles for staging uploads
    pub fn upload_context(&self) -> UploadContext<'_> {
        UploadContext {
            device: self.device.raw(),
            memory_properties: &self.physical_device.memory_properties,
            commands: &self.command_pools,
            families: self.device.families(),
            transfer_queue: self.device.transfer_queue(),
            graphics_queue: self.device.graphics_queue(),
        }
    }

    /// Upload handles together with the descriptor allocator
    pub fn resources_mut(&mut self) -> (UploadContext<'_>, &mut DescriptorAllocator) {
        let upload = UploadContext {
            device: self.device.raw(),
            memory_properties: &self.physical_device.memory_properties,
            commands: &self.command_pools,
            families: self.device.families(),
            transfer_queue: self.device.transfer_queue(),
            graphics_queue: self.device.graphics_queue(),
        };
        (upload, &mut self.descriptor_allocator)
    }

    /// Runtime instance
    pub fn instance(&self) -> &GraphicsInstance {
        &self.instance
    }

    /// Presentation surface
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Selected physical device
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Logical device and queues
    pub fn device(&self) -> &LogicalDevice {
        &self.device
    }

    /// Presentation chain
    pub fn swapchain(&self) -> &PresentationChain {
        &self.swapchain
    }

    /// Descriptor allocator
    pub fn descriptor_allocator(&self) -> &DescriptorAllocator {
        &self.descriptor_allocator
    }

    /// Mutable descriptor allocator
    pub fn descriptor_allocator_mut(&mut self) -> &mut DescriptorAllocator {
        &mut self.descriptor_allocator
    }

    /// Command pools
    pub fn command_pools(&self) -> &CommandPoolSet {
        &self.command_pools
    }

    /// Frame synchronization ring
    pub fn frames(&self) -> &FrameSyncSet {
        &self.frames
    }

    /// Configuration the context was built with
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            self.logger
                .warn(format_args!("Device wait before teardown failed: {e}"));
        }
        self.logger.info("Tearing down Vulkan context");
    }
}

/// Initialization state machine around [`VulkanContext`]
pub struct RenderOrchestrator {
    context: Option<VulkanContext>,
    state: ContextState,
    failure: Option<String>,
    config: RendererConfig,
    logger: Logger,
}

impl RenderOrchestrator {
    /// Uninitialized orchestrator
    pub fn new(config: RendererConfig, logger: &Logger) -> Self {
        Self {
            context: None,
            state: ContextState::Uninitialized,
            failure: None,
            config,
            logger: logger.with_target("render_core::orchestrator"),
        }
    }

    /// Run every initialization stage.
    ///
    /// Only valid from [`ContextState::Uninitialized`]; a failure moves the
    /// orchestrator to [`ContextState::Failed`] for good.
    pub fn init<P: SurfaceProvider + ?Sized>(&mut self, provider: &P) -> VulkanResult<()> {
        match self.state {
            ContextState::Uninitialized => {}
            ContextState::Ready => return Err(VulkanError::invalid("already initialized")),
            ContextState::Failed => {
                return Err(VulkanError::invalid(format!(
                    "initialization failed earlier ({}); rebuild the orchestrator",
                    self.failure.as_deref().unwrap_or("unknown error")
                )))
            }
        }

        match VulkanContext::new(provider, &self.config, &self.logger) {
            Ok(context) => {
                self.context = Some(context);
                self.state = ContextState::Ready;
                self.logger.info("Render orchestrator ready");
                Ok(())
            }
            Err(e) => {
                self.state = ContextState::Failed;
                self.failure = Some(e.to_string());
                self.logger
                    .error(format_args!("Render orchestrator failed: {e}"));
                Err(e)
            }
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Message of the error that failed initialization
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Configuration used for initialization
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The ready context
    pub fn context(&self) -> VulkanResult<&VulkanContext> {
        self.context
            .as_ref()
            .ok_or_else(|| VulkanError::invalid(format!("context is {:?}", self.state)))
    }

    /// The ready context, mutably
    pub fn context_mut(&mut self) -> VulkanResult<&mut VulkanContext> {
        let state = self.state;
        self.context
            .as_mut()
            .ok_or_else(|| VulkanError::invalid(format!("context is {state:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::logging::MemorySink;
    use ash::{Entry, Instance};
    use log::Level;
    use std::cell::Cell;
    use std::ffi::CString;
    use std::sync::Arc;

    /// Provider that records calls and never creates a surface
    #[derive(Default)]
    struct RecordingProvider {
        extension_queries: Cell<u32>,
    }

    impl SurfaceProvider for RecordingProvider {
        fn required_extensions(&self) -> VulkanResult<Vec<CString>> {
            self.extension_queries.set(self.extension_queries.get() + 1);
            Ok(Vec::new())
        }

        fn create_surface(&self, _entry: &Entry, _instance: &Instance) -> VulkanResult<vk::SurfaceKHR> {
            Err(VulkanError::NotFound("test surface".to_string()))
        }

        fn current_extent(&self) -> vk::Extent2D {
            vk::Extent2D {
                width: 800,
                height: 600,
            }
        }
    }

    /// Stages run instance first and frame sync last
    #[test]
    fn test_stage_order() {
        let order = InitStage::ORDER;
        assert_eq!(order.first(), Some(&InitStage::Instance));
        assert_eq!(order.last(), Some(&InitStage::FrameSync));
        assert!(order.windows(2).all(|pair| pair[0] < pair[1]));

        let swapchain = order.iter().position(|s| *s == InitStage::SwapChain);
        let descriptors = order.iter().position(|s| *s == InitStage::DescriptorAllocator);
        assert!(swapchain < descriptors);
        assert_eq!(InitStage::CommandPools.to_string(), "command pools");
    }

    /// A fresh orchestrator exposes no context
    #[test]
    fn test_uninitialized_orchestrator() {
        let orchestrator = RenderOrchestrator::new(RendererConfig::default(), &Logger::disabled());

        assert_eq!(orchestrator.state(), ContextState::Uninitialized);
        assert!(orchestrator.failure().is_none());
        assert!(matches!(
            orchestrator.context(),
            Err(VulkanError::InvalidOperation { .. })
        ));
    }

    /// Failed initialization is terminal and never touches the provider
    #[test]
    fn test_failed_init_is_terminal() {
        let sink = Arc::new(MemorySink::new());
        let logger = Logger::new(sink.clone());
        let config = RendererConfig::default().with_max_frames_in_flight(0);
        let mut orchestrator = RenderOrchestrator::new(config, &logger);
        let provider = RecordingProvider::default();

        let err = orchestrator.init(&provider).expect_err("Should reject config");
        assert!(matches!(err, VulkanError::Configuration(_)));
        assert_eq!(orchestrator.state(), ContextState::Failed);
        assert!(orchestrator.failure().is_some());
        assert_eq!(provider.extension_queries.get(), 0);
        assert!(sink.contains(Level::Error, "Render orchestrator failed"));

        let err = orchestrator.init(&provider).expect_err("Should stay failed");
        assert!(matches!(err, VulkanError::InvalidOperation { .. }));
        assert_eq!(orchestrator.state(), ContextState::Failed);
        assert!(orchestrator.context_mut().is_err());
    }
}
