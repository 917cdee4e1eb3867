//! Vulkan implementation of [`RenderBackend`]
//!
//! [`VulkanRenderer`] drives a [`RenderOrchestrator`] and keeps the scene
//! resources that hang off the context: per-frame camera uniforms, the
//! uploaded model and the active material. Frames clear the acquired image
//! to the configured color and present it.

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::core::config::RendererConfig;
use crate::foundation::logging::Logger;
use crate::render::backends::vulkan::{
    channel_format, Buffer, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorWriter,
    DeviceImage, LayoutTransition, PresentStatus, RenderOrchestrator, Sampler, VulkanContext,
    VulkanResult,
};
use crate::render::camera::CameraUniform;
use crate::render::{
    BackendResult, CameraData, Material, Mesh, RenderBackend, RenderError, TextureData,
    WindowHandle,
};

/// Material parameters as seen by the fragment stage
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct MaterialUniform {
    base_color: [f32; 4],
    // x: 1 when a base color texture is bound
    flags: [u32; 4],
}

unsafe impl Zeroable for MaterialUniform {}
unsafe impl Pod for MaterialUniform {}

const HOST_MEMORY: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

const WHITE_PIXEL: [u8; 4] = [u8::MAX; 4];

fn uniform_buffer<T: Pod>(context: &VulkanContext, value: &T) -> VulkanResult<Buffer> {
    let buffer = Buffer::new(
        context.device().raw(),
        &context.physical_device().memory_properties,
        std::mem::size_of::<T>() as vk::DeviceSize,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        HOST_MEMORY,
        &[],
    )?;
    buffer.write(std::slice::from_ref(value))?;
    Ok(buffer)
}

struct FrameResources {
    camera_buffer: Buffer,
    descriptor_set: vk::DescriptorSet,
}

struct ModelBuffers {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

struct MaterialResources {
    name: String,
    // None when the material samples the default white texture
    texture: Option<DeviceImage>,
    uniform: Buffer,
    descriptor_set: vk::DescriptorSet,
}

/// Resources created once the context is ready. Dropped before it.
struct SceneResources {
    material: Option<MaterialResources>,
    model: Option<ModelBuffers>,
    frames: Vec<FrameResources>,
    default_texture: DeviceImage,
    sampler: Sampler,
    material_layout: DescriptorSetLayout,
    frame_layout: DescriptorSetLayout,
}

impl SceneResources {
    fn new(context: &mut VulkanContext, camera: &CameraUniform) -> VulkanResult<Self> {
        let device = context.device().raw().clone();

        let frame_layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .build(&device)?;
        let material_layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::FRAGMENT)
            .add_combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
            .build(&device)?;

        let anisotropy_supported = context.physical_device().features.sampler_anisotropy == vk::TRUE;
        let max_anisotropy = (context.config().device.sampler_anisotropy && anisotropy_supported)
            .then(|| {
                context
                    .physical_device()
                    .properties
                    .limits
                    .max_sampler_anisotropy
                    .min(16.0)
            });
        let sampler = Sampler::new(&device, max_anisotropy)?;

        let upload = context.upload_context();
        let default_texture = upload.create_device_image(
            vk::Extent2D {
                width: 1,
                height: 1,
            },
            vk::Format::R8G8B8A8_UNORM,
        )?;
        upload.upload_via_staging_buffer(&default_texture, &WHITE_PIXEL)?;

        let frame_count = context.frames().len();
        let camera_buffers = (0..frame_count)
            .map(|_| uniform_buffer(context, camera))
            .collect::<VulkanResult<Vec<_>>>()?;
        let sets = context
            .descriptor_allocator_mut()
            .allocate_sets(frame_layout.handle(), frame_count)?;

        let frames = camera_buffers
            .into_iter()
            .zip(sets)
            .map(|(camera_buffer, descriptor_set)| {
                DescriptorWriter::new(descriptor_set)
                    .write_buffer(
                        0,
                        vk::DescriptorType::UNIFORM_BUFFER,
                        camera_buffer.handle(),
                        0,
                        vk::WHOLE_SIZE,
                    )
                    .update(&device);
                FrameResources {
                    camera_buffer,
                    descriptor_set,
                }
            })
            .collect();

        Ok(Self {
            material: None,
            model: None,
            frames,
            default_texture,
            sampler,
            material_layout,
            frame_layout,
        })
    }
}

/// Pick the upload format for `texture`, expanding three-channel data to
/// four channels when the device cannot sample the packed format.
fn prepare_texture(context: &VulkanContext, texture: &TextureData) -> VulkanResult<(vk::Format, Vec<u8>)> {
    let srgb = texture.kind.is_srgb();
    let packed = channel_format(texture.layout, srgb);
    let expanded = channel_format(texture.layout.with_alpha(), srgb);
    let formats = [packed, expanded];
    let candidates = if texture.layout.bytes_per_pixel() == 3 {
        &formats[..]
    } else {
        &formats[..1]
    };

    let format = context.physical_device().find_supported_format(
        context.instance().raw(),
        candidates,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::SAMPLED_IMAGE | vk::FormatFeatureFlags::TRANSFER_DST,
    )?;

    let pixels = if format == packed {
        texture.pixels.clone()
    } else {
        texture.layout.expand_to_alpha(&texture.pixels)
    };
    Ok((format, pixels))
}

/// Check a mesh for upload and return its index count
fn validate_mesh(mesh: &Mesh) -> BackendResult<u32> {
    if mesh.is_empty() {
        return Err(RenderError::ResourceCreationFailed(
            "mesh has no vertices or indices".to_string(),
        ));
    }
    if let Some(position) = mesh.first_invalid_index() {
        return Err(RenderError::ResourceCreationFailed(format!(
            "index {position} references a vertex past the end of {} vertices",
            mesh.vertices.len()
        )));
    }
    u32::try_from(mesh.indices.len())
        .map_err(|_| RenderError::ResourceCreationFailed("too many indices".to_string()))
}

/// Vulkan rendering backend
pub struct VulkanRenderer {
    scene: Option<SceneResources>,
    orchestrator: RenderOrchestrator,
    camera: CameraUniform,
    // Latest window size, used when the chain is rebuilt during a frame
    window_extent: vk::Extent2D,
    logger: Logger,
}

impl VulkanRenderer {
    /// Renderer that creates nothing until [`RenderBackend::init`]
    pub fn new(config: RendererConfig, logger: Logger) -> Self {
        Self {
            scene: None,
            orchestrator: RenderOrchestrator::new(config, &logger),
            camera: CameraUniform::from(&CameraData::default()),
            window_extent: vk::Extent2D::default(),
            logger: logger.with_target("render_core::renderer"),
        }
    }

    /// Underlying orchestrator
    pub fn orchestrator(&self) -> &RenderOrchestrator {
        &self.orchestrator
    }

    /// Whether init completed and scene resources exist
    pub fn is_initialized(&self) -> bool {
        self.scene.is_some()
    }

    /// Index count of the uploaded model, if any
    pub fn model_index_count(&self) -> Option<u32> {
        self.scene
            .as_ref()
            .and_then(|scene| scene.model.as_ref())
            .map(|model| model.index_count)
    }

    /// Name of the active material, if any
    pub fn material_name(&self) -> Option<&str> {
        self.scene
            .as_ref()
            .and_then(|scene| scene.material.as_ref())
            .map(|material| material.name.as_str())
    }

    /// Vertex buffer, index buffer and index count of the uploaded model
    pub fn model_buffers(&self) -> Option<(vk::Buffer, vk::Buffer, u32)> {
        let model = self.scene.as_ref()?.model.as_ref()?;
        Some((
            model.vertex_buffer.handle(),
            model.index_buffer.handle(),
            model.index_count,
        ))
    }

    /// Camera descriptor set for a frame slot
    pub fn frame_descriptor_set(&self, slot: usize) -> Option<vk::DescriptorSet> {
        self.scene
            .as_ref()?
            .frames
            .get(slot)
            .map(|frame| frame.descriptor_set)
    }

    /// Descriptor set, uniform buffer and texture format of the active material.
    /// The format is `None` when the default white texture is bound.
    pub fn material_bindings(&self) -> Option<(vk::DescriptorSet, vk::Buffer, Option<vk::Format>)> {
        let material = self.scene.as_ref()?.material.as_ref()?;
        Some((
            material.descriptor_set,
            material.uniform.handle(),
            material.texture.as_ref().map(DeviceImage::format),
        ))
    }

    /// Frame and material descriptor set layouts
    pub fn descriptor_set_layouts(&self) -> Option<[vk::DescriptorSetLayout; 2]> {
        let scene = self.scene.as_ref()?;
        Some([scene.frame_layout.handle(), scene.material_layout.handle()])
    }

    fn ready(&mut self) -> BackendResult<(&mut VulkanContext, &mut SceneResources)> {
        let scene = self
            .scene
            .as_mut()
            .ok_or_else(|| RenderError::InvalidState("renderer is not initialized".to_string()))?;
        let context = self
            .orchestrator
            .context_mut()
            .map_err(|e| RenderError::InvalidState(e.to_string()))?;
        Ok((context, scene))
    }

    fn record_clear(context: &VulkanContext, command_buffer: vk::CommandBuffer, image: vk::Image) {
        let device = context.device().raw();
        let clear = vk::ClearColorValue {
            float32: context.config().frames.clear_color,
        };
        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        LayoutTransition::CLEAR_BEGIN.record(device, command_buffer, image);
        unsafe {
            device.cmd_clear_color_image(
                command_buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear,
                &[range],
            );
        }
        LayoutTransition::PRESENT.record(device, command_buffer, image);
    }
}

impl RenderBackend for VulkanRenderer {
    fn init(&mut self, window: &dyn WindowHandle) -> BackendResult<()> {
        let (width, height) = window.current_extent();
        self.window_extent = vk::Extent2D { width, height };
        self.orchestrator
            .init(window)
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;

        let context = self
            .orchestrator
            .context_mut()
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;
        let scene = SceneResources::new(context, &self.camera).map_err(|e| {
            self.logger
                .error(format_args!("Scene resource creation failed: {e}"));
            RenderError::InitializationFailed(e.to_string())
        })?;

        self.logger.info(format_args!(
            "Renderer initialized with {} frames in flight",
            scene.frames.len()
        ));
        self.scene = Some(scene);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> BackendResult<()> {
        self.window_extent = vk::Extent2D { width, height };
        if self.scene.is_none() {
            self.logger
                .debug(format_args!("Resize to {width}x{height} before init ignored"));
            return Ok(());
        }
        let extent = self.window_extent;
        let (context, _) = self.ready()?;
        context.recreate_swapchain(extent)?;
        Ok(())
    }

    fn render_frame(&mut self) -> BackendResult<()> {
        let camera = self.camera;
        let window_extent = self.window_extent;
        let logger = self.logger.clone();
        let (context, scene) = self.ready()?;

        let Some(frame) = context.begin_frame(window_extent)? else {
            return Ok(());
        };

        // The slot's fence was waited on, so its uniform is no longer read.
        // A failed write still submits the frame so the fence gets signaled.
        let camera_written = match scene.frames.get(frame.slot) {
            Some(resources) => resources
                .camera_buffer
                .write(std::slice::from_ref(&camera))
                .map_err(RenderError::from),
            None => Err(RenderError::RenderingFailed(format!(
                "no resources for frame slot {}",
                frame.slot
            ))),
        };

        Self::record_clear(context, frame.command_buffer, frame.image);

        let status = context.end_frame(frame)?;
        camera_written?;
        match status {
            PresentStatus::Presented => {}
            PresentStatus::Suboptimal => logger.debug("Presented to a suboptimal swapchain"),
            PresentStatus::Recreated => logger.info("Swapchain rebuilt after present"),
        }
        Ok(())
    }

    fn set_model(&mut self, mesh: &Mesh) -> BackendResult<()> {
        let logger = self.logger.clone();
        let (context, scene) = self.ready()?;
        let index_count = validate_mesh(mesh)?;

        let upload = context.upload_context();
        let vertex_buffer =
            upload.upload_buffer_via_staging(mesh.vertices.as_slice(), vk::BufferUsageFlags::VERTEX_BUFFER)?;
        let index_buffer =
            upload.upload_buffer_via_staging(mesh.indices.as_slice(), vk::BufferUsageFlags::INDEX_BUFFER)?;

        // Old buffers may still be referenced by frames in flight
        context.device().wait_idle()?;
        scene.model = Some(ModelBuffers {
            vertex_buffer,
            index_buffer,
            index_count,
        });
        logger.info(format_args!(
            "Model uploaded: {} vertices, {index_count} indices",
            mesh.vertices.len()
        ));
        Ok(())
    }

    fn set_material(&mut self, material: &Material) -> BackendResult<()> {
        let logger = self.logger.clone();
        let (context, scene) = self.ready()?;

        let texture = match &material.base_color_texture {
            Some(texture) if !texture.is_well_formed() => {
                return Err(RenderError::ResourceCreationFailed(format!(
                    "texture of material '{}' has {} bytes, expected {}",
                    material.name,
                    texture.pixels.len(),
                    texture.expected_len()
                )));
            }
            Some(texture) => {
                let (format, pixels) = prepare_texture(context, texture)?;
                let upload = context.upload_context();
                let image = upload.create_device_image(
                    vk::Extent2D {
                        width: texture.width,
                        height: texture.height,
                    },
                    format,
                )?;
                upload.upload_via_staging_buffer(&image, &pixels)?;
                logger.debug(format_args!(
                    "Texture {}x{} uploaded as {format:?}",
                    texture.width, texture.height
                ));
                Some(image)
            }
            None => None,
        };

        let uniform = uniform_buffer(
            context,
            &MaterialUniform {
                base_color: material.base_color,
                flags: [u32::from(texture.is_some()), 0, 0, 0],
            },
        )?;
        let view = texture
            .as_ref()
            .map_or_else(|| scene.default_texture.view(), DeviceImage::view);

        let device = context.device().raw().clone();
        let descriptor_set = context
            .descriptor_allocator_mut()
            .allocate_set(scene.material_layout.handle())?;
        DescriptorWriter::new(descriptor_set)
            .write_buffer(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                uniform.handle(),
                0,
                vk::WHOLE_SIZE,
            )
            .write_image(
                1,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                view,
                scene.sampler.handle(),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
            .update(&device);

        let replaced = scene.material.replace(MaterialResources {
            name: material.name.clone(),
            texture,
            uniform,
            descriptor_set,
        });

        if let Some(old) = replaced {
            context.device().wait_idle()?;
            let allocator = context.descriptor_allocator_mut();
            if allocator.config().free_individual_sets {
                allocator.free_set(old.descriptor_set)?;
            } else {
                logger.debug(format_args!(
                    "Descriptor set of material '{}' kept until pool reset",
                    old.name
                ));
            }
        }

        logger.info(format_args!("Material '{}' active", material.name));
        Ok(())
    }

    fn set_camera(&mut self, camera: &CameraData) {
        self.camera = CameraUniform::from(camera);
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if self.scene.is_none() {
            return;
        }
        if let Ok(context) = self.orchestrator.context() {
            if let Err(e) = context.device().wait_idle() {
                self.logger
                    .warn(format_args!("Device wait before scene teardown failed: {e}"));
            }
        }
        self.scene = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::logging::{Level, MemorySink};
    use crate::foundation::math::Vec3;
    use crate::render::Vertex;
    use std::sync::Arc;

    fn renderer() -> (VulkanRenderer, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let renderer = VulkanRenderer::new(RendererConfig::default(), Logger::new(sink.clone()));
        (renderer, sink)
    }

    fn triangle() -> Mesh {
        Mesh::new(
            vec![
                Vertex::new([0.0, 0.5, 0.0], [0.0, 0.0, 1.0], [0.5, 0.0]),
                Vertex::new([-0.5, -0.5, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
                Vertex::new([0.5, -0.5, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
            ],
            vec![0, 1, 2],
        )
    }

    /// Frame and resource calls before init report an invalid state
    #[test]
    fn test_calls_before_init_are_invalid() {
        let (mut renderer, _) = renderer();

        assert!(matches!(renderer.render_frame(), Err(RenderError::InvalidState(_))));
        assert!(matches!(
            renderer.set_model(&triangle()),
            Err(RenderError::InvalidState(_))
        ));
        assert!(matches!(
            renderer.set_material(&Material::solid("plain", [1.0; 4])),
            Err(RenderError::InvalidState(_))
        ));
        assert!(!renderer.is_initialized());
    }

    /// Resizing before init is ignored
    #[test]
    fn test_resize_before_init_is_noop() {
        let (mut renderer, sink) = renderer();

        renderer.resize(800, 600).expect("Should ignore resize");
        assert!(sink.contains(Level::Debug, "before init ignored"));
    }

    /// Uninitialized renderers report their state before mesh problems
    #[test]
    fn test_set_model_checks_state_first() {
        let (mut renderer, _) = renderer();

        let empty = Mesh::new(Vec::new(), Vec::new());
        assert!(matches!(
            renderer.set_model(&empty),
            Err(RenderError::InvalidState(_))
        ));
    }

    /// Empty meshes and out-of-range indices fail validation
    #[test]
    fn test_validate_mesh() {
        assert_eq!(validate_mesh(&triangle()).expect("Should accept triangle"), 3);

        let empty = Mesh::new(Vec::new(), Vec::new());
        assert!(matches!(
            validate_mesh(&empty),
            Err(RenderError::ResourceCreationFailed(_))
        ));

        let mut broken = triangle();
        broken.indices.push(7);
        let err = validate_mesh(&broken).expect_err("Should reject index");
        assert!(err.to_string().contains("index 3"));
    }

    /// Resizing before init still records the latest window size
    #[test]
    fn test_resize_before_init_tracks_extent() {
        let (mut renderer, _) = renderer();

        renderer.resize(640, 480).expect("Should ignore resize");
        assert_eq!(renderer.window_extent, vk::Extent2D { width: 640, height: 480 });
    }

    /// Camera updates are stored without a context
    #[test]
    fn test_set_camera_before_init() {
        let (mut renderer, _) = renderer();
        let camera = CameraData {
            position: Vec3::new(1.0, 2.0, 3.0),
            ..CameraData::default()
        };

        renderer.set_camera(&camera);
        assert_eq!(renderer.camera, CameraUniform::from(&camera));
        assert_eq!(renderer.model_index_count(), None);
        assert_eq!(renderer.material_name(), None);
        assert!(renderer.model_buffers().is_none());
        assert!(renderer.descriptor_set_layouts().is_none());
    }

    /// Material uniforms keep the std140 vec4 layout
    #[test]
    fn test_material_uniform_layout() {
        assert_eq!(std::mem::size_of::<MaterialUniform>(), 32);
        let uniform = MaterialUniform {
            base_color: [0.5; 4],
            flags: [1, 0, 0, 0],
        };
        let bytes: &[u8] = bytemuck::bytes_of(&uniform);
        assert_eq!(&bytes[16..20], &1u32.to_ne_bytes());
    }
}
