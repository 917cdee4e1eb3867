//! Viewer demo application
//!
//! Opens a window, brings up the Vulkan renderer and clears the swapchain
//! every frame while uploading a textured quad, its material and an orbiting
//! camera. An optional config file (`.toml` or `.ron`) can be passed as the
//! first argument.

use nalgebra::{Matrix4, Point3, Vector3};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use render_core::prelude::*;

/// winit window exposed to the renderer
struct ViewerWindow(Window);

unsafe impl HasRawWindowHandle for ViewerWindow {
    fn raw_window_handle(&self) -> RawWindowHandle {
        self.0.raw_window_handle()
    }
}

unsafe impl HasRawDisplayHandle for ViewerWindow {
    fn raw_display_handle(&self) -> RawDisplayHandle {
        self.0.raw_display_handle()
    }
}

impl WindowHandle for ViewerWindow {
    fn current_extent(&self) -> (u32, u32) {
        let size = self.0.inner_size();
        (size.width, size.height)
    }
}

fn quad() -> Mesh {
    let normal = [0.0, 0.0, 1.0];
    Mesh::new(
        vec![
            Vertex::new([-0.5, -0.5, 0.0], normal, [0.0, 1.0]),
            Vertex::new([0.5, -0.5, 0.0], normal, [1.0, 1.0]),
            Vertex::new([0.5, 0.5, 0.0], normal, [1.0, 0.0]),
            Vertex::new([-0.5, 0.5, 0.0], normal, [0.0, 0.0]),
        ],
        vec![0, 1, 2, 2, 3, 0],
    )
}

/// Eight by eight checkerboard in packed RGB
fn checkerboard(size: u32) -> TextureData {
    let cell = (size / 8).max(1);
    let pixels = (0..size)
        .flat_map(|y| (0..size).map(move |x| ((x / cell) + (y / cell)) % 2 == 0))
        .flat_map(|light| if light { [230, 230, 230] } else { [40, 40, 60] })
        .collect();

    TextureData {
        width: size,
        height: size,
        layout: PixelLayout::Rgb,
        kind: TextureKind::BaseColor,
        pixels,
    }
}

fn orbit_camera(elapsed: f32, aspect: f32) -> CameraData {
    let eye = Point3::new(2.0 * elapsed.cos(), 0.8, 2.0 * elapsed.sin());
    let view = Matrix4::look_at_rh(&eye, &Point3::origin(), &Vector3::y());
    let mut projection = Matrix4::new_perspective(aspect, 45f32.to_radians(), 0.1, 100.0);
    // Vulkan clip space has Y pointing down
    projection[(1, 1)] *= -1.0;

    CameraData {
        view,
        projection,
        position: eye.coords,
    }
}

// Renderer is declared first so it is dropped before the window it presents to
struct ViewerApp {
    renderer: Option<VulkanRenderer>,
    window: Option<ViewerWindow>,
    config: RendererConfig,
    logger: Logger,
    start: Instant,
}

impl ViewerApp {
    fn new(config: RendererConfig, logger: Logger) -> Self {
        Self {
            renderer: None,
            window: None,
            config,
            logger,
            start: Instant::now(),
        }
    }

    fn start_renderer(&self, window: &ViewerWindow) -> BackendResult<VulkanRenderer> {
        let mut renderer = VulkanRenderer::new(self.config.clone(), self.logger.clone());
        renderer.init(window)?;
        renderer.set_model(&quad())?;
        renderer.set_material(
            &Material::solid("checker", [1.0, 1.0, 1.0, 1.0]).with_texture(checkerboard(256)),
        )?;
        Ok(renderer)
    }

    fn draw_frame(&mut self) {
        let (Some(renderer), Some(window)) = (self.renderer.as_mut(), self.window.as_ref()) else {
            return;
        };

        let (width, height) = window.current_extent();
        if width == 0 || height == 0 {
            return;
        }
        let aspect = width as f32 / height as f32;
        renderer.set_camera(&orbit_camera(self.start.elapsed().as_secs_f32(), aspect));

        if let Err(e) = renderer.render_frame() {
            log::error!("Frame failed: {e}");
        }
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title("Render Core Viewer")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => ViewerWindow(window),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        match self.start_renderer(&window) {
            Ok(renderer) => {
                log::info!("Renderer started");
                self.renderer = Some(renderer);
                window.0.request_redraw();
                self.window = Some(window);
            }
            Err(e) => {
                log::error!("Failed to start renderer: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.renderer = None;
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    self.renderer = None;
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    if let Err(e) = renderer.resize(size.width, size.height) {
                        log::error!("Resize to {}x{} failed: {e}", size.width, size.height);
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                self.draw_frame();
                if let Some(window) = self.window.as_ref() {
                    window.0.request_redraw();
                }
            }
            _ => (),
        }
    }
}

fn main() {
    let logger = Logger::facade("info");
    logger.init();

    let config = match std::env::args().nth(1) {
        Some(path) => match RendererConfig::load_from_file(&path) {
            Ok(config) => {
                log::info!("Loaded renderer config from {path}");
                config
            }
            Err(e) => {
                log::error!("Could not load config {path}: {e}");
                logger.shutdown();
                std::process::exit(1);
            }
        },
        None => RendererConfig::default(),
    };

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {e}");
            logger.shutdown();
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ViewerApp::new(config, logger.clone());
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop terminated with an error: {e}");
    }

    drop(app);
    logger.shutdown();
}
