//! Hidden winit window shared by the windowed integration tests
//!
//! winit allows one event loop per process, so each test binary holds at
//! most one test that calls [`TestWindow::new`].

use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle};
use render_core::render::WindowHandle;
use winit::dpi::PhysicalSize;
use winit::event_loop::EventLoop;
use winit::window::Window;

#[cfg(target_os = "linux")]
use winit::platform::x11::EventLoopBuilderExtX11;
#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;

// Window is declared first so it is dropped before its event loop
pub struct TestWindow {
    window: Window,
    _event_loop: EventLoop<()>,
}

impl TestWindow {
    /// Invisible window of `width` by `height` pixels
    pub fn new(width: u32, height: u32) -> Self {
        let mut builder = EventLoop::builder();
        // Test harness threads are never the main thread
        #[cfg(any(target_os = "linux", target_os = "windows"))]
        builder.with_any_thread(true);
        let event_loop = builder.build().expect("Should create event loop");

        let attributes = Window::default_attributes()
            .with_title("render_core test")
            .with_visible(false)
            .with_inner_size(PhysicalSize::new(width, height));
        #[allow(deprecated)]
        let window = event_loop
            .create_window(attributes)
            .expect("Should create window");

        Self {
            window,
            _event_loop: event_loop,
        }
    }
}

unsafe impl HasRawWindowHandle for TestWindow {
    fn raw_window_handle(&self) -> RawWindowHandle {
        self.window.raw_window_handle()
    }
}

unsafe impl HasRawDisplayHandle for TestWindow {
    fn raw_display_handle(&self) -> RawDisplayHandle {
        self.window.raw_display_handle()
    }
}

impl WindowHandle for TestWindow {
    fn current_extent(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}
