//! Presentation chain rebuilds against a hidden window
//!
//! Needs a Vulkan runtime and a display; run with `cargo test -- --ignored`.

mod common;

use ash::vk;
use common::TestWindow;
use render_core::core::config::RendererConfig;
use render_core::foundation::logging::{Level, Logger, MemorySink};
use render_core::render::backends::vulkan::VulkanContext;
use render_core::render::WindowHandle;
use std::sync::Arc;

/// Every swapchain image keeps a view across rebuilds, and frames rebuild
/// with the extent passed in rather than the one stored at creation
#[test]
#[ignore = "requires a Vulkan runtime"]
fn test_recreate_keeps_one_view_per_image() {
    let window = TestWindow::new(640, 480);
    let sink = Arc::new(MemorySink::new());
    let logger = Logger::new(sink.clone());
    let config = RendererConfig::default().with_validation(false);

    let mut context = VulkanContext::new(&window, &config, &logger).expect("Should create context");
    let chain = context.swapchain();
    assert!(chain.is_ready());
    assert!(!chain.images().is_empty());
    assert_eq!(chain.image_views().len(), chain.images().len());
    let rebuilds = chain.recreate_count();

    let (width, height) = window.current_extent();
    context
        .recreate_swapchain(vk::Extent2D { width, height })
        .expect("Should recreate swapchain");

    let chain = context.swapchain();
    assert_eq!(chain.image_views().len(), chain.images().len());
    assert_eq!(chain.recreate_count(), rebuilds + 1);
    assert!(sink.contains(Level::Warn, "window resized"));

    let fresh = vk::Extent2D {
        width: width / 2,
        height: height / 2,
    };
    let frame = context.begin_frame(fresh).expect("Should begin frame");
    assert_eq!(context.swapchain().window_extent(), fresh);
    if let Some(frame) = frame {
        context.end_frame(frame).expect("Should end frame");
    }
    context.device().wait_idle().expect("Should drain device");
}
