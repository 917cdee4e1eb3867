//! Window capability consumed by rendering backends

use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

/// A native window the renderer can present into
///
/// The window layer owns the native handles; the renderer only borrows them
/// to create a drawing surface and asks for the drawable size whenever the
/// presentation chain is (re)built.
pub trait WindowHandle: HasRawWindowHandle + HasRawDisplayHandle {
    /// Current drawable size in pixels
    fn current_extent(&self) -> (u32, u32);
}
