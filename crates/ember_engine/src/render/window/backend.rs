//! Drawable surface contract
//!
//! The renderer only needs to know how large the drawable area currently is
//! and whether the user asked to close it. Resize notifications are delivered
//! by the application loop, which forwards them to
//! [`Renderer::resize`](crate::render::Renderer::resize).

/// A native drawable target with a size
pub trait Surface {
    /// Current framebuffer size in pixels
    ///
    /// This is the drawable area, which may differ from the window size on
    /// high-DPI displays. A minimized window reports `(0, 0)`.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Whether the user has requested the surface to close
    fn should_close(&self) -> bool;

    /// Whether the surface currently has a drawable area
    fn is_drawable(&self) -> bool {
        let (width, height) = self.framebuffer_size();
        width > 0 && height > 0
    }
}
