//! Window surface abstraction
//!
//! - **`backend`**: the [`Surface`] trait the renderer draws through
//! - The GLFW implementation lives in `backends/vulkan/initialization/window.rs`

mod backend;

pub use backend::Surface;
