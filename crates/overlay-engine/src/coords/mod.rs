//! Screen-space geometry shared by overlays and the 2D draw scope.
//!
//! Overlay space:
//! - pixels of the target viewport
//! - origin bottom-left
//! - +X right, +Y up
//!
//! [`Viewport::ortho`] maps this space to clip space.

mod vec2;
mod viewport;

pub use vec2::Vec2;
pub use viewport::Viewport;
