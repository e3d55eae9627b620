//! Overlay engine crate.
//!
//! Textured 2D quads ("overlays") drawn on top of a host's rendering through
//! a render pass that runs once per frame per GPU context. Every GPU object
//! is created lazily and cached per context, so one overlay can be shown in
//! several windows at once.
//!
//! Layers:
//! - `context`, `gpu`: context ids, per-context slots and the host GPU seam
//! - `effect`, `overlay`, `texture`, `registry`, `pass`, `module`: the overlay layer
//! - `render`, `device`, `window`, `core`, `time`: the wgpu/winit host

pub mod context;
pub mod coords;
pub mod error;
pub mod gpu;
pub mod logging;

pub mod effect;
pub mod module;
pub mod overlay;
pub mod pass;
pub mod registry;
pub mod texture;

pub mod core;
pub mod device;
pub mod render;
pub mod time;
pub mod window;

pub use context::{ContextId, MAX_CONTEXTS};
pub use effect::{BlendMode, Effect};
pub use error::OverlayError;
pub use module::{OverlayConfig, OverlayModule};
pub use overlay::Overlay;
pub use pass::{DrawContext, DrawTask, OverlayRenderPass, RenderPass, RenderPasses};
pub use registry::{OverlayRegistry, SharedEffect, SharedOverlay};
pub use texture::{PixelTexture, SharedTextureSource, TextureError, TextureSource};
