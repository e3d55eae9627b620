//! wgpu backend for the overlay layer.
//!
//! Convention:
//! - overlay space is in logical pixels, origin bottom-left, +Y up
//! - projection and model transform come in as uniforms; shaders do the rest

mod ctx;
mod shader_library;
mod wgpu_context;

pub use ctx::RenderTarget;
pub use shader_library::{
    FRAGMENT_ENTRY, OVERLAY_FRAGMENT_SHADER, OVERLAY_VERTEX_SHADER, ShaderLibrary, VERTEX_ENTRY,
    validate_wgsl,
};
pub use wgpu_context::{UNIFORM_SLOT_SIZE, WgpuContext};
