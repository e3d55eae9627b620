//! Host GPU API consumed by effects and overlays.
//!
//! The overlay layer never talks to a graphics API directly. It drives a
//! [`GpuContext`], which owns the real objects (programs, uniforms, vertex
//! arrays, textures) and hands back opaque handles.
//!
//! Implementations:
//! - [`RecordingGpu`]: headless, records every call (tests, tooling)
//! - `render::WgpuContext`: wgpu device backend

mod draw_call;
mod error;
mod handles;
mod recording;

pub use draw_call::{DrawCall, Topology};
pub use error::GpuError;
pub use handles::{ProgramId, TextureId, UniformId, VertexArrayId};
pub use recording::{ProgramRecord, RecordingGpu, RunRecord};

use crate::context::ContextId;
use crate::pass::DrawContext;

/// Programmable pipeline stage a shader source is attached to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Value assigned to a program uniform.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Mat4(glam::Mat4),
}

/// Float vertex attribute inside one vertex buffer.
///
/// `stride == 0` means tightly packed (sum of the buffer's attribute widths).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexAttribute {
    pub buffer: u32,
    pub location: u32,
    pub name: &'static str,
    /// 1..=4 `f32` components.
    pub components: u32,
    pub normalized: bool,
    pub stride: u32,
    pub offset: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

/// Color blend equation `src * src_factor + dst * dst_factor`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlendState {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

/// One GPU context as seen by the overlay layer.
///
/// Blend state is global to the context, not scoped to a draw call.
pub trait GpuContext {
    fn id(&self) -> ContextId;

    fn create_program(&mut self) -> ProgramId;

    /// Declares a named uniform on `program`. Uniforms are laid out in declaration order.
    fn add_uniform(&mut self, program: ProgramId, name: &str) -> UniformId;

    /// Attaches the shader source at `path` to `stage`. Takes effect on the next build.
    fn set_shader(&mut self, program: ProgramId, stage: ShaderStage, path: &str);

    fn build_program(&mut self, program: ProgramId) -> Result<(), GpuError>;

    fn set_uniform(&mut self, uniform: UniformId, value: UniformValue);

    fn create_vertex_array(&mut self) -> VertexArrayId;

    /// Uploads vertex data into buffer `slot` of `array`.
    fn add_vertex_buffer(&mut self, array: VertexArrayId, slot: u32, data: &[u8]);

    fn add_attribute(&mut self, array: VertexArrayId, attribute: VertexAttribute);

    /// `None` disables blending.
    fn set_blend(&mut self, blend: Option<BlendState>);

    /// Creates an RGBA8 texture (`rgba.len() == width * height * 4`).
    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId, GpuError>;

    /// Overwrites the full contents of an existing texture.
    fn write_texture(&mut self, texture: TextureId, rgba: &[u8]) -> Result<(), GpuError>;

    fn begin_draw_2d(&mut self, dc: &DrawContext);

    fn end_draw(&mut self);

    fn run(&mut self, call: &DrawCall);
}

/// Expected byte length of a tightly packed RGBA8 image.
pub(crate) fn rgba_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}
