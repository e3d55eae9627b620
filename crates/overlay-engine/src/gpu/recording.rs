//! Headless [`GpuContext`] that records every call.
//!
//! No device is touched. Handles are plain counters, shader builds succeed
//! unless a path was marked failing with [`RecordingGpu::fail_shader`].

use std::collections::{HashMap, HashSet};

use crate::context::ContextId;
use crate::pass::DrawContext;

use super::{
    BlendState, DrawCall, GpuContext, GpuError, ProgramId, ShaderStage, TextureId, Topology,
    UniformId, UniformValue, VertexArrayId, VertexAttribute, rgba_len,
};

/// Recorded state of one program.
#[derive(Debug, Clone, Default)]
pub struct ProgramRecord {
    pub uniforms: Vec<(String, UniformId)>,
    pub vertex_shader: Option<String>,
    pub fragment_shader: Option<String>,
    /// Number of successful builds.
    pub builds: u32,
}

/// One executed draw call.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub program: ProgramId,
    pub vertex_array: Option<VertexArrayId>,
    pub textures: Vec<(String, TextureId)>,
    pub texture_revision: u64,
    pub topology: Topology,
    pub items: u32,
    pub blend: Option<BlendState>,
    /// Program uniforms (declaration order) at the time of the draw.
    pub uniforms: Vec<(String, Option<UniformValue>)>,
    /// Whether the draw happened inside a 2D scope.
    pub in_draw_2d: bool,
}

impl RunRecord {
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.iter().find(|(n, _)| n == name).and_then(|(_, v)| *v)
    }
}

#[derive(Debug, Default)]
struct VertexArrayRecord {
    buffers: Vec<(u32, Vec<u8>)>,
    attributes: Vec<VertexAttribute>,
}

#[derive(Debug)]
pub struct RecordingGpu {
    id: ContextId,
    next_handle: u32,

    programs: HashMap<ProgramId, ProgramRecord>,
    uniform_values: HashMap<UniformId, UniformValue>,
    uniform_sets: u64,
    vertex_arrays: HashMap<VertexArrayId, VertexArrayRecord>,
    textures: HashMap<TextureId, (u32, u32)>,
    texture_writes: u64,
    failing_shaders: HashSet<String>,

    blend: Option<BlendState>,
    blend_history: Vec<Option<BlendState>>,

    in_draw_2d: bool,
    draw_2d_scopes: u32,
    runs: Vec<RunRecord>,
}

impl RecordingGpu {
    pub fn new(id: ContextId) -> Self {
        Self {
            id,
            next_handle: 1,
            programs: HashMap::new(),
            uniform_values: HashMap::new(),
            uniform_sets: 0,
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            texture_writes: 0,
            failing_shaders: HashSet::new(),
            blend: None,
            blend_history: Vec::new(),
            in_draw_2d: false,
            draw_2d_scopes: 0,
            runs: Vec::new(),
        }
    }

    /// Makes every later build of a program using `path` fail.
    pub fn fail_shader(&mut self, path: impl Into<String>) {
        self.failing_shaders.insert(path.into());
    }

    pub fn clear_failures(&mut self) {
        self.failing_shaders.clear();
    }

    pub fn program(&self, program: ProgramId) -> Option<&ProgramRecord> {
        self.programs.get(&program)
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn uniform_value(&self, uniform: UniformId) -> Option<UniformValue> {
        self.uniform_values.get(&uniform).copied()
    }

    /// Total number of `set_uniform` calls.
    pub fn uniform_sets(&self) -> u64 {
        self.uniform_sets
    }

    pub fn vertex_array_count(&self) -> usize {
        self.vertex_arrays.len()
    }

    /// Raw bytes uploaded to buffer `slot` of `array`.
    pub fn vertex_data(&self, array: VertexArrayId, slot: u32) -> Option<&[u8]> {
        let va = self.vertex_arrays.get(&array)?;
        va.buffers.iter().find(|(s, _)| *s == slot).map(|(_, d)| d.as_slice())
    }

    pub fn vertex_attributes(&self, array: VertexArrayId) -> &[VertexAttribute] {
        self.vertex_arrays
            .get(&array)
            .map_or(&[], |va| va.attributes.as_slice())
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture).copied()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn texture_writes(&self) -> u64 {
        self.texture_writes
    }

    pub fn blend(&self) -> Option<BlendState> {
        self.blend
    }

    pub fn blend_history(&self) -> &[Option<BlendState>] {
        &self.blend_history
    }

    pub fn draw_2d_scopes(&self) -> u32 {
        self.draw_2d_scopes
    }

    pub fn in_draw_2d(&self) -> bool {
        self.in_draw_2d
    }

    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    /// Forgets recorded draws and blend history; resources are kept.
    pub fn clear_frame(&mut self) {
        self.runs.clear();
        self.blend_history.clear();
    }

    fn next<T>(&mut self, wrap: fn(u32) -> T) -> T {
        let raw = self.next_handle;
        self.next_handle += 1;
        wrap(raw)
    }
}

impl GpuContext for RecordingGpu {
    fn id(&self) -> ContextId {
        self.id
    }

    fn create_program(&mut self) -> ProgramId {
        let id = self.next(ProgramId::from_raw);
        self.programs.insert(id, ProgramRecord::default());
        log::trace!("RecordingGpu {}: program {}", self.id, id.raw());
        id
    }

    fn add_uniform(&mut self, program: ProgramId, name: &str) -> UniformId {
        let id = self.next(UniformId::from_raw);
        if let Some(p) = self.programs.get_mut(&program) {
            p.uniforms.push((name.to_string(), id));
        }
        id
    }

    fn set_shader(&mut self, program: ProgramId, stage: ShaderStage, path: &str) {
        let Some(p) = self.programs.get_mut(&program) else { return };
        let slot = match stage {
            ShaderStage::Vertex => &mut p.vertex_shader,
            ShaderStage::Fragment => &mut p.fragment_shader,
        };
        *slot = Some(path.to_string());
    }

    fn build_program(&mut self, program: ProgramId) -> Result<(), GpuError> {
        let failing = &self.failing_shaders;
        let p = self.programs.get_mut(&program).ok_or(GpuError::UnknownHandle {
            kind: "program",
            raw: program.raw(),
        })?;

        for (stage, path) in [
            (ShaderStage::Vertex, &p.vertex_shader),
            (ShaderStage::Fragment, &p.fragment_shader),
        ] {
            if let Some(path) = path.as_ref().filter(|path| failing.contains(*path)) {
                return Err(GpuError::Compile {
                    stage,
                    path: path.clone(),
                    message: "marked failing".to_string(),
                });
            }
        }

        p.builds += 1;
        Ok(())
    }

    fn set_uniform(&mut self, uniform: UniformId, value: UniformValue) {
        self.uniform_sets += 1;
        self.uniform_values.insert(uniform, value);
    }

    fn create_vertex_array(&mut self) -> VertexArrayId {
        let id = self.next(VertexArrayId::from_raw);
        self.vertex_arrays.insert(id, VertexArrayRecord::default());
        id
    }

    fn add_vertex_buffer(&mut self, array: VertexArrayId, slot: u32, data: &[u8]) {
        if let Some(va) = self.vertex_arrays.get_mut(&array) {
            va.buffers.push((slot, data.to_vec()));
        }
    }

    fn add_attribute(&mut self, array: VertexArrayId, attribute: VertexAttribute) {
        if let Some(va) = self.vertex_arrays.get_mut(&array) {
            va.attributes.push(attribute);
        }
    }

    fn set_blend(&mut self, blend: Option<BlendState>) {
        self.blend = blend;
        self.blend_history.push(blend);
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId, GpuError> {
        let expected = rgba_len(width, height);
        if rgba.len() != expected {
            return Err(GpuError::TextureSize { expected, actual: rgba.len() });
        }
        let id = self.next(TextureId::from_raw);
        self.textures.insert(id, (width, height));
        Ok(id)
    }

    fn write_texture(&mut self, texture: TextureId, rgba: &[u8]) -> Result<(), GpuError> {
        let (w, h) = self.texture_size(texture).ok_or(GpuError::UnknownHandle {
            kind: "texture",
            raw: texture.raw(),
        })?;
        let expected = rgba_len(w, h);
        if rgba.len() != expected {
            return Err(GpuError::TextureSize { expected, actual: rgba.len() });
        }
        self.texture_writes += 1;
        Ok(())
    }

    fn begin_draw_2d(&mut self, _dc: &DrawContext) {
        self.in_draw_2d = true;
        self.draw_2d_scopes += 1;
    }

    fn end_draw(&mut self) {
        self.in_draw_2d = false;
    }

    fn run(&mut self, call: &DrawCall) {
        let uniforms = self
            .programs
            .get(&call.program())
            .map(|p| {
                p.uniforms
                    .iter()
                    .map(|(name, id)| (name.clone(), self.uniform_values.get(id).copied()))
                    .collect()
            })
            .unwrap_or_default();

        self.runs.push(RunRecord {
            program: call.program(),
            vertex_array: call.vertex_array(),
            textures: call.textures().to_vec(),
            texture_revision: call.texture_revision(),
            topology: call.topology,
            items: call.items,
            blend: self.blend,
            uniforms,
            in_draw_2d: self.in_draw_2d,
        });
    }
}
