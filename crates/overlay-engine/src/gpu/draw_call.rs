use super::{ProgramId, TextureId, VertexArrayId};

/// Primitive assembly for a draw call.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Topology {
    #[default]
    Triangles,
    TriangleStrip,
}

/// Everything needed for one GPU draw: program, vertex source, named texture
/// bindings and topology.
///
/// `texture_revision` advances whenever the texture bindings change, so a
/// backend can tell a rebind from a repeat of the previous frame.
#[derive(Debug, Clone)]
pub struct DrawCall {
    program: ProgramId,
    vertex_array: Option<VertexArrayId>,
    textures: Vec<(String, TextureId)>,
    texture_revision: u64,
    pub topology: Topology,
    /// Number of vertices to draw.
    pub items: u32,
}

impl DrawCall {
    pub fn new(program: ProgramId) -> Self {
        Self {
            program,
            vertex_array: None,
            textures: Vec::new(),
            texture_revision: 0,
            topology: Topology::default(),
            items: 0,
        }
    }

    #[inline]
    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn set_program(&mut self, program: ProgramId) {
        self.program = program;
    }

    #[inline]
    pub fn vertex_array(&self) -> Option<VertexArrayId> {
        self.vertex_array
    }

    pub fn set_vertex_array(&mut self, array: VertexArrayId) {
        self.vertex_array = Some(array);
    }

    pub fn textures(&self) -> &[(String, TextureId)] {
        &self.textures
    }

    /// Texture bound under `name`, if any.
    pub fn texture(&self, name: &str) -> Option<TextureId> {
        self.textures.iter().find(|(n, _)| n == name).map(|(_, t)| *t)
    }

    pub fn clear_textures(&mut self) {
        self.textures.clear();
        self.texture_revision += 1;
    }

    pub fn add_texture(&mut self, name: impl Into<String>, texture: TextureId) {
        self.textures.push((name.into(), texture));
        self.texture_revision += 1;
    }

    #[inline]
    pub fn texture_revision(&self) -> u64 {
        self.texture_revision
    }
}
