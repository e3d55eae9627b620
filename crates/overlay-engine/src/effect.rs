//! Overlay effects: a shader program per GPU context plus a blend mode.

use glam::Mat4;

use crate::context::{ContextId, PerContext};
use crate::error::OverlayError;
use crate::gpu::{
    BlendFactor, BlendState, GpuContext, ProgramId, ShaderStage, UniformId, UniformValue,
};
use crate::pass::DrawContext;

/// Uniform names declared on every effect program, in layout order.
pub const PROJECTION_UNIFORM: &str = "projection";
pub const TRANSFORM_UNIFORM: &str = "transform";
pub const ALPHA_UNIFORM: &str = "alpha";

/// How overlay fragments combine with what is already in the target.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum BlendMode {
    /// Fragments overwrite the target.
    Disabled,
    /// Standard alpha blending (`src * a + dst * (1 - a)`).
    #[default]
    Modulate,
    /// Alpha-weighted accumulation (`src * a + dst`).
    Additive,
}

impl BlendMode {
    /// GPU blend state for this mode; `None` disables blending.
    pub fn blend_state(self) -> Option<BlendState> {
        match self {
            BlendMode::Disabled => None,
            BlendMode::Modulate => Some(BlendState {
                src: BlendFactor::SrcAlpha,
                dst: BlendFactor::OneMinusSrcAlpha,
            }),
            BlendMode::Additive => Some(BlendState {
                src: BlendFactor::SrcAlpha,
                dst: BlendFactor::One,
            }),
        }
    }
}

#[derive(Debug)]
struct EffectGpu {
    program: ProgramId,
    projection: UniformId,
    transform: UniformId,
    alpha: UniformId,
    /// Source revision of the last successful build on this context.
    built_revision: u64,
}

/// Shader program + blend configuration shared by any number of overlays.
///
/// Programs are created lazily per context by [`prepare`](Self::prepare) and
/// rebuilt on each context after [`set_shaders`](Self::set_shaders).
#[derive(Debug, Default)]
pub struct Effect {
    vertex_shader: String,
    fragment_shader: String,
    /// Bumped by `set_shaders`; a context is dirty while its built revision lags.
    revision: u64,
    blend: BlendMode,
    gpu: PerContext<EffectGpu>,
}

impl Effect {
    /// Effect without shader sources. Its program is created but never built
    /// until sources are set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shaders(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        let mut fx = Self::new();
        fx.set_shaders(vertex, fragment);
        fx
    }

    /// Replaces both shader source paths. An empty path leaves that stage untouched.
    pub fn set_shaders(&mut self, vertex: impl Into<String>, fragment: impl Into<String>) {
        self.vertex_shader = vertex.into();
        self.fragment_shader = fragment.into();
        self.revision += 1;
    }

    pub fn vertex_shader(&self) -> &str {
        &self.vertex_shader
    }

    pub fn fragment_shader(&self) -> &str {
        &self.fragment_shader
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend
    }

    /// Program on `context`, once [`prepare`](Self::prepare) has run there.
    pub fn program(&self, context: ContextId) -> Option<ProgramId> {
        self.gpu.get(context).map(|g| g.program)
    }

    /// Whether `context` still needs a (re)build.
    pub fn is_dirty(&self, context: ContextId) -> bool {
        self.gpu
            .get(context)
            .is_none_or(|g| g.built_revision != self.revision)
    }

    /// Frame time of the last successful build on `context` (`0.0` if none).
    pub fn last_built(&self, context: ContextId) -> f64 {
        self.gpu.slot(context).stamp()
    }

    /// Readies the effect for this frame on `dc.context`.
    ///
    /// Creates the program on first use, rebuilds it when sources changed,
    /// uploads the projection and applies the blend state. A build failure
    /// leaves the context dirty and is returned to the caller.
    pub fn prepare(&mut self, gpu: &mut dyn GpuContext, dc: &DrawContext) -> Result<(), OverlayError> {
        let slot = self.gpu.slot_mut(dc.context);
        let state = slot.get_or_insert_with(|| {
            let program = gpu.create_program();
            log::debug!("effect program {} created on context {}", program.raw(), dc.context);
            EffectGpu {
                program,
                projection: gpu.add_uniform(program, PROJECTION_UNIFORM),
                transform: gpu.add_uniform(program, TRANSFORM_UNIFORM),
                alpha: gpu.add_uniform(program, ALPHA_UNIFORM),
                built_revision: 0,
            }
        });

        if state.built_revision != self.revision {
            if !self.vertex_shader.is_empty() {
                gpu.set_shader(state.program, ShaderStage::Vertex, &self.vertex_shader);
            }
            if !self.fragment_shader.is_empty() {
                gpu.set_shader(state.program, ShaderStage::Fragment, &self.fragment_shader);
            }

            gpu.build_program(state.program)
                .map_err(|source| OverlayError::ShaderBuild {
                    context: dc.context,
                    vertex: self.vertex_shader.clone(),
                    fragment: self.fragment_shader.clone(),
                    source,
                })?;

            state.built_revision = self.revision;
            slot.set_stamp(dc.time);
            log::debug!(
                "effect built on context {} ({}, {})",
                dc.context,
                self.vertex_shader,
                self.fragment_shader
            );
        }

        let Some(state) = self.gpu.get(dc.context) else { return Ok(()) };
        gpu.set_uniform(state.projection, UniformValue::Mat4(dc.ortho));
        gpu.set_blend(self.blend.blend_state());
        Ok(())
    }

    pub(crate) fn set_transform(&self, gpu: &mut dyn GpuContext, context: ContextId, transform: Mat4) {
        if let Some(state) = self.gpu.get(context) {
            gpu.set_uniform(state.transform, UniformValue::Mat4(transform));
        }
    }

    pub(crate) fn set_alpha(&self, gpu: &mut dyn GpuContext, context: ContextId, alpha: f32) {
        if let Some(state) = self.gpu.get(context) {
            gpu.set_uniform(state.alpha, UniformValue::Float(alpha));
        }
    }

    /// Forgets the program held for `context`; the next `prepare` there starts over.
    pub fn release(&mut self, context: ContextId) {
        self.gpu.release(context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Viewport;
    use crate::gpu::RecordingGpu;

    fn dc(context: ContextId, time: f64) -> DrawContext {
        DrawContext::overlay(context, Viewport::new(320.0, 200.0), time)
    }

    #[test]
    fn first_prepare_creates_program_with_three_uniforms() {
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);
        let mut fx = Effect::with_shaders("fx.vert", "fx.frag");

        fx.prepare(&mut gpu, &dc(ContextId::PRIMARY, 0.5)).unwrap();

        let program = fx.program(ContextId::PRIMARY).unwrap();
        let record = gpu.program(program).unwrap();
        let names: Vec<&str> = record.uniforms.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["projection", "transform", "alpha"]);
        assert_eq!(record.vertex_shader.as_deref(), Some("fx.vert"));
        assert_eq!(record.fragment_shader.as_deref(), Some("fx.frag"));
        assert_eq!(record.builds, 1);
        assert_eq!(fx.last_built(ContextId::PRIMARY), 0.5);
    }

    #[test]
    fn unchanged_sources_do_not_rebuild() {
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);
        let mut fx = Effect::with_shaders("fx.vert", "fx.frag");

        fx.prepare(&mut gpu, &dc(ContextId::PRIMARY, 0.0)).unwrap();
        fx.prepare(&mut gpu, &dc(ContextId::PRIMARY, 1.0)).unwrap();

        let program = fx.program(ContextId::PRIMARY).unwrap();
        assert_eq!(gpu.program(program).unwrap().builds, 1);
        assert_eq!(gpu.program_count(), 1);
        assert!(!fx.is_dirty(ContextId::PRIMARY));
    }

    #[test]
    fn set_shaders_triggers_rebuild_on_same_program() {
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);
        let mut fx = Effect::with_shaders("a.vert", "a.frag");
        fx.prepare(&mut gpu, &dc(ContextId::PRIMARY, 0.0)).unwrap();
        let program = fx.program(ContextId::PRIMARY).unwrap();

        fx.set_shaders("b.vert", "b.frag");
        assert!(fx.is_dirty(ContextId::PRIMARY));
        fx.prepare(&mut gpu, &dc(ContextId::PRIMARY, 2.0)).unwrap();

        assert_eq!(fx.program(ContextId::PRIMARY), Some(program));
        let record = gpu.program(program).unwrap();
        assert_eq!(record.builds, 2);
        assert_eq!(record.vertex_shader.as_deref(), Some("b.vert"));
        assert_eq!(fx.last_built(ContextId::PRIMARY), 2.0);
    }

    #[test]
    fn empty_paths_are_skipped() {
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);
        let mut fx = Effect::with_shaders("", "only.frag");
        fx.prepare(&mut gpu, &dc(ContextId::PRIMARY, 0.0)).unwrap();

        let record = gpu.program(fx.program(ContextId::PRIMARY).unwrap()).unwrap();
        assert_eq!(record.vertex_shader, None);
        assert_eq!(record.fragment_shader.as_deref(), Some("only.frag"));
    }

    #[test]
    fn effect_without_sources_is_never_built() {
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);
        let mut fx = Effect::new();
        fx.prepare(&mut gpu, &dc(ContextId::PRIMARY, 0.0)).unwrap();

        let record = gpu.program(fx.program(ContextId::PRIMARY).unwrap()).unwrap();
        assert_eq!(record.builds, 0);
    }

    #[test]
    fn build_failure_is_reported_and_retried() {
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);
        gpu.fail_shader("bad.vert");
        let mut fx = Effect::with_shaders("bad.vert", "ok.frag");

        let err = fx.prepare(&mut gpu, &dc(ContextId::PRIMARY, 0.0)).unwrap_err();
        let OverlayError::ShaderBuild { context, vertex, .. } = err;
        assert_eq!(context, ContextId::PRIMARY);
        assert_eq!(vertex, "bad.vert");
        assert!(fx.is_dirty(ContextId::PRIMARY));

        gpu.clear_failures();
        fx.prepare(&mut gpu, &dc(ContextId::PRIMARY, 1.0)).unwrap();
        assert!(!fx.is_dirty(ContextId::PRIMARY));
    }

    #[test]
    fn projection_is_uploaded_every_frame() {
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);
        let mut fx = Effect::with_shaders("fx.vert", "fx.frag");

        fx.prepare(&mut gpu, &dc(ContextId::PRIMARY, 0.0)).unwrap();
        let after_first = gpu.uniform_sets();
        let mut resized = dc(ContextId::PRIMARY, 1.0);
        resized.ortho = Viewport::new(1024.0, 768.0).ortho();
        fx.prepare(&mut gpu, &resized).unwrap();

        assert_eq!(gpu.uniform_sets(), after_first + 1);
        let program = fx.program(ContextId::PRIMARY).unwrap();
        let (_, projection) = gpu.program(program).unwrap().uniforms[0].clone();
        assert_eq!(gpu.uniform_value(projection), Some(UniformValue::Mat4(resized.ortho)));
    }

    #[test]
    fn blend_modes_are_distinct() {
        let states = [BlendMode::Disabled, BlendMode::Modulate, BlendMode::Additive]
            .map(BlendMode::blend_state);
        assert_eq!(states[0], None);
        assert_ne!(states[1], states[2]);
        assert!(states[1].is_some() && states[2].is_some());
    }

    #[test]
    fn prepare_applies_blend_state() {
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);
        let mut fx = Effect::with_shaders("fx.vert", "fx.frag");
        for mode in [BlendMode::Disabled, BlendMode::Modulate, BlendMode::Additive] {
            fx.set_blend_mode(mode);
            fx.prepare(&mut gpu, &dc(ContextId::PRIMARY, 0.0)).unwrap();
            assert_eq!(gpu.blend(), mode.blend_state());
        }
    }

    #[test]
    fn contexts_build_independently() {
        let second = ContextId::new(1).unwrap();
        let mut gpu_a = RecordingGpu::new(ContextId::PRIMARY);
        let mut gpu_b = RecordingGpu::new(second);
        let mut fx = Effect::with_shaders("fx.vert", "fx.frag");

        fx.prepare(&mut gpu_a, &dc(ContextId::PRIMARY, 0.0)).unwrap();
        assert!(fx.is_dirty(second));

        fx.prepare(&mut gpu_b, &dc(second, 0.0)).unwrap();
        assert!(!fx.is_dirty(second));
        assert_eq!(gpu_b.program_count(), 1);
    }

    #[test]
    fn release_forgets_context_program() {
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);
        let mut fx = Effect::with_shaders("fx.vert", "fx.frag");
        fx.prepare(&mut gpu, &dc(ContextId::PRIMARY, 0.0)).unwrap();

        fx.release(ContextId::PRIMARY);
        assert!(fx.program(ContextId::PRIMARY).is_none());

        fx.prepare(&mut gpu, &dc(ContextId::PRIMARY, 1.0)).unwrap();
        assert_eq!(gpu.program_count(), 2);
    }
}
