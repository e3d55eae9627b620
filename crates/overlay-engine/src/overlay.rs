//! Overlays: positioned, sized, textured quads drawn with an [`Effect`](crate::effect::Effect).

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use glam::{Mat4, Quat, Vec3};

use crate::context::{ContextId, PerContext};
use crate::coords::Vec2;
use crate::gpu::{
    DrawCall, GpuContext, ProgramId, TextureId, Topology, VertexArrayId, VertexAttribute,
};
use crate::pass::DrawContext;
use crate::registry::SharedEffect;
use crate::texture::{SharedTextureSource, TextureSource};

/// Texture binding name used by overlay draw calls.
pub const IMAGE_BINDING: &str = "image";

/// Unit quad as a triangle strip, interleaved `x, y, u, v`.
pub(crate) const QUAD_VERTICES: [[f32; 4]; 4] = [
    [0.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 1.0],
    [1.0, 0.0, 1.0, 0.0],
    [1.0, 1.0, 1.0, 1.0],
];

const QUAD_ATTRIBUTE: VertexAttribute = VertexAttribute {
    buffer: 0,
    location: 0,
    name: "vertex",
    components: 4,
    normalized: false,
    stride: 0,
    offset: 0,
};

#[derive(Debug)]
struct OverlayGpu {
    vertex_array: VertexArrayId,
    draw_call: DrawCall,
    /// Texture currently bound to `draw_call`, to skip redundant rebinds.
    bound_texture: Option<TextureId>,
    /// Every source that handed out a texture here, attached or not.
    sources: Vec<Weak<RefCell<dyn TextureSource>>>,
}

impl OverlayGpu {
    fn remember(&mut self, source: &SharedTextureSource) {
        self.sources.retain(|s| s.strong_count() > 0);
        let weak = Rc::downgrade(source);
        if !self.sources.iter().any(|s| s.ptr_eq(&weak)) {
            self.sources.push(weak);
        }
    }
}

/// A textured 2D quad.
///
/// The quad's bottom-left corner sits at `position` and it extends by `size`.
/// With autosize on, `size` follows the texture's pixel dimensions every frame,
/// overriding any explicit size.
pub struct Overlay {
    position: Vec2,
    size: Vec2,
    alpha: f32,
    autosize: bool,
    effect: SharedEffect,
    texture: Option<SharedTextureSource>,
    gpu: PerContext<OverlayGpu>,
}

impl Overlay {
    pub fn new(effect: SharedEffect) -> Self {
        Self {
            position: Vec2::zero(),
            size: Vec2::splat(1.0),
            alpha: 1.0,
            autosize: false,
            effect,
            texture: None,
            gpu: PerContext::new(),
        }
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        self.position = Vec2::new(x, y);
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn set_size(&mut self, width: f32, height: f32) {
        self.size = Vec2::new(width, height);
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha;
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn set_autosize(&mut self, enabled: bool) {
        self.autosize = enabled;
    }

    pub fn autosize(&self) -> bool {
        self.autosize
    }

    pub fn set_effect(&mut self, effect: SharedEffect) {
        self.effect = effect;
    }

    pub fn effect(&self) -> &SharedEffect {
        &self.effect
    }

    /// Attaches a texture source. `None` detaches it; draw calls keep their
    /// last binding.
    pub fn set_texture(&mut self, texture: Option<SharedTextureSource>) {
        self.texture = texture;
    }

    pub fn texture(&self) -> Option<&SharedTextureSource> {
        self.texture.as_ref()
    }

    /// Model transform: translate `(x, y, 0)`, no rotation, scale `(w, h, 1)`.
    pub fn transform(&self) -> Mat4 {
        model_transform(self.position, self.size)
    }

    /// Texture bound on `context` by the last draw there.
    pub fn bound_texture(&self, context: ContextId) -> Option<TextureId> {
        self.gpu.get(context).and_then(|g| g.bound_texture)
    }

    /// Quad vertex array on `context`, once drawn there.
    pub fn vertex_array(&self, context: ContextId) -> Option<VertexArrayId> {
        self.gpu.get(context).map(|g| g.vertex_array)
    }

    /// Frame time of the last draw on `context` (`0.0` if never drawn).
    pub fn last_drawn(&self, context: ContextId) -> f64 {
        self.gpu.slot(context).stamp()
    }

    /// Draws the quad on `dc.context`. Expects the effect to be prepared on
    /// that context; otherwise the draw is skipped.
    pub fn draw(&mut self, gpu: &mut dyn GpuContext, dc: &DrawContext) {
        let effect = self.effect.borrow();
        let Some(program) = effect.program(dc.context) else {
            log::debug!("overlay skipped: effect not prepared on context {}", dc.context);
            return;
        };

        let slot = self.gpu.slot_mut(dc.context);
        let state = slot.get_or_insert_with(|| build_quad(gpu, program));
        if state.draw_call.program() != program {
            state.draw_call.set_program(program);
        }

        if let Some(shared) = &self.texture {
            let mut source = shared.borrow_mut();
            if let Some(texture) = source.texture(gpu, dc) {
                state.remember(shared);
                if state.bound_texture != Some(texture) {
                    log::trace!("overlay rebinding texture {} on context {}", texture.raw(), dc.context);
                    state.bound_texture = Some(texture);
                    state.draw_call.clear_textures();
                    state.draw_call.add_texture(IMAGE_BINDING, texture);
                }
            }

            if self.autosize {
                self.size = Vec2::new(source.width() as f32, source.height() as f32);
            }
        }

        effect.set_transform(gpu, dc.context, model_transform(self.position, self.size));
        effect.set_alpha(gpu, dc.context, self.alpha);

        state.draw_call.items = 4;
        gpu.run(&state.draw_call);
        slot.set_stamp(dc.time);
    }

    /// Forgets the quad and draw call held for `context`, and releases every
    /// texture source this overlay has drawn there, including detached ones.
    pub fn release(&mut self, context: ContextId) {
        let Some(state) = self.gpu.release(context) else { return };
        for source in state.sources.iter().filter_map(Weak::upgrade) {
            match source.try_borrow_mut() {
                Ok(mut source) => source.release(context),
                Err(_) => log::warn!("texture source busy, not released on context {context}"),
            }
        }
    }
}

fn model_transform(position: Vec2, size: Vec2) -> Mat4 {
    Mat4::from_scale_rotation_translation(
        Vec3::new(size.x, size.y, 1.0),
        Quat::IDENTITY,
        position.extend(0.0),
    )
}

fn build_quad(gpu: &mut dyn GpuContext, program: ProgramId) -> OverlayGpu {
    let vertex_array = gpu.create_vertex_array();
    gpu.add_vertex_buffer(vertex_array, 0, bytemuck::cast_slice(&QUAD_VERTICES));
    gpu.add_attribute(vertex_array, QUAD_ATTRIBUTE);

    let mut draw_call = DrawCall::new(program);
    draw_call.set_vertex_array(vertex_array);
    draw_call.topology = Topology::TriangleStrip;

    log::debug!("overlay quad created on context {}", gpu.id());
    OverlayGpu {
        vertex_array,
        draw_call,
        bound_texture: None,
        sources: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Viewport;
    use crate::effect::Effect;
    use crate::gpu::{RecordingGpu, UniformValue};
    use crate::texture::PixelTexture;

    struct Fixture {
        gpu: RecordingGpu,
        effect: SharedEffect,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                gpu: RecordingGpu::new(ContextId::PRIMARY),
                effect: Rc::new(RefCell::new(Effect::with_shaders("fx.vert", "fx.frag"))),
            }
        }

        fn frame(&mut self, overlay: &mut Overlay, time: f64) {
            let dc = DrawContext::overlay(ContextId::PRIMARY, Viewport::new(800.0, 600.0), time);
            self.effect.borrow_mut().prepare(&mut self.gpu, &dc).unwrap();
            overlay.draw(&mut self.gpu, &dc);
        }
    }

    fn pixels(width: u32, height: u32) -> Rc<RefCell<PixelTexture>> {
        Rc::new(RefCell::new(PixelTexture::solid(width, height, [255, 0, 0, 255])))
    }

    #[test]
    fn defaults() {
        let fx = Fixture::new();
        let overlay = Overlay::new(fx.effect.clone());
        assert_eq!(overlay.position(), Vec2::zero());
        assert_eq!(overlay.size(), Vec2::new(1.0, 1.0));
        assert_eq!(overlay.alpha(), 1.0);
        assert!(!overlay.autosize());
        assert!(overlay.texture().is_none());
    }

    #[test]
    fn transform_places_quad_at_position_with_size() {
        let fx = Fixture::new();
        let mut overlay = Overlay::new(fx.effect.clone());
        overlay.set_position(40.0, 30.0);
        overlay.set_size(200.0, 100.0);

        let m = overlay.transform();
        assert_eq!(m.transform_point3(Vec3::ZERO), Vec3::new(40.0, 30.0, 0.0));
        assert_eq!(m.transform_point3(Vec3::new(1.0, 1.0, 0.0)), Vec3::new(240.0, 130.0, 0.0));
    }

    #[test]
    fn first_draw_builds_unit_quad_strip() {
        let mut fx = Fixture::new();
        let mut overlay = Overlay::new(fx.effect.clone());
        fx.frame(&mut overlay, 0.0);
        fx.frame(&mut overlay, 1.0);

        assert_eq!(fx.gpu.vertex_array_count(), 1);
        let va = overlay.vertex_array(ContextId::PRIMARY).unwrap();
        let data: Vec<f32> = fx
            .gpu
            .vertex_data(va, 0)
            .unwrap()
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(data.len(), 16);
        assert_eq!(&data[12..], &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(fx.gpu.vertex_attributes(va), &[QUAD_ATTRIBUTE]);

        let run = &fx.gpu.runs()[1];
        assert_eq!(run.topology, Topology::TriangleStrip);
        assert_eq!(run.items, 4);
        assert_eq!(run.vertex_array, Some(va));
        assert_eq!(Some(run.program), fx.effect.borrow().program(ContextId::PRIMARY));
        assert_eq!(overlay.last_drawn(ContextId::PRIMARY), 1.0);
    }

    #[test]
    fn transform_and_alpha_are_pushed_per_draw() {
        let mut fx = Fixture::new();
        let mut overlay = Overlay::new(fx.effect.clone());
        overlay.set_position(5.0, 6.0);
        overlay.set_size(10.0, 20.0);
        overlay.set_alpha(0.5);
        fx.frame(&mut overlay, 0.0);

        let run = &fx.gpu.runs()[0];
        assert_eq!(run.uniform("transform"), Some(UniformValue::Mat4(overlay.transform())));
        assert_eq!(run.uniform("alpha"), Some(UniformValue::Float(0.5)));
    }

    #[test]
    fn autosize_follows_texture_dimensions() {
        let mut fx = Fixture::new();
        let texture = pixels(64, 32);
        let mut overlay = Overlay::new(fx.effect.clone());
        overlay.set_size(500.0, 500.0);
        overlay.set_autosize(true);
        overlay.set_texture(Some(texture.clone()));

        fx.frame(&mut overlay, 0.0);
        assert_eq!(overlay.size(), Vec2::new(64.0, 32.0));

        texture.borrow_mut().set_pixels(16, 8, vec![0; 16 * 8 * 4]).unwrap();
        fx.frame(&mut overlay, 1.0);
        assert_eq!(overlay.size(), Vec2::new(16.0, 8.0));
    }

    #[test]
    fn explicit_size_is_kept_without_autosize() {
        let mut fx = Fixture::new();
        let mut overlay = Overlay::new(fx.effect.clone());
        overlay.set_size(500.0, 250.0);
        overlay.set_texture(Some(pixels(64, 32)));

        fx.frame(&mut overlay, 0.0);
        assert_eq!(overlay.size(), Vec2::new(500.0, 250.0));
    }

    #[test]
    fn stable_texture_is_not_rebound() {
        let mut fx = Fixture::new();
        let mut overlay = Overlay::new(fx.effect.clone());
        overlay.set_texture(Some(pixels(4, 4)));

        fx.frame(&mut overlay, 0.0);
        fx.frame(&mut overlay, 1.0);

        let runs = fx.gpu.runs();
        assert_eq!(runs[0].texture_revision, runs[1].texture_revision);
        assert_eq!(runs[1].textures.len(), 1);
        assert_eq!(runs[1].textures[0].0, IMAGE_BINDING);
        assert_eq!(overlay.bound_texture(ContextId::PRIMARY), Some(runs[1].textures[0].1));
    }

    #[test]
    fn changed_texture_is_rebound() {
        let mut fx = Fixture::new();
        let mut overlay = Overlay::new(fx.effect.clone());
        overlay.set_texture(Some(pixels(4, 4)));
        fx.frame(&mut overlay, 0.0);

        overlay.set_texture(Some(pixels(4, 4)));
        fx.frame(&mut overlay, 1.0);

        let runs = fx.gpu.runs();
        assert_ne!(runs[0].texture_revision, runs[1].texture_revision);
        assert_ne!(runs[0].textures[0].1, runs[1].textures[0].1);
        assert_eq!(runs[1].textures.len(), 1);
    }

    #[test]
    fn untextured_overlay_draws_with_current_binding() {
        let mut fx = Fixture::new();
        let mut overlay = Overlay::new(fx.effect.clone());
        fx.frame(&mut overlay, 0.0);
        assert!(fx.gpu.runs()[0].textures.is_empty());

        overlay.set_texture(Some(pixels(2, 2)));
        fx.frame(&mut overlay, 1.0);
        overlay.set_texture(None);
        fx.frame(&mut overlay, 2.0);

        let runs = fx.gpu.runs();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[2].textures, runs[1].textures);
    }

    #[test]
    fn unprepared_effect_skips_draw() {
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);
        let effect = Rc::new(RefCell::new(Effect::with_shaders("fx.vert", "fx.frag")));
        let mut overlay = Overlay::new(effect);
        let dc = DrawContext::overlay(ContextId::PRIMARY, Viewport::new(10.0, 10.0), 0.0);

        overlay.draw(&mut gpu, &dc);

        assert!(gpu.runs().is_empty());
        assert_eq!(gpu.vertex_array_count(), 0);
    }

    #[test]
    fn switching_effect_retargets_draw_call() {
        let mut fx = Fixture::new();
        let mut overlay = Overlay::new(fx.effect.clone());
        fx.frame(&mut overlay, 0.0);

        fx.effect = Rc::new(RefCell::new(Effect::with_shaders("glow.vert", "glow.frag")));
        overlay.set_effect(fx.effect.clone());
        fx.frame(&mut overlay, 1.0);

        let runs = fx.gpu.runs();
        assert_ne!(runs[0].program, runs[1].program);
        assert_eq!(Some(runs[1].program), fx.effect.borrow().program(ContextId::PRIMARY));
    }

    #[test]
    fn release_rebuilds_quad_on_next_draw() {
        let mut fx = Fixture::new();
        let mut overlay = Overlay::new(fx.effect.clone());
        fx.frame(&mut overlay, 0.0);

        overlay.release(ContextId::PRIMARY);
        assert!(overlay.vertex_array(ContextId::PRIMARY).is_none());
        assert_eq!(overlay.last_drawn(ContextId::PRIMARY), 0.0);

        fx.frame(&mut overlay, 1.0);
        assert_eq!(fx.gpu.vertex_array_count(), 2);
    }

    #[test]
    fn release_reaches_detached_texture_sources() {
        let mut fx = Fixture::new();
        let texture = pixels(4, 4);
        let mut overlay = Overlay::new(fx.effect.clone());
        overlay.set_texture(Some(texture.clone()));
        fx.frame(&mut overlay, 0.0);
        overlay.set_texture(None);

        overlay.release(ContextId::PRIMARY);
        overlay.set_texture(Some(texture.clone()));
        fx.frame(&mut overlay, 1.0);

        assert_eq!(fx.gpu.texture_count(), 2);
    }
}
