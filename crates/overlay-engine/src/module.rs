//! Overlay module: owns the registry and the default effect, and installs the
//! overlay render pass into the host's pass list.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::ContextId;
use crate::effect::{BlendMode, Effect};
use crate::overlay::Overlay;
use crate::pass::{OverlayRenderPass, RenderPasses};
use crate::registry::{OverlayRegistry, SharedEffect, SharedOverlay};

/// Overlay module configuration.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Vertex shader path of the default effect.
    pub default_vertex_shader: String,
    /// Fragment shader path of the default effect.
    pub default_fragment_shader: String,
    pub default_blend: BlendMode,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            default_vertex_shader: "overlay/overlay.vert".to_string(),
            default_fragment_shader: "overlay/overlay.frag".to_string(),
            default_blend: BlendMode::Modulate,
        }
    }
}

/// Entry point for hosts and scripts.
///
/// Effects and overlays created here are registered on construction and
/// drawn by the pass from [`initialize_renderer`](Self::initialize_renderer)
/// until destroyed or dropped by their last owner.
pub struct OverlayModule {
    registry: Rc<RefCell<OverlayRegistry>>,
    default_effect: SharedEffect,
}

impl Default for OverlayModule {
    fn default() -> Self {
        Self::new(OverlayConfig::default())
    }
}

impl OverlayModule {
    pub fn new(config: OverlayConfig) -> Self {
        let registry = Rc::new(RefCell::new(OverlayRegistry::new()));

        let mut fx = Effect::with_shaders(config.default_vertex_shader, config.default_fragment_shader);
        fx.set_blend_mode(config.default_blend);
        let default_effect = Rc::new(RefCell::new(fx));
        registry.borrow_mut().register_effect(&default_effect);

        log::debug!("overlay module initialized");
        Self { registry, default_effect }
    }

    /// Effect used by overlays that were not given one.
    pub fn default_effect(&self) -> &SharedEffect {
        &self.default_effect
    }

    pub fn registry(&self) -> &Rc<RefCell<OverlayRegistry>> {
        &self.registry
    }

    /// New registered effect without shader sources.
    pub fn create_effect(&self) -> SharedEffect {
        let fx = Rc::new(RefCell::new(Effect::new()));
        self.registry.borrow_mut().register_effect(&fx);
        fx
    }

    /// Unregisters `fx`; subsequent passes no longer prepare it.
    pub fn destroy_effect(&self, fx: &SharedEffect) {
        self.registry.borrow_mut().unregister_effect(fx);
    }

    /// New registered overlay using the default effect.
    pub fn create_overlay(&self) -> SharedOverlay {
        let overlay = Rc::new(RefCell::new(Overlay::new(self.default_effect.clone())));
        self.registry.borrow_mut().register_overlay(&overlay);
        overlay
    }

    /// Unregisters `overlay`; subsequent passes no longer draw it.
    pub fn destroy_overlay(&self, overlay: &SharedOverlay) {
        self.registry.borrow_mut().unregister_overlay(overlay);
    }

    pub fn render_pass(&self) -> OverlayRenderPass {
        OverlayRenderPass::new(self.registry.clone())
    }

    /// Adds the overlay render pass to the host's pass list.
    pub fn initialize_renderer(&self, passes: &mut RenderPasses) {
        passes.add_pass(Box::new(self.render_pass()));
    }

    /// Drops per-context state for `context`, so a recycled context id starts
    /// from scratch.
    ///
    /// Reaches registered effects and overlays, the effect each overlay uses
    /// (registered or not) and every texture source an overlay has drawn on
    /// `context`.
    pub fn release_context(&self, context: ContextId) {
        let (mut effects, overlays) = {
            let registry = self.registry.borrow();
            (registry.effects(), registry.overlays())
        };

        for overlay in &overlays {
            let mut overlay = overlay.borrow_mut();
            overlay.release(context);
            let fx = overlay.effect();
            if !effects.iter().any(|e| Rc::ptr_eq(e, fx)) {
                effects.push(fx.clone());
            }
        }
        for fx in &effects {
            fx.borrow_mut().release(context);
        }
        log::debug!(
            "released {} effect(s) and {} overlay(s) on context {context}",
            effects.len(),
            overlays.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Viewport;
    use crate::gpu::RecordingGpu;
    use crate::pass::DrawContext;
    use crate::texture::PixelTexture;

    fn dc() -> DrawContext {
        DrawContext::overlay(ContextId::PRIMARY, Viewport::new(640.0, 480.0), 0.0)
    }

    #[test]
    fn default_effect_uses_configured_shaders() {
        let module = OverlayModule::default();
        let fx = module.default_effect().borrow();
        assert_eq!(fx.vertex_shader(), "overlay/overlay.vert");
        assert_eq!(fx.fragment_shader(), "overlay/overlay.frag");
        assert_eq!(fx.blend_mode(), BlendMode::Modulate);
        assert_eq!(module.registry().borrow().effect_count(), 1);
    }

    #[test]
    fn new_overlays_use_default_effect_and_register() {
        let module = OverlayModule::default();
        let overlay = module.create_overlay();

        assert!(Rc::ptr_eq(overlay.borrow().effect(), module.default_effect()));
        assert_eq!(module.registry().borrow().overlay_count(), 1);

        module.destroy_overlay(&overlay);
        assert_eq!(module.registry().borrow().overlay_count(), 0);
    }

    #[test]
    fn destroyed_effect_is_not_prepared() {
        let module = OverlayModule::default();
        let fx = module.create_effect();
        fx.borrow_mut().set_shaders("x.vert", "x.frag");
        let mut passes = RenderPasses::new();
        module.initialize_renderer(&mut passes);
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);

        module.destroy_effect(&fx);
        passes.render_all(&mut gpu, &dc()).unwrap();

        assert!(fx.borrow().program(ContextId::PRIMARY).is_none());
        assert_eq!(gpu.program_count(), 1);
    }

    #[test]
    fn full_frame_draws_registered_overlays() {
        let module = OverlayModule::default();
        let mut passes = RenderPasses::new();
        module.initialize_renderer(&mut passes);
        let plot = module.create_overlay();
        plot.borrow_mut().set_texture(Some(Rc::new(RefCell::new(PixelTexture::solid(8, 8, [0; 4])))));
        plot.borrow_mut().set_autosize(true);
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);

        passes.render_all(&mut gpu, &dc()).unwrap();

        assert_eq!(gpu.runs().len(), 1);
        assert_eq!(plot.borrow().size().x, 8.0);
    }

    #[test]
    fn release_context_resets_entities() {
        let module = OverlayModule::default();
        let overlay = module.create_overlay();
        let texture = Rc::new(RefCell::new(PixelTexture::solid(2, 2, [0; 4])));
        overlay.borrow_mut().set_texture(Some(texture));
        let mut pass = module.render_pass();
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);
        crate::pass::RenderPass::render(&mut pass, &mut gpu, &dc()).unwrap();

        module.release_context(ContextId::PRIMARY);

        assert!(module.default_effect().borrow().program(ContextId::PRIMARY).is_none());
        assert!(overlay.borrow().vertex_array(ContextId::PRIMARY).is_none());

        let mut fresh = RecordingGpu::new(ContextId::PRIMARY);
        crate::pass::RenderPass::render(&mut pass, &mut fresh, &dc()).unwrap();
        assert_eq!(fresh.program_count(), 1);
        assert_eq!(fresh.texture_count(), 1);
        assert_eq!(fresh.runs().len(), 1);
    }

    #[test]
    fn release_context_reaches_unregistered_effect_in_use() {
        let module = OverlayModule::default();
        let fx = module.create_effect();
        fx.borrow_mut().set_shaders("x.vert", "x.frag");
        let overlay = module.create_overlay();
        overlay.borrow_mut().set_effect(fx.clone());
        let mut pass = module.render_pass();
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);
        crate::pass::RenderPass::render(&mut pass, &mut gpu, &dc()).unwrap();
        assert!(fx.borrow().program(ContextId::PRIMARY).is_some());

        module.destroy_effect(&fx);
        module.release_context(ContextId::PRIMARY);
        assert!(fx.borrow().program(ContextId::PRIMARY).is_none());

        // The effect is no longer prepared, so its overlay is skipped.
        let mut fresh = RecordingGpu::new(ContextId::PRIMARY);
        crate::pass::RenderPass::render(&mut pass, &mut fresh, &dc()).unwrap();
        assert!(fresh.runs().is_empty());
    }

    #[test]
    fn release_context_reaches_detached_texture() {
        let module = OverlayModule::default();
        let overlay = module.create_overlay();
        let texture = Rc::new(RefCell::new(PixelTexture::solid(2, 2, [0; 4])));
        overlay.borrow_mut().set_texture(Some(texture.clone()));
        let mut pass = module.render_pass();
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);
        crate::pass::RenderPass::render(&mut pass, &mut gpu, &dc()).unwrap();

        overlay.borrow_mut().set_texture(None);
        module.release_context(ContextId::PRIMARY);
        overlay.borrow_mut().set_texture(Some(texture));

        let mut fresh = RecordingGpu::new(ContextId::PRIMARY);
        crate::pass::RenderPass::render(&mut pass, &mut fresh, &dc()).unwrap();
        assert_eq!(fresh.texture_count(), 1);
        let bound = overlay.borrow().bound_texture(ContextId::PRIMARY).unwrap();
        assert_eq!(fresh.texture_size(bound), Some((2, 2)));
        assert_eq!(fresh.runs()[0].textures[0].1, bound);
    }
}
