use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use anyhow::{Context, Result};
use overlay_engine::core::{App, AppControl, FrameCtx};
use overlay_engine::render::ShaderLibrary;
use overlay_engine::{
    BlendMode, ContextId, OverlayConfig, OverlayError, OverlayModule, PixelTexture, RenderPasses,
    SharedOverlay, SharedTextureSource,
};

use crate::plot::{checker, paint_plot};

pub const GLOW_FRAGMENT_SHADER: &str = "studio/glow.frag";

const PLOT_SIZE: (u32, u32) = (480, 200);
const BADGE_POSITION: (f32, f32) = (24.0, 248.0);
const PLOT_INTERVAL: f64 = 1.0 / 30.0;
const CLEAR: wgpu::Color = wgpu::Color {
    r: 0.07,
    g: 0.07,
    b: 0.09,
    a: 1.0,
};

/// Slot where a fatal render error is left for `main` to report.
pub type FatalError = Rc<RefCell<Option<OverlayError>>>;

/// Shader library with the built-ins, the studio's glow shader and an
/// optional directory from `OVERLAY_SHADER_DIR`.
pub fn shader_library() -> ShaderLibrary {
    let mut shaders = ShaderLibrary::new();
    shaders.register(GLOW_FRAGMENT_SHADER, include_str!("../shaders/glow.frag.wgsl"));
    if let Ok(dir) = std::env::var("OVERLAY_SHADER_DIR") {
        log::info!("extra shader root: {dir}");
        shaders.add_root(dir);
    }
    shaders
}

/// Demo app: an animated plot, an autosized badge and an additive glow, all
/// shown in every open window.
///
/// Blend state is per context, so the glow lives in its own module whose pass
/// runs after the alpha-blended overlays.
pub struct StudioApp {
    module: OverlayModule,
    glow_module: OverlayModule,
    passes: RenderPasses,
    start: Instant,

    plot: Rc<RefCell<PixelTexture>>,
    plot_painted_at: Option<f64>,
    /// Owned here; the registry only holds weak references.
    _plot_overlay: SharedOverlay,
    badge: SharedOverlay,
    glow: SharedOverlay,

    fatal: FatalError,
}

impl StudioApp {
    /// `badge_image` replaces the generated checker badge when given.
    pub fn new(badge_image: Option<PathBuf>, fatal: FatalError) -> Result<Self> {
        let module = OverlayModule::default();
        let glow_module = OverlayModule::new(OverlayConfig {
            default_fragment_shader: GLOW_FRAGMENT_SHADER.to_string(),
            default_blend: BlendMode::Additive,
            ..OverlayConfig::default()
        });
        let mut passes = RenderPasses::new();
        module.initialize_renderer(&mut passes);
        glow_module.initialize_renderer(&mut passes);

        let (pw, ph) = PLOT_SIZE;
        let plot = Rc::new(RefCell::new(PixelTexture::solid(pw, ph, [0; 4])));
        let plot_source: SharedTextureSource = plot.clone();
        let plot_overlay = module.create_overlay();
        {
            let mut o = plot_overlay.borrow_mut();
            o.set_position(24.0, 24.0);
            o.set_size(pw as f32, ph as f32);
            o.set_texture(Some(plot_source));
        }

        let badge_texture = match badge_image {
            Some(path) => PixelTexture::load(&path)
                .with_context(|| format!("failed to load badge {}", path.display()))?,
            None => PixelTexture::new(
                96,
                48,
                checker(96, 48, 8, [230, 230, 240, 255], [60, 90, 200, 255]),
            )?,
        };
        let badge = module.create_overlay();
        {
            let mut o = badge.borrow_mut();
            o.set_position(BADGE_POSITION.0, BADGE_POSITION.1);
            o.set_autosize(true);
            o.set_alpha(0.9);
            let badge_source: SharedTextureSource = Rc::new(RefCell::new(badge_texture));
            o.set_texture(Some(badge_source));
        }

        let glow = glow_module.create_overlay();
        {
            let mut o = glow.borrow_mut();
            o.set_position(540.0, 40.0);
            o.set_size(220.0, 220.0);
        }

        log::info!("studio ready: {} render pass(es)", passes.len());

        Ok(Self {
            module,
            glow_module,
            passes,
            start: Instant::now(),
            plot,
            plot_painted_at: None,
            _plot_overlay: plot_overlay,
            badge,
            glow,
            fatal,
        })
    }

    /// Advances shared animation state; windows share one clock.
    fn animate(&mut self) {
        let t = self.start.elapsed().as_secs_f64();

        if self.plot_painted_at.is_none_or(|last| t - last >= PLOT_INTERVAL) {
            self.plot.borrow_mut().update(|rgba, w, h| paint_plot(rgba, w, h, t as f32));
            self.plot_painted_at = Some(t);
        }

        let pulse = 0.5 + 0.5 * (t as f32 * 1.7).sin();
        self.glow.borrow_mut().set_alpha(0.35 + 0.65 * pulse);
        self.badge
            .borrow_mut()
            .set_position(BADGE_POSITION.0, BADGE_POSITION.1 + 6.0 * (t as f32 * 0.9).sin());
    }
}

impl App for StudioApp {
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        self.animate();

        let passes = &mut self.passes;
        match ctx.render(CLEAR, |gpu, dc| passes.render_all(gpu, dc)) {
            Ok(control) => control,
            Err(e) => {
                log::error!("{e}");
                if let Some(source) = std::error::Error::source(&e) {
                    log::error!("  caused by: {source}");
                }
                *self.fatal.borrow_mut() = Some(e);
                AppControl::Exit
            }
        }
    }

    fn on_context_released(&mut self, context: ContextId) {
        self.module.release_context(context);
        self.glow_module.release_context(context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_engine::DrawContext;
    use overlay_engine::coords::Viewport;
    use overlay_engine::gpu::{RecordingGpu, ShaderStage};
    use overlay_engine::overlay::IMAGE_BINDING;
    use overlay_engine::render::validate_wgsl;

    fn app() -> StudioApp {
        StudioApp::new(None, Rc::new(RefCell::new(None))).unwrap()
    }

    #[test]
    fn glow_shader_is_valid() {
        let lib = shader_library();
        let src = lib.resolve(GLOW_FRAGMENT_SHADER).unwrap();
        validate_wgsl(ShaderStage::Fragment, GLOW_FRAGMENT_SHADER, &src).unwrap();
    }

    #[test]
    fn one_frame_draws_every_overlay() {
        let mut app = app();
        app.animate();
        let mut gpu = RecordingGpu::new(ContextId::PRIMARY);
        let dc = DrawContext::overlay(ContextId::PRIMARY, Viewport::new(800.0, 600.0), 2.5);

        app.passes.render_all(&mut gpu, &dc).unwrap();

        let runs = gpu.runs();
        assert_eq!(runs.len(), 3);
        assert_eq!(app.badge.borrow().size().x, 96.0);
        assert_eq!(app.badge.borrow().size().y, 48.0);
        // Default effect plus the glow effect.
        assert_eq!(gpu.program_count(), 2);

        // Plot and badge blend over the frame; only the glow accumulates.
        let modulate = BlendMode::Modulate.blend_state();
        let additive = BlendMode::Additive.blend_state();
        assert_eq!(runs[0].blend, modulate);
        assert_eq!(runs[1].blend, modulate);
        assert_eq!(runs[2].blend, additive);
        assert_eq!(runs[0].textures[0].0, IMAGE_BINDING);
        assert!(runs[2].textures.is_empty());

        assert_eq!(app.module.registry().borrow().overlays().len(), 2);
        assert_eq!(app.glow_module.registry().borrow().overlays().len(), 1);
        assert_eq!(app.glow.borrow().last_drawn(ContextId::PRIMARY), 2.5);
        assert_eq!(app._plot_overlay.borrow().last_drawn(ContextId::PRIMARY), 2.5);
        assert_eq!(app.badge.borrow().last_drawn(ContextId::PRIMARY), 2.5);
    }

    #[test]
    fn released_context_rebuilds_from_scratch() {
        let mut app = app();
        let dc = DrawContext::overlay(ContextId::PRIMARY, Viewport::new(800.0, 600.0), 1.0);
        let mut first = RecordingGpu::new(ContextId::PRIMARY);
        app.passes.render_all(&mut first, &dc).unwrap();

        app.on_context_released(ContextId::PRIMARY);

        let mut second = RecordingGpu::new(ContextId::PRIMARY);
        app.passes.render_all(&mut second, &dc).unwrap();
        assert_eq!(second.program_count(), 2);
        assert_eq!(second.runs().len(), 3);
    }

    #[test]
    fn missing_badge_file_is_reported() {
        let err = StudioApp::new(Some("no/such/badge.png".into()), Rc::new(RefCell::new(None)));
        assert!(err.is_err());
    }
}
