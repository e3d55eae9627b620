//! Render passes invoked by the host once per frame per GPU context.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Mat4;

use crate::context::ContextId;
use crate::coords::Viewport;
use crate::error::OverlayError;
use crate::gpu::GpuContext;
use crate::registry::OverlayRegistry;

/// What the host is currently drawing.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DrawTask {
    /// 3D scene geometry; overlays are not drawn.
    Scene,
    /// Screen-space overlay layer.
    Overlay,
}

/// Per-frame, per-context draw parameters supplied by the host.
#[derive(Debug, Copy, Clone)]
pub struct DrawContext {
    pub context: ContextId,
    pub task: DrawTask,
    /// Orthographic projection of the 2D overlay space.
    pub ortho: Mat4,
    pub viewport: Viewport,
    /// Host frame time in seconds.
    pub time: f64,
}

impl DrawContext {
    /// Overlay-task context whose projection covers `viewport`.
    pub fn overlay(context: ContextId, viewport: Viewport, time: f64) -> Self {
        Self {
            context,
            task: DrawTask::Overlay,
            ortho: viewport.ortho(),
            viewport,
            time,
        }
    }

    pub fn with_task(self, task: DrawTask) -> Self {
        Self { task, ..self }
    }
}

/// A unit of per-frame rendering registered with the host.
pub trait RenderPass {
    fn name(&self) -> &str;

    fn render(&mut self, gpu: &mut dyn GpuContext, dc: &DrawContext) -> Result<(), OverlayError>;
}

/// Ordered list of passes; the host calls [`render_all`](Self::render_all) per frame per context.
#[derive(Default)]
pub struct RenderPasses {
    passes: Vec<Box<dyn RenderPass>>,
}

impl RenderPasses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass(&mut self, pass: Box<dyn RenderPass>) {
        log::debug!("render pass added: {}", pass.name());
        self.passes.push(pass);
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.passes.iter().map(|p| p.name())
    }

    /// Runs every pass in registration order, stopping at the first error.
    pub fn render_all(&mut self, gpu: &mut dyn GpuContext, dc: &DrawContext) -> Result<(), OverlayError> {
        for pass in &mut self.passes {
            pass.render(gpu, dc)?;
        }
        Ok(())
    }
}

/// Prepares every registered effect, then draws every registered overlay.
///
/// Effects are prepared on every task, used or not. Overlays are drawn only
/// for [`DrawTask::Overlay`], inside a 2D draw scope, in registration order
/// (later overlays draw on top).
pub struct OverlayRenderPass {
    registry: Rc<RefCell<OverlayRegistry>>,
}

impl OverlayRenderPass {
    pub fn new(registry: Rc<RefCell<OverlayRegistry>>) -> Self {
        Self { registry }
    }
}

impl RenderPass for OverlayRenderPass {
    fn name(&self) -> &str {
        "OverlayRenderPass"
    }

    fn render(&mut self, gpu: &mut dyn GpuContext, dc: &DrawContext) -> Result<(), OverlayError> {
        // Snapshot strong handles so entity callbacks never run under a registry borrow.
        let (effects, overlays) = {
            let mut registry = self.registry.borrow_mut();
            registry.prune();
            (registry.effects(), registry.overlays())
        };

        for fx in &effects {
            fx.borrow_mut().prepare(gpu, dc)?;
        }

        if dc.task == DrawTask::Overlay {
            gpu.begin_draw_2d(dc);
            for overlay in &overlays {
                overlay.borrow_mut().draw(gpu, dc);
            }
            gpu.end_draw();
        }

        Ok(())
    }
}
