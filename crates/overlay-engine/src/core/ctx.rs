use winit::window::{Window, WindowId};

use crate::context::ContextId;
use crate::coords::Viewport;
use crate::device::{Gpu, SurfaceErrorAction};
use crate::pass::DrawContext;
use crate::render::{RenderTarget, WgpuContext};
use crate::time::FrameTime;
use crate::window::RuntimeCtx;

use super::app::AppControl;

/// Per-window handles.
pub struct WindowCtx<'a> {
    pub id: WindowId,
    pub window: &'a Window,
}

impl<'a> WindowCtx<'a> {
    /// Window size in logical pixels.
    pub fn logical_size(&self) -> (f32, f32) {
        let logical: winit::dpi::LogicalSize<f64> =
            self.window.inner_size().to_logical(self.window.scale_factor());
        (logical.width as f32, logical.height as f32)
    }
}

/// Per-frame context passed to [`App::on_frame`](super::App::on_frame).
///
/// `'a` is the callback duration, `'w` the window borrow held by `Gpu<'w>`.
pub struct FrameCtx<'a, 'w> {
    pub window: WindowCtx<'a>,
    pub gpu: &'a mut Gpu<'w>,
    pub time: FrameTime,
    pub runtime: &'a mut RuntimeCtx,
}

impl<'a, 'w> FrameCtx<'a, 'w> {
    pub fn context(&self) -> ContextId {
        self.gpu.context_id()
    }

    /// Overlay draw context for this window: logical-pixel viewport, elapsed
    /// frame time in seconds.
    pub fn draw_context(&self) -> DrawContext {
        let (w, h) = self.window.logical_size();
        DrawContext::overlay(self.context(), Viewport::new(w, h), self.time.elapsed)
    }

    /// Clears the surface, runs `draw` against the window's overlay context,
    /// encodes the recorded draws over the cleared frame and presents it.
    ///
    /// Nothing is drawn while the window has no area (e.g. minimized). An
    /// error from `draw` abandons the frame and is returned as is.
    pub fn render<F, E>(&mut self, clear: wgpu::Color, draw: F) -> Result<AppControl, E>
    where
        F: FnOnce(&mut WgpuContext, &DrawContext) -> Result<(), E>,
    {
        let dc = self.draw_context();
        if !dc.viewport.is_valid() {
            log::trace!("context {}: empty viewport, frame skipped", dc.context);
            return Ok(AppControl::Continue);
        }

        let mut frame = match self.gpu.begin_frame() {
            Ok(f) => f,
            Err(err) => {
                log::debug!("context {}: surface error {err}", dc.context);
                return Ok(match self.gpu.handle_surface_error(err) {
                    SurfaceErrorAction::Fatal => AppControl::Exit,
                    _ => AppControl::Continue,
                });
            }
        };

        {
            let _clear = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("overlay clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }

        if let Err(e) = draw(self.gpu.overlay_mut(), &dc) {
            self.gpu.overlay_mut().discard_pending();
            return Err(e);
        }

        {
            let mut target = RenderTarget::new(&mut frame.encoder, &frame.view);
            self.gpu.overlay_mut().flush(&mut target);
        }

        self.window.window.pre_present_notify();
        self.gpu.submit(frame);

        Ok(AppControl::Continue)
    }
}
