use anyhow::{Context, Result};
use ouroboros::self_referencing;
use std::collections::HashMap;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::context::{ContextId, ContextPool};
use crate::core::{App as CoreApp, AppControl, FrameCtx, WindowCtx};
use crate::device::{Gpu, GpuInit};
use crate::render::ShaderLibrary;
use crate::time::FrameClock;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "overlay".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
        }
    }
}

/// Runtime commands issued from app callbacks.
///
/// Commands are buffered and applied after the current callback returns.
#[derive(Default)]
pub struct RuntimeCtx {
    commands: Vec<Command>,
}

impl RuntimeCtx {
    pub fn create_window(&mut self, config: RuntimeConfig) {
        self.commands.push(Command::CreateWindow(config));
    }

    pub fn close_window(&mut self, id: WindowId) {
        self.commands.push(Command::CloseWindow(id));
    }

    pub fn exit(&mut self) {
        self.commands.push(Command::Exit);
    }
}

enum Command {
    CreateWindow(RuntimeConfig),
    CloseWindow(WindowId),
    Exit,
}

/// Entry point for the windowed runtime.
///
/// Every window gets its own device and a [`ContextId`] from a shared pool.
/// Closing a window releases its id and notifies the app through
/// [`App::on_context_released`](crate::core::App::on_context_released).
pub struct Runtime;

impl Runtime {
    /// Runs the event loop with `initial` as the first window.
    pub fn run<A>(initial: RuntimeConfig, gpu_init: GpuInit, shaders: ShaderLibrary, app: A) -> Result<()>
    where
        A: 'static + CoreApp,
    {
        Self::run_windows(vec![initial], gpu_init, shaders, app)
    }

    /// Runs the event loop, opening all of `windows` on startup.
    pub fn run_windows<A>(
        windows: Vec<RuntimeConfig>,
        gpu_init: GpuInit,
        shaders: ShaderLibrary,
        app: A,
    ) -> Result<()>
    where
        A: 'static + CoreApp,
    {
        anyhow::ensure!(!windows.is_empty(), "runtime needs at least one window");

        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(windows, gpu_init, shaders, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        Ok(())
    }
}

#[self_referencing]
struct WindowEntry {
    clock: FrameClock,
    context: ContextId,

    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

struct AppState<A>
where
    A: CoreApp + 'static,
{
    initial: Vec<RuntimeConfig>,
    gpu_init: GpuInit,
    shaders: ShaderLibrary,
    app: A,

    contexts: ContextPool,
    windows: HashMap<WindowId, WindowEntry>,
    exit_requested: bool,
}

impl<A> AppState<A>
where
    A: CoreApp + 'static,
{
    fn new(initial: Vec<RuntimeConfig>, gpu_init: GpuInit, shaders: ShaderLibrary, app: A) -> Self {
        Self {
            initial,
            gpu_init,
            shaders,
            app,
            contexts: ContextPool::new(),
            windows: HashMap::new(),
            exit_requested: false,
        }
    }

    fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    fn create_window_entry(
        &mut self,
        event_loop: &ActiveEventLoop,
        config: RuntimeConfig,
    ) -> Result<WindowId> {
        let context = self
            .contexts
            .acquire()
            .context("all GPU context ids are in use")?;

        let attrs = Window::default_attributes()
            .with_title(config.title)
            .with_inner_size(config.initial_size);

        let window = match event_loop.create_window(attrs) {
            Ok(w) => w,
            Err(e) => {
                self.contexts.release(context);
                return Err(e).context("failed to create window");
            }
        };

        let id = window.id();
        let gpu_init = self.gpu_init.clone();
        let shaders = self.shaders.clone();

        let entry = WindowEntryTryBuilder {
            clock: FrameClock::default(),
            context,
            window,
            gpu_builder: |w| pollster::block_on(Gpu::new(w, gpu_init, context, shaders)),
        }
        .try_build();

        match entry {
            Ok(entry) => {
                log::debug!("window {id:?} opened with context {context}");
                self.windows.insert(id, entry);
                Ok(id)
            }
            Err(e) => {
                self.contexts.release(context);
                Err(e.context("GPU initialization failed for window"))
            }
        }
    }

    fn destroy_window_entry(&mut self, id: WindowId) {
        let Some(entry) = self.windows.remove(&id) else { return };
        let context = *entry.borrow_context();
        drop(entry);

        self.contexts.release(context);
        self.app.on_context_released(context);
        log::debug!("window {id:?} closed, context {context} released");
    }

    fn apply_commands(&mut self, event_loop: &ActiveEventLoop, mut ctx: RuntimeCtx) {
        for cmd in ctx.commands.drain(..) {
            match cmd {
                Command::CreateWindow(cfg) => {
                    if let Err(e) = self.create_window_entry(event_loop, cfg) {
                        log::error!("failed to create window: {e:#}");
                        self.request_exit();
                    }
                }
                Command::CloseWindow(id) => self.destroy_window_entry(id),
                Command::Exit => self.request_exit(),
            }
        }

        if self.windows.is_empty() {
            self.request_exit();
        }

        if self.exit_requested {
            event_loop.exit();
        }
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: CoreApp + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !self.windows.is_empty() {
            return;
        }

        for config in std::mem::take(&mut self.initial) {
            if let Err(e) = self.create_window_entry(event_loop, config) {
                log::error!("failed to create initial window: {e:#}");
                self.request_exit();
                event_loop.exit();
                return;
            }
        }

        for entry in self.windows.values() {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        // Overlays animate, so redraw continuously.
        event_loop.set_control_flow(ControlFlow::Wait);
        for entry in self.windows.values() {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        if !self.windows.contains_key(&window_id) {
            return;
        }

        if self.app.on_window_event(window_id, &event) == AppControl::Exit {
            self.request_exit();
            event_loop.exit();
            return;
        }

        match &event {
            WindowEvent::CloseRequested => {
                self.destroy_window_entry(window_id);
                if self.windows.is_empty() {
                    self.request_exit();
                    event_loop.exit();
                }
            }

            WindowEvent::Resized(new_size) => {
                if let Some(entry) = self.windows.get_mut(&window_id) {
                    entry.with_gpu_mut(|gpu| gpu.resize(*new_size));
                    entry.with_window(|w| w.request_redraw());
                }
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(entry) = self.windows.get_mut(&window_id) {
                    let new_size = entry.with_window(|w| w.inner_size());
                    entry.with_gpu_mut(|gpu| gpu.resize(new_size));
                    entry.with_window(|w| w.request_redraw());
                }
            }

            WindowEvent::RedrawRequested => {
                let mut runtime_ctx = RuntimeCtx::default();
                let mut app_control = AppControl::Continue;

                // Split borrows; `ouroboros` closures cannot capture `self`.
                let (app, windows) = (&mut self.app, &mut self.windows);
                if let Some(entry) = windows.get_mut(&window_id) {
                    entry.with_mut(|fields| {
                        let time = fields.clock.tick();
                        let mut ctx = FrameCtx {
                            window: WindowCtx {
                                id: window_id,
                                window: fields.window,
                            },
                            gpu: fields.gpu,
                            time,
                            runtime: &mut runtime_ctx,
                        };
                        app_control = app.on_frame(&mut ctx);
                    });
                }

                if app_control == AppControl::Exit {
                    runtime_ctx.exit();
                }

                self.apply_commands(event_loop, runtime_ctx);
            }

            _ => {}
        }

        if self.exit_requested {
            event_loop.exit();
        }
    }
}
