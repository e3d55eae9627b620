//! Overlay studio: two windows sharing one overlay module.
//!
//! Usage: `overlay-studio [badge-image]`. Set `OVERLAY_SHADER_DIR` to add a
//! directory to the shader search path and `RUST_LOG` to tune logging.

mod plot;
mod studio;

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context;
use overlay_engine::device::GpuInit;
use overlay_engine::logging::{LoggingConfig, init_logging};
use overlay_engine::window::{Runtime, RuntimeConfig};
use winit::dpi::LogicalSize;

use studio::{StudioApp, shader_library};

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());

    let badge = std::env::args_os().nth(1).map(Into::into);
    let fatal = Rc::new(RefCell::new(None));
    let app = StudioApp::new(badge, fatal.clone())?;

    let windows = vec![
        RuntimeConfig {
            title: "overlay studio".to_string(),
            initial_size: LogicalSize::new(800.0, 480.0),
        },
        RuntimeConfig {
            title: "overlay studio (second context)".to_string(),
            initial_size: LogicalSize::new(640.0, 360.0),
        },
    ];

    Runtime::run_windows(windows, GpuInit::default(), shader_library(), app)?;

    let failure = fatal.borrow_mut().take();
    if let Some(err) = failure {
        return Err(err).context("overlay rendering failed");
    }
    Ok(())
}
