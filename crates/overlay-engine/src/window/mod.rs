//! Window + runtime loop.
//!
//! Owns the `winit` event loop and windows, and gives each window its own
//! GPU context.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig, RuntimeCtx};
