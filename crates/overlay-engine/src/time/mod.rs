//! Frame timing.
//!
//! One `FrameClock` per window; `tick()` once per presented frame. The
//! elapsed time feeds the draw context and the per-context usage stamps.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
