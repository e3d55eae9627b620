//! GPU device and surface management, one [`Gpu`] per window.
//!
//! Each `Gpu` owns its instance, adapter, device, queue and surface, plus the
//! [`WgpuContext`](crate::render::WgpuContext) the overlay layer draws through.

mod frame;
mod gpu;
mod init;
mod surface;

pub use frame::GpuFrame;
pub use gpu::Gpu;
pub use init::GpuInit;
pub use surface::SurfaceErrorAction;
