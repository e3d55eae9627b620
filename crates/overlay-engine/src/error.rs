use crate::context::ContextId;
use crate::gpu::GpuError;

/// Errors surfaced by the overlay render pass.
///
/// Only shader build failures are reported; every other condition (missing
/// texture, zero size, unprepared effect) is a normal state.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// Effect shaders failed to build. Hosts treat this as fatal.
    #[error("overlay effect failed to build on context {context} (vertex `{vertex}`, fragment `{fragment}`)")]
    ShaderBuild {
        context: ContextId,
        vertex: String,
        fragment: String,
        #[source]
        source: GpuError,
    },
}
