use super::ShaderStage;

/// Failures reported by a [`GpuContext`](super::GpuContext).
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("shader source `{path}` not found")]
    ShaderNotFound { path: String },

    #[error("failed to read shader `{path}`")]
    ShaderRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("program has no {0:?} shader")]
    MissingStage(ShaderStage),

    #[error("{stage:?} shader `{path}` failed to compile:\n{message}")]
    Compile {
        stage: ShaderStage,
        path: String,
        message: String,
    },

    #[error("unknown {kind} handle {raw}")]
    UnknownHandle { kind: &'static str, raw: u32 },

    #[error("texture data is {actual} bytes, expected {expected}")]
    TextureSize { expected: usize, actual: usize },
}
