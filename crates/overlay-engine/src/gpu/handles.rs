macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(u32);

        impl $name {
            /// Wraps a backend-assigned raw id.
            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

gpu_handle!(
    /// Shader program owned by a [`GpuContext`](super::GpuContext).
    ProgramId
);
gpu_handle!(
    /// Uniform declared on a program.
    UniformId
);
gpu_handle!(VertexArrayId);
gpu_handle!(
    /// Texture object. Two handles are equal iff they name the same GPU texture.
    TextureId
);
