/// What the frame loop does after failing to acquire a surface texture.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Reconfigure the surface, then try again next frame.
    Reconfigure,
    /// Drop this frame only.
    SkipFrame,
    /// Give up on the window.
    Fatal,
}

impl SurfaceErrorAction {
    pub fn for_error(err: &wgpu::SurfaceError) -> Self {
        match err {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => Self::Reconfigure,
            wgpu::SurfaceError::OutOfMemory => Self::Fatal,
            wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => Self::SkipFrame,
        }
    }
}

/// First sRGB format the surface offers when `prefer_srgb`, else its first format.
pub(crate) fn pick_format(caps: &wgpu::SurfaceCapabilities, prefer_srgb: bool) -> Option<wgpu::TextureFormat> {
    let srgb = caps.formats.iter().copied().find(|f| f.is_srgb());
    match srgb {
        Some(f) if prefer_srgb => Some(f),
        _ => caps.formats.first().copied(),
    }
}

pub(crate) fn pick_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    match requested {
        Some(mode) if caps.alpha_modes.contains(&mode) => mode,
        _ => caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
    }
}
