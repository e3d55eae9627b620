use glam::Mat4;

/// Viewport size in pixels.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    #[inline]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
    }

    /// Orthographic projection for 2D drawing: `(0, 0)` is the bottom-left
    /// corner, `(width, height)` the top-right.
    ///
    /// Degenerate viewports are clamped to one pixel.
    pub fn ortho(self) -> Mat4 {
        let w = if self.width.is_finite() { self.width.max(1.0) } else { 1.0 };
        let h = if self.height.is_finite() { self.height.max(1.0) } else { 1.0 };
        Mat4::orthographic_rh(0.0, w, 0.0, h, -1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn ortho_maps_corners_to_clip_space() {
        let m = Viewport::new(800.0, 600.0).ortho();
        assert!(approx(m.project_point3(Vec3::new(0.0, 0.0, 0.0)).truncate().extend(0.0), Vec3::new(-1.0, -1.0, 0.0)));
        assert!(approx(m.project_point3(Vec3::new(800.0, 600.0, 0.0)).truncate().extend(0.0), Vec3::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn ortho_clamps_degenerate_viewport() {
        let m = Viewport::new(0.0, f32::NAN).ortho();
        assert!(m.is_finite());
    }

    #[test]
    fn validity() {
        assert!(Viewport::new(1.0, 1.0).is_valid());
        assert!(!Viewport::new(0.0, 1.0).is_valid());
        assert!(!Viewport::new(1.0, f32::INFINITY).is_valid());
    }
}
