//! CPU-side painting of the animated plot and the badge.

/// Paints a scrolling sine trace over a grid. Row 0 is the top of the image.
pub fn paint_plot(rgba: &mut [u8], width: u32, height: u32, t: f32) {
    const BACKGROUND: [u8; 4] = [12, 16, 24, 200];
    const GRID: [u8; 4] = [40, 56, 72, 220];
    const TRACE: [u8; 4] = [90, 220, 140, 255];

    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return;
    }

    for (i, px) in rgba.chunks_exact_mut(4).enumerate() {
        let (x, y) = (i % w, i / w);
        let on_grid = x % 32 == 0 || y % 32 == 0 || y == h / 2;
        px.copy_from_slice(if on_grid { &GRID } else { &BACKGROUND });
    }

    let amplitude = (h as f32 - 8.0).max(0.0) * 0.4;
    let mut prev: Option<usize> = None;
    for x in 0..w {
        let phase = x as f32 / w as f32 * std::f32::consts::TAU * 2.0 + t * 2.0;
        let y = (h as f32 * 0.5 - phase.sin() * amplitude).round().clamp(0.0, h as f32 - 1.0) as usize;

        // Connect to the previous column so steep segments stay continuous.
        let (lo, hi) = match prev {
            Some(p) => (p.min(y), p.max(y)),
            None => (y, y),
        };
        for row in lo.saturating_sub(1)..=(hi + 1).min(h - 1) {
            let at = (row * w + x) * 4;
            rgba[at..at + 4].copy_from_slice(&TRACE);
        }
        prev = Some(y);
    }
}

/// Two-color checkerboard with `cell`-pixel squares.
pub fn checker(width: u32, height: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Vec<u8> {
    let cell = cell.max(1);
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            let even = (x / cell + y / cell) % 2 == 0;
            rgba.extend_from_slice(if even { &a } else { &b });
        }
    }
    rgba
}
