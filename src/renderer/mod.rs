mod color;
mod font;

// Re-export public API
pub use color::{ColorMap, FieldRange};
pub use font::render_status;

use color::value_to_rgba;
#[cfg(test)]
use color::{map_to_rgba, NAN_GREY};
use font::{draw_text, STATUS_BAR_HEIGHT};
use crate::solver::Snapshot;
use crate::state::idx_inner;

/// Pixels between adjacent panels.
const PANEL_GAP: usize = 4;
const GAP_COLOR: [u8; 4] = [0x1A, 0x1A, 0x1A, 255];
const LABEL_COLOR: [u8; 3] = [0x20, 0x20, 0x20];

/// The four fields shown side by side.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Panel {
    Density,
    VelX,
    VelY,
    Pressure,
}

impl Panel {
    pub const ALL: [Panel; 4] = [Panel::Density, Panel::VelX, Panel::VelY, Panel::Pressure];

    pub fn label(self) -> &'static str {
        match self {
            Panel::Density => "density",
            Panel::VelX => "velx",
            Panel::VelY => "vely",
            Panel::Pressure => "pressure",
        }
    }

    pub fn colormap(self) -> ColorMap {
        match self {
            Panel::Density => ColorMap::OceanLava,
            Panel::VelX | Panel::VelY => ColorMap::BlueWhiteRed,
            Panel::Pressure => ColorMap::TokyoNight,
        }
    }

    fn field(self, snap: &Snapshot) -> &[f64] {
        match self {
            Panel::Density => &snap.density,
            Panel::VelX => &snap.velx,
            Panel::VelY => &snap.vely,
            Panel::Pressure => &snap.pressure,
        }
    }
}

/// Frame layout computed from the window pixel size.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderConfig {
    pub panel_width: usize,
    /// Height of the panel area; the status bar starts below it.
    pub display_height: usize,
    pub frame_width: usize,
    pub frame_height: usize,
    /// Quiver arrows every `arrow_stride` cells. Zero hides them.
    pub arrow_stride: usize,
}

impl RenderConfig {
    /// Split `pixel_width` into four panels; the status bar is added below
    /// `pixel_height`.
    pub fn fit(pixel_width: usize, pixel_height: usize, arrow_stride: usize) -> Self {
        let panels = Panel::ALL.len();
        let panel_width = (pixel_width.saturating_sub((panels - 1) * PANEL_GAP) / panels).max(1);
        let display_height = pixel_height.max(1);
        Self {
            panel_width,
            display_height,
            frame_width: panel_width * panels + (panels - 1) * PANEL_GAP,
            frame_height: display_height + STATUS_BAR_HEIGHT,
            arrow_stride,
        }
    }

    #[inline]
    pub fn panel_x(&self, panel: usize) -> usize {
        panel * (self.panel_width + PANEL_GAP)
    }

    /// Horizontal scale: display pixels per snapshot cell.
    pub fn scale_x(&self, cells: usize) -> f64 {
        self.panel_width as f64 / cells as f64
    }

    /// Vertical scale: display pixels per snapshot cell.
    pub fn scale_y(&self, cells: usize) -> f64 {
        self.display_height as f64 / cells as f64
    }
}

// Screen blend: result = 1 - (1-bg)(1-fg*alpha), always brightens
#[inline]
fn screen_blend(buf: &mut [u8], off: usize, color: [f64; 3], alpha: f64) {
    for ch in 0..3 {
        let b = buf[off + ch] as f64;
        let f = (color[ch] * alpha).min(255.0);
        buf[off + ch] = (b + f - b * f / 255.0).min(255.0) as u8;
    }
}

/// Bresenham line clipped to one panel, screen-blended into the frame.
fn draw_line_blended(
    buf: &mut [u8],
    cfg: &RenderConfig,
    x_off: usize,
    (x0, y0): (isize, isize),
    (x1, y1): (isize, isize),
    color: [f64; 3],
    alpha: f64,
) {
    let (dw, dh) = (cfg.panel_width as isize, cfg.display_height as isize);
    let mut cx = x0;
    let mut cy = y0;
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx: isize = if x0 < x1 { 1 } else { -1 };
    let sy: isize = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if cx >= 0 && cx < dw && cy >= 0 && cy < dh {
            let off = (cy as usize * cfg.frame_width + cx as usize + x_off) * 4;
            screen_blend(buf, off, color, alpha);
        }
        if cx == x1 && cy == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            cx += sx;
        }
        if e2 <= dx {
            err += dx;
            cy += sy;
        }
    }
}

fn draw_field(buf: &mut [u8], snap: &Snapshot, cfg: &RenderConfig, panel: Panel, x_off: usize) {
    let field = panel.field(snap);
    let range = FieldRange::of(field);
    let colormap = panel.colormap();
    let (w, h) = (snap.width, snap.height);

    for py in 0..cfg.display_height {
        // Row 0 of the snapshot is the bottom of the domain
        let cy = h - 1 - (py * h / cfg.display_height).min(h - 1);
        for px in 0..cfg.panel_width {
            let cx = (px * w / cfg.panel_width).min(w - 1);
            let rgba = value_to_rgba(field[idx_inner(cx, cy, w)], range, colormap);
            let off = (py * cfg.frame_width + x_off + px) * 4;
            buf[off..off + 4].copy_from_slice(&rgba);
        }
    }
    draw_text(buf, cfg.frame_width, (x_off + 3, 3), x_off + cfg.panel_width, panel.label(), LABEL_COLOR);
}

fn draw_quiver(buf: &mut [u8], snap: &Snapshot, cfg: &RenderConfig, x_off: usize) {
    let arrows = snap.subsample(cfg.arrow_stride);
    let vmax = arrows.iter().map(|a| a.vx.hypot(a.vy)).fold(0.0_f64, f64::max);
    if vmax <= 1e-12 {
        return;
    }
    let sx = cfg.scale_x(snap.width);
    let sy = cfg.scale_y(snap.height);
    let max_arrow_px = cfg.arrow_stride as f64 * sx.min(sy) * 0.8;
    let color = [160.0, 220.0, 255.0]; // light cyan
    let alpha = 0.7;

    for a in arrows {
        let mag = a.vx.hypot(a.vy);
        if mag < vmax * 0.01 {
            continue;
        }
        let len = (mag / vmax) * max_arrow_px;
        let dx = a.vx / mag * len;
        // Y is flipped for screen coords
        let dy = -a.vy / mag * len;
        let base_x = (a.x as f64 + 0.5) * sx;
        let base_y = (snap.height as f64 - a.y as f64 - 0.5) * sy;
        let p0 = ((base_x - dx * 0.5) as isize, (base_y - dy * 0.5) as isize);
        let p1 = ((base_x + dx * 0.5) as isize, (base_y + dy * 0.5) as isize);
        draw_line_blended(buf, cfg, x_off, p0, p1, color, alpha);

        // Arrowhead: two strokes from the tip at +-150 degrees
        if len > 2.0 {
            let head = 3.0_f64.min(len * 0.35);
            let (ux, uy) = (dx / len, dy / len);
            let (cos_a, sin_a) = (-0.866_f64, 0.5_f64);
            for sign in [1.0_f64, -1.0] {
                let hx = (ux * cos_a - uy * sin_a * sign) * head;
                let hy = (ux * sin_a * sign + uy * cos_a) * head;
                let tip = ((p1.0 as f64 + hx) as isize, (p1.1 as f64 + hy) as isize);
                draw_line_blended(buf, cfg, x_off, p1, tip, color, alpha);
            }
        }
    }
}

/// Render the four diagnostic panels plus status bar into a new RGBA buffer.
/// Each panel is colour-mapped over its own finite range; masked cells are grey.
pub fn render_panels(snap: &Snapshot, cfg: &RenderConfig) -> Vec<u8> {
    let mut buf = vec![0u8; cfg.frame_width * cfg.frame_height * 4];
    for px in buf[..cfg.display_height * cfg.frame_width * 4].chunks_exact_mut(4) {
        px.copy_from_slice(&GAP_COLOR);
    }
    if snap.width == 0 || snap.height == 0 {
        return buf;
    }

    for (i, panel) in Panel::ALL.into_iter().enumerate() {
        let x_off = cfg.panel_x(i);
        draw_field(&mut buf, snap, cfg, panel, x_off);
        if panel == Panel::Density && cfg.arrow_stride > 0 {
            draw_quiver(&mut buf, snap, cfg, x_off);
        }
    }

    let vmax = snap.vel_norm.iter().filter(|v| v.is_finite()).fold(0.0_f64, |m, &v| m.max(v));
    let status = match FieldRange::of(&snap.density) {
        Some(r) => format!("it = {}  |  rho {:.3}-{:.3}  |  vmax {:.3e}", snap.it, r.min, r.max, vmax),
        None => format!("it = {}", snap.it),
    };
    render_status(&mut buf, cfg, &status);
    buf
}

/// Pack RGBA bytes into 0RGB words for a minifb window.
pub fn rgba_to_argb(rgba: &[u8], out: &mut Vec<u32>) {
    out.clear();
    out.extend(
        rgba.chunks_exact(4)
            .map(|px| ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32),
    );
}
