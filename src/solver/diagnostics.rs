use crate::error::{SimError, SimResult};
use crate::state::{idx_inner, GridState};

use super::core::{get_centered, velocity_divergence};

/// Half-open cell window `[min_x, max_x) x [min_y, max_y)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub min_x: usize,
    pub max_x: usize,
    pub min_y: usize,
    pub max_y: usize,
}

impl Window {
    pub fn full(res_x: usize, res_y: usize) -> Self {
        Self { min_x: 0, max_x: res_x, min_y: 0, max_y: res_y }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.max_x.saturating_sub(self.min_x)
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.max_y.saturating_sub(self.min_y)
    }

    pub fn check(&self, res_x: usize, res_y: usize) -> SimResult<()> {
        if self.min_x >= self.max_x || self.min_y >= self.max_y || self.max_x > res_x || self.max_y > res_y {
            return Err(SimError::Precondition(format!(
                "window x[{}, {}) y[{}, {}) is empty or outside the {}x{} grid",
                self.min_x, self.max_x, self.min_y, self.max_y, res_x, res_y
            )));
        }
        Ok(())
    }
}

/// Window-sized copies of the fields at one iteration. Solid cells are NaN.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub it: u64,
    pub width: usize,
    pub height: usize,
    /// Where the snapshot sits in the full grid.
    pub window: Window,
    /// Full grid height; one cell spans `1 / res_y` in domain units.
    pub res_y: usize,
    pub velx: Vec<f64>,
    pub vely: Vec<f64>,
    pub vel_norm: Vec<f64>,
    pub pressure: Vec<f64>,
    pub density: Vec<f64>,
    pub divergence: Option<Vec<f64>>,
}

/// One down-sampled velocity arrow, at cell center `(x, y)` of the window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Arrow {
    pub x: usize,
    pub y: usize,
    pub vx: f64,
    pub vy: f64,
}

impl Snapshot {
    /// Every `stride`-th cell in both directions, skipping masked ones.
    pub fn subsample(&self, stride: usize) -> Vec<Arrow> {
        let stride = stride.max(1);
        let mut arrows = Vec::new();
        for y in (0..self.height).step_by(stride) {
            for x in (0..self.width).step_by(stride) {
                let ii = idx_inner(x, y, self.width);
                let (vx, vy) = (self.velx[ii], self.vely[ii]);
                if vx.is_finite() && vy.is_finite() {
                    arrows.push(Arrow { x, y, vx, vy });
                }
            }
        }
        arrows
    }
}

/// Copy `field` over `window`, NaN where the cell is solid.
fn masked(state: &GridState, field: &[f64], window: &Window) -> Vec<f64> {
    let mut out = Vec::with_capacity(window.width() * window.height());
    for y in window.min_y..window.max_y {
        for x in window.min_x..window.max_x {
            let ii = state.idx(x, y);
            out.push(if state.flags[ii].is_solid() { f64::NAN } else { field[ii] });
        }
    }
    out
}

/// Extract the diagnostic fields over `window`.
pub fn extract(state: &GridState, window: &Window, with_divergence: bool, it: u64) -> SimResult<Snapshot> {
    state.check_shapes()?;
    window.check(state.res_x, state.res_y)?;
    let (nx, ny) = (state.res_x, state.res_y);

    let (cx, cy) = get_centered(&state.ux, &state.uy, nx, ny);
    let norm: Vec<f64> = cx.iter().zip(&cy).map(|(a, b)| (a * a + b * b).sqrt()).collect();
    let divergence = with_divergence.then(|| {
        let div = velocity_divergence(&state.ux, &state.uy, &state.flags, nx, ny);
        masked(state, &div, window)
    });

    Ok(Snapshot {
        it,
        width: window.width(),
        height: window.height(),
        window: *window,
        res_y: ny,
        velx: masked(state, &cx, window),
        vely: masked(state, &cy, window),
        vel_norm: masked(state, &norm, window),
        pressure: masked(state, &state.pressure, window),
        density: masked(state, &state.density, window),
        divergence,
    })
}

/// Scalar summary logged at each output iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldStats {
    /// 0.5 * sum(rho * |u|^2) over fluid cells, centered velocity.
    pub kinetic_energy: f64,
    pub max_divergence: f64,
    pub density_min: f64,
    pub density_max: f64,
    /// Sum of density over fluid cells.
    pub mass: f64,
}

impl FieldStats {
    pub fn compute(state: &GridState) -> Self {
        let (nx, ny) = (state.res_x, state.res_y);
        let (cx, cy) = get_centered(&state.ux, &state.uy, nx, ny);
        let div = velocity_divergence(&state.ux, &state.uy, &state.flags, nx, ny);
        let mut stats = FieldStats {
            kinetic_energy: 0.0,
            max_divergence: 0.0,
            density_min: f64::INFINITY,
            density_max: f64::NEG_INFINITY,
            mass: 0.0,
        };
        for (i, flag) in state.flags.iter().enumerate() {
            if !flag.is_fluid() {
                continue;
            }
            let rho = state.density[i];
            stats.kinetic_energy += 0.5 * rho * (cx[i] * cx[i] + cy[i] * cy[i]);
            stats.max_divergence = stats.max_divergence.max(div[i].abs());
            stats.density_min = stats.density_min.min(rho);
            stats.density_max = stats.density_max.max(rho);
            stats.mass += rho;
        }
        stats
    }
}
