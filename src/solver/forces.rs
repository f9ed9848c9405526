use crate::state::{idx_inner, CellFlag};

use super::params::GravityVec;

/// Faces between two fluid cells, visited as `(face_index, lower_cell, upper_cell)`
/// along x then y.
fn for_each_fluid_face(
    flags: &[CellFlag],
    nx: usize,
    ny: usize,
    mut fx: impl FnMut(usize, usize, usize),
    mut fy: impl FnMut(usize, usize, usize),
) {
    for j in 0..ny {
        for i in 0..nx {
            let ii = idx_inner(i, j, nx);
            if !flags[ii].is_fluid() {
                continue;
            }
            if i > 0 {
                let left = idx_inner(i - 1, j, nx);
                if flags[left].is_fluid() {
                    fx(ii, left, ii);
                }
            }
            if j > 0 {
                let below = idx_inner(i, j - 1, nx);
                if flags[below].is_fluid() {
                    fy(ii, below, ii);
                }
            }
        }
    }
}

/// Density-weighted body force on fluid faces.
/// u_face += -g * dt * avg(rho), with `gravity` already scaled.
/// Heavier fluid is pushed harder against `gravity`'s direction.
pub(super) fn apply_buoyancy(
    ux: &mut [f64],
    uy: &mut [f64],
    flags: &[CellFlag],
    density: &[f64],
    gravity: GravityVec,
    dt: f64,
    nx: usize,
    ny: usize,
) {
    let sx = -gravity.x * dt;
    let sy = -gravity.y * dt;
    let mut dux = Vec::new();
    let mut duy = Vec::new();
    for_each_fluid_face(
        flags,
        nx,
        ny,
        |f, a, b| dux.push((f, sx * 0.5 * (density[a] + density[b]))),
        |f, a, b| duy.push((f, sy * 0.5 * (density[a] + density[b]))),
    );
    for (f, d) in dux {
        ux[f] += d;
    }
    for (f, d) in duy {
        uy[f] += d;
    }
}

/// Uniform acceleration on fluid faces: u_face += -g * dt.
pub(super) fn apply_gravity(
    ux: &mut [f64],
    uy: &mut [f64],
    flags: &[CellFlag],
    gravity: GravityVec,
    dt: f64,
    nx: usize,
    ny: usize,
) {
    let sx = -gravity.x * dt;
    let sy = -gravity.y * dt;
    for_each_fluid_face(flags, nx, ny, |f, _, _| ux[f] += sx, |f, _, _| uy[f] += sy);
}
