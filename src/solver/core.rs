use crate::state::{idx_inner, CellFlag};

/// Gauss-Seidel sweeps used by implicit diffusion.
pub const DIFFUSE_ITER: usize = 20;

/// Sample offsets (in cells) of each staggered quantity relative to the
/// cell's lower-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Stagger {
    Center,
    FaceX,
    FaceY,
}

impl Stagger {
    #[inline]
    fn offset(self) -> (f64, f64) {
        match self {
            Stagger::Center => (0.5, 0.5),
            Stagger::FaceX => (0.0, 0.5),
            Stagger::FaceY => (0.5, 0.0),
        }
    }
}

/// A face carries flow when neither side is solid and at least one side is fluid.
#[inline]
fn open_face(a: CellFlag, b: CellFlag) -> bool {
    !a.is_solid() && !b.is_solid() && (a.is_fluid() || b.is_fluid())
}

/// Whether the x-face on the left of cell `(x, y)` carries flow.
#[inline]
pub fn is_open_face_x(flags: &[CellFlag], x: usize, y: usize, nx: usize) -> bool {
    x > 0 && open_face(flags[idx_inner(x - 1, y, nx)], flags[idx_inner(x, y, nx)])
}

/// Whether the y-face below cell `(x, y)` carries flow.
#[inline]
pub fn is_open_face_y(flags: &[CellFlag], x: usize, y: usize, nx: usize) -> bool {
    y > 0 && open_face(flags[idx_inner(x, y - 1, nx)], flags[idx_inner(x, y, nx)])
}

/// Bilinear sample of a staggered field at grid position `(px, py)`.
/// Positions outside the stored samples are clamped to the border.
/// Returns `(value, stencil_min, stencil_max)`.
pub fn sample(field: &[f64], nx: usize, ny: usize, px: f64, py: f64, stagger: Stagger) -> (f64, f64, f64) {
    let (ox, oy) = stagger.offset();
    let fx = (px - ox).clamp(0.0, (nx - 1) as f64);
    let fy = (py - oy).clamp(0.0, (ny - 1) as f64);
    let i0 = (fx.floor() as usize).min(nx - 2);
    let j0 = (fy.floor() as usize).min(ny - 2);
    let (i1, j1) = (i0 + 1, j0 + 1);
    let s1 = fx - i0 as f64;
    let s0 = 1.0 - s1;
    let t1 = fy - j0 as f64;
    let t0 = 1.0 - t1;

    let a = field[idx_inner(i0, j0, nx)];
    let b = field[idx_inner(i0, j1, nx)];
    let c = field[idx_inner(i1, j0, nx)];
    let d = field[idx_inner(i1, j1, nx)];
    let value = s0 * (t0 * a + t1 * b) + s1 * (t0 * c + t1 * d);
    let lo = a.min(b).min(c).min(d);
    let hi = a.max(b).max(c).max(d);
    (value, lo, hi)
}

/// Velocity vector at an arbitrary grid position, interpolated from the faces.
#[inline]
pub fn velocity_at(ux: &[f64], uy: &[f64], nx: usize, ny: usize, px: f64, py: f64) -> (f64, f64) {
    let (vx, _, _) = sample(ux, nx, ny, px, py, Stagger::FaceX);
    let (vy, _, _) = sample(uy, nx, ny, px, py, Stagger::FaceY);
    (vx, vy)
}

/// Advect one staggered quantity with semi-Lagrangian backtracing plus a
/// MacCormack correction of the given strength. Only entries selected by
/// `active` move; everything else is copied from `src`.
fn advect_component(
    src: &[f64],
    ux: &[f64],
    uy: &[f64],
    stagger: Stagger,
    active: &dyn Fn(usize, usize) -> bool,
    dt: f64,
    strength: f64,
    nx: usize,
    ny: usize,
) -> Vec<f64> {
    let (ox, oy) = stagger.offset();
    let mut fwd = src.to_vec();
    let mut lo = vec![0.0; src.len()];
    let mut hi = vec![0.0; src.len()];

    // Forward semi-Lagrangian step
    for y in 0..ny {
        for x in 0..nx {
            if !active(x, y) {
                continue;
            }
            let ii = idx_inner(x, y, nx);
            let px = x as f64 + ox;
            let py = y as f64 + oy;
            let (vx, vy) = velocity_at(ux, uy, nx, ny, px, py);
            let (v, mn, mx) = sample(src, nx, ny, px - dt * vx, py - dt * vy, stagger);
            fwd[ii] = v;
            lo[ii] = mn;
            hi[ii] = mx;
        }
    }
    if strength <= 0.0 {
        return fwd;
    }

    // Backward step from the forward result, then correct and clamp
    let mut out = fwd.clone();
    for y in 0..ny {
        for x in 0..nx {
            if !active(x, y) {
                continue;
            }
            let ii = idx_inner(x, y, nx);
            let px = x as f64 + ox;
            let py = y as f64 + oy;
            let (vx, vy) = velocity_at(ux, uy, nx, ny, px, py);
            let (bwd, _, _) = sample(&fwd, nx, ny, px + dt * vx, py + dt * vy, stagger);
            let corrected = fwd[ii] + strength * 0.5 * (src[ii] - bwd);
            // Out-of-range corrections revert to the first-order value
            out[ii] = if corrected < lo[ii] || corrected > hi[ii] { fwd[ii] } else { corrected };
        }
    }
    out
}

/// Advect a cell-centered scalar through the staggered velocity field.
/// Non-fluid cells keep their value.
pub fn advect_scalar(
    src: &[f64],
    ux: &[f64],
    uy: &[f64],
    flags: &[CellFlag],
    dt: f64,
    strength: f64,
    nx: usize,
    ny: usize,
) -> Vec<f64> {
    let active = |x: usize, y: usize| flags[idx_inner(x, y, nx)].is_fluid();
    advect_component(src, ux, uy, Stagger::Center, &active, dt, strength, nx, ny)
}

/// Self-advect the staggered velocity. Both components are traced through
/// the pre-step field; closed faces keep their value.
pub fn advect_velocity(
    ux: &[f64],
    uy: &[f64],
    flags: &[CellFlag],
    dt: f64,
    strength: f64,
    nx: usize,
    ny: usize,
) -> (Vec<f64>, Vec<f64>) {
    let open_x = |x: usize, y: usize| is_open_face_x(flags, x, y, nx);
    let open_y = |x: usize, y: usize| is_open_face_y(flags, x, y, nx);
    let new_ux = advect_component(ux, ux, uy, Stagger::FaceX, &open_x, dt, strength, nx, ny);
    let new_uy = advect_component(uy, ux, uy, Stagger::FaceY, &open_y, dt, strength, nx, ny);
    (new_ux, new_uy)
}

/// Discrete divergence per cell. Zero outside fluid cells and on the last
/// row/column, which have no outgoing face stored.
pub fn velocity_divergence(ux: &[f64], uy: &[f64], flags: &[CellFlag], nx: usize, ny: usize) -> Vec<f64> {
    let mut div = vec![0.0; nx * ny];
    for y in 0..ny.saturating_sub(1) {
        for x in 0..nx.saturating_sub(1) {
            let ii = idx_inner(x, y, nx);
            if !flags[ii].is_fluid() {
                continue;
            }
            div[ii] = (ux[idx_inner(x + 1, y, nx)] - ux[ii]) + (uy[idx_inner(x, y + 1, nx)] - uy[ii]);
        }
    }
    div
}

/// No flow through solid cells or through the domain's lower/left edge.
pub fn set_wall_bcs(ux: &mut [f64], uy: &mut [f64], flags: &[CellFlag], nx: usize, ny: usize) {
    for y in 0..ny {
        for x in 0..nx {
            let ii = idx_inner(x, y, nx);
            let here = flags[ii].is_solid();
            if x == 0 || here || flags[idx_inner(x - 1, y, nx)].is_solid() {
                ux[ii] = 0.0;
            }
            if y == 0 || here || flags[idx_inner(x, y - 1, nx)].is_solid() {
                uy[ii] = 0.0;
            }
        }
    }
}

/// Subtract the pressure gradient from every open face. Empty cells count
/// as zero pressure; faces touching a solid are closed afterwards.
pub fn velocity_update(pressure: &[f64], ux: &mut [f64], uy: &mut [f64], flags: &[CellFlag], nx: usize, ny: usize) {
    let p_of = |i: usize| if flags[i].is_fluid() { pressure[i] } else { 0.0 };
    for y in 0..ny {
        for x in 0..nx {
            let ii = idx_inner(x, y, nx);
            if is_open_face_x(flags, x, y, nx) {
                ux[ii] -= p_of(ii) - p_of(idx_inner(x - 1, y, nx));
            }
            if is_open_face_y(flags, x, y, nx) {
                uy[ii] -= p_of(ii) - p_of(idx_inner(x, y - 1, nx));
            }
        }
    }
    set_wall_bcs(ux, uy, flags, nx, ny);
}

/// Cell-centered velocity: average of the two faces bounding each cell.
/// The last row/column has no far face and reuses the near one.
pub fn get_centered(ux: &[f64], uy: &[f64], nx: usize, ny: usize) -> (Vec<f64>, Vec<f64>) {
    let mut cx = vec![0.0; nx * ny];
    let mut cy = vec![0.0; nx * ny];
    for y in 0..ny {
        for x in 0..nx {
            let ii = idx_inner(x, y, nx);
            let right = if x + 1 < nx { ux[idx_inner(x + 1, y, nx)] } else { ux[ii] };
            let top = if y + 1 < ny { uy[idx_inner(x, y + 1, nx)] } else { uy[ii] };
            cx[ii] = 0.5 * (ux[ii] + right);
            cy[ii] = 0.5 * (uy[ii] + top);
        }
    }
    (cx, cy)
}

/// Gauss-Seidel solver restricted to one set of open faces.
/// Solves: x[f] = (x0[f] + a * sum(open neighbours)) / (1 + a * count).
/// Closed neighbours drop out of the stencil (Neumann).
fn lin_solve_faces(
    x: &mut [f64],
    x0: &[f64],
    a: f64,
    iter: usize,
    open: &dyn Fn(usize, usize) -> bool,
    nx: usize,
    ny: usize,
) {
    for _ in 0..iter {
        for j in 0..ny {
            for i in 0..nx {
                if !open(i, j) {
                    continue;
                }
                let mut sum = 0.0;
                let mut count = 0.0;
                let neighbours = [
                    (i > 0).then(|| (i - 1, j)),
                    (i + 1 < nx).then(|| (i + 1, j)),
                    (j > 0).then(|| (i, j - 1)),
                    (j + 1 < ny).then(|| (i, j + 1)),
                ];
                for (ni, nj) in neighbours.into_iter().flatten() {
                    if open(ni, nj) {
                        sum += x[idx_inner(ni, nj, nx)];
                        count += 1.0;
                    }
                }
                let ii = idx_inner(i, j, nx);
                x[ii] = (x0[ii] + a * sum) / (1.0 + a * count);
            }
        }
    }
}

/// Implicit viscous diffusion of both velocity components.
/// a = dt * viscosity (unit cell size).
pub fn diffuse_velocity(
    ux: &mut [f64],
    uy: &mut [f64],
    flags: &[CellFlag],
    viscosity: f64,
    dt: f64,
    iter: usize,
    nx: usize,
    ny: usize,
) {
    let a = dt * viscosity;
    if a <= 0.0 {
        return;
    }
    let open_x = |x: usize, y: usize| is_open_face_x(flags, x, y, nx);
    let open_y = |x: usize, y: usize| is_open_face_y(flags, x, y, nx);
    let ux0 = ux.to_vec();
    let uy0 = uy.to_vec();
    lin_solve_faces(ux, &ux0, a, iter, &open_x, nx, ny);
    lin_solve_faces(uy, &uy0, a, iter, &open_y, nx, ny);
}
