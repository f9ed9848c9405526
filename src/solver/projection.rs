use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::debug;

use crate::error::{SimError, SimResult};
use crate::state::{idx_inner, CellFlag, GridState};

use super::core::{velocity_divergence, velocity_update};
use super::learned::LearnedProjection;
use super::params::SimParams;

/// File name of the learned weights inside a model directory.
pub const WEIGHTS_FILE: &str = "weights.json";

/// Pressure and corrected velocity returned by a projection.
#[derive(Clone, Debug, PartialEq)]
pub struct Projected {
    pub pressure: Vec<f64>,
    pub ux: Vec<f64>,
    pub uy: Vec<f64>,
}

/// A pressure-projection strategy. Implementations read the state and
/// return new buffers; the step engine decides what to do with them.
pub trait Projection {
    fn name(&self) -> &str;
    fn project(&self, state: &GridState, params: &SimParams) -> SimResult<Projected>;
}

/// Apply a pressure field to clones of the state's velocity.
pub(super) fn apply_pressure(state: &GridState, pressure: Vec<f64>) -> Projected {
    let mut ux = state.ux.clone();
    let mut uy = state.uy.clone();
    velocity_update(&pressure, &mut ux, &mut uy, &state.flags, state.res_x, state.res_y);
    Projected { pressure, ux, uy }
}

/// Classical Jacobi pressure solve.
#[derive(Clone, Debug, Default)]
pub struct JacobiProjection {
    /// Stop early once the largest per-sweep pressure change drops below
    /// this. Zero always runs `jacobi_iter` sweeps.
    pub tolerance: f64,
}

impl JacobiProjection {
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

/// Jacobi sweeps for sum_n (p_i - p_n) = -div_i over non-solid neighbours.
/// Empty neighbours are held at zero pressure; solid ones drop out.
/// Returns the pressure and the number of sweeps performed.
pub fn solve_pressure(
    div: &[f64],
    flags: &[CellFlag],
    iter: usize,
    tolerance: f64,
    nx: usize,
    ny: usize,
) -> (Vec<f64>, usize) {
    let mut p = vec![0.0; nx * ny];
    let mut next = vec![0.0; nx * ny];
    let mut sweeps = 0;
    for _ in 0..iter {
        let mut max_change = 0.0_f64;
        for j in 0..ny {
            for i in 0..nx {
                let ii = idx_inner(i, j, nx);
                if !flags[ii].is_fluid() {
                    next[ii] = 0.0;
                    continue;
                }
                let neighbours = [
                    (i > 0).then(|| idx_inner(i - 1, j, nx)),
                    (i + 1 < nx).then(|| idx_inner(i + 1, j, nx)),
                    (j > 0).then(|| idx_inner(i, j - 1, nx)),
                    (j + 1 < ny).then(|| idx_inner(i, j + 1, nx)),
                ];
                let mut sum = 0.0;
                let mut count = 0.0;
                for n in neighbours.into_iter().flatten() {
                    match flags[n] {
                        CellFlag::Solid => {}
                        CellFlag::Fluid => {
                            sum += p[n];
                            count += 1.0;
                        }
                        CellFlag::Empty => count += 1.0,
                    }
                }
                next[ii] = if count > 0.0 { (sum - div[ii]) / count } else { 0.0 };
                max_change = max_change.max((next[ii] - p[ii]).abs());
            }
        }
        std::mem::swap(&mut p, &mut next);
        sweeps += 1;
        if tolerance > 0.0 && max_change < tolerance {
            break;
        }
    }
    (p, sweeps)
}

impl Projection for JacobiProjection {
    fn name(&self) -> &str {
        "jacobi"
    }

    fn project(&self, state: &GridState, params: &SimParams) -> SimResult<Projected> {
        let (nx, ny) = (state.res_x, state.res_y);
        let div = velocity_divergence(&state.ux, &state.uy, &state.flags, nx, ny);
        let (pressure, sweeps) = solve_pressure(&div, &state.flags, params.jacobi_iter, self.tolerance, nx, ny);
        debug!("jacobi: {} sweeps", sweeps);
        Ok(apply_pressure(state, pressure))
    }
}

/// Projection method selected in the run configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionMethod {
    Jacobi,
    Learned,
}

impl FromStr for ProjectionMethod {
    type Err = SimError;

    fn from_str(s: &str) -> SimResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jacobi" => Ok(ProjectionMethod::Jacobi),
            "learned" | "convnet" => Ok(ProjectionMethod::Learned),
            other => Err(SimError::Configuration(format!(
                "unknown projection method '{}' (expected jacobi or learned)",
                other
            ))),
        }
    }
}

impl fmt::Display for ProjectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionMethod::Jacobi => write!(f, "jacobi"),
            ProjectionMethod::Learned => write!(f, "learned"),
        }
    }
}

/// Instantiate the strategy for `method`. The learned variant reads
/// `weights.json` from `model_dir`; `jacobi_tolerance` only applies to Jacobi.
pub fn build_projection(
    method: ProjectionMethod,
    model_dir: &Path,
    jacobi_tolerance: f64,
) -> SimResult<Box<dyn Projection>> {
    match method {
        ProjectionMethod::Jacobi => Ok(Box::new(JacobiProjection::with_tolerance(jacobi_tolerance))),
        ProjectionMethod::Learned => {
            let model = LearnedProjection::load(&model_dir.join(WEIGHTS_FILE))?;
            Ok(Box::new(model))
        }
    }
}
