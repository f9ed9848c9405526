use std::f64::consts::PI;

use log::info;

use crate::error::{SimError, SimResult};
use crate::state::{idx_inner, FieldBatch, GridState};

use super::core::velocity_update;
use super::params::SimParams;

/// Amplitude of the cosine perturbation of the interface, in domain heights.
const INTERFACE_AMPLITUDE: f64 = 0.1;

/// Whether cell `(x, y)` lies above the perturbed interface
/// `h = 0.5 + 0.1 * cos(pi * x / res_x)`.
#[inline]
pub fn is_upper(x: usize, y: usize, res_x: usize, res_y: usize) -> bool {
    let h = y as f64 / res_y as f64;
    let w = x as f64 / res_x as f64;
    h >= 0.5 + INTERFACE_AMPLITUDE * (PI * w).cos()
}

/// Pressure balancing a density column under gravity: p = -rho * y * g_y.
pub fn hydrostatic_pressure(density: &[f64], res_x: usize, res_y: usize, gravity_y: f64) -> Vec<f64> {
    let mut pressure = vec![0.0; res_x * res_y];
    for y in 0..res_y {
        for x in 0..res_x {
            let ii = idx_inner(x, y, res_x);
            pressure[ii] = -density[ii] * y as f64 * gravity_y;
        }
    }
    pressure
}

/// Two-layer initial condition: heavy `rho2` above a cosine-perturbed
/// interface, light `rho1` below, hydrostatic pressure, and a velocity
/// corrected by that pressure. The flags of the batch are kept as given.
pub fn create_rayleigh_taylor_bcs(
    batch: FieldBatch,
    params: &SimParams,
    rho1: f64,
    rho2: f64,
) -> SimResult<GridState> {
    if !(rho1 < rho2) {
        return Err(SimError::Configuration(format!(
            "rho1 must be lighter than rho2 (rho1 = {}, rho2 = {})",
            rho1, rho2
        )));
    }
    let mut state = GridState::try_from(batch)?;
    let (nx, ny) = (state.res_x, state.res_y);

    for y in 0..ny {
        for x in 0..nx {
            let ii = idx_inner(x, y, nx);
            state.density[ii] = if is_upper(x, y, nx, ny) { rho2 } else { rho1 };
        }
    }

    let gravity = params.gravity_vec.scaled(params.buoyancy_scale);
    state.pressure = hydrostatic_pressure(&state.density, nx, ny, gravity.y);
    velocity_update(&state.pressure, &mut state.ux, &mut state.uy, &state.flags, nx, ny);

    let upper = state.density.iter().filter(|&&d| d == rho2).count();
    info!(
        "Rayleigh-Taylor BCs: {}x{}, rho1={} rho2={}, {} heavy cells, g_y={:.3e}",
        nx, ny, rho1, rho2, upper, gravity.y
    );
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FieldData;

    fn scenario() -> GridState {
        let params = SimParams::rayleigh_taylor(400);
        let batch = GridState::new_empty(107, 400).into_batch();
        create_rayleigh_taylor_bcs(batch, &params, 1.0, 2.0).unwrap()
    }

    #[test]
    fn test_interface_at_left_edge() {
        let state = scenario();
        // h = 0.5 < 0.6 at x = 0
        assert_eq!(state.density[state.idx(0, 200)], 1.0);
        assert_eq!(state.density[state.idx(0, 240)], 2.0);
        // cos(pi * w) dips below zero on the right half
        assert_eq!(state.density[state.idx(106, 200)], 2.0);
    }

    #[test]
    fn test_density_takes_only_two_values() {
        let state = scenario();
        assert!(state.density.iter().all(|&d| d == 1.0 || d == 2.0));
        for x in 0..state.res_x {
            for y in 0..state.res_y {
                let d = state.density[state.idx(x, y)];
                assert_eq!(d == 2.0, is_upper(x, y, state.res_x, state.res_y));
            }
        }
    }

    #[test]
    fn test_hydrostatic_pressure_before_correction() {
        let density = vec![2.0; 4 * 5];
        let p = hydrostatic_pressure(&density, 4, 5, 0.5);
        for y in 0..5 {
            for x in 0..4 {
                assert_eq!(p[idx_inner(x, y, 4)], -2.0 * y as f64 * 0.5);
            }
        }
    }

    #[test]
    fn test_pressure_written_into_state() {
        let state = scenario();
        let g = 0.2 / 400.0;
        let expected = hydrostatic_pressure(&state.density, 107, 400, g);
        assert_eq!(state.pressure, expected);
    }

    #[test]
    fn test_velocity_corrected_and_walls_closed() {
        let state = scenario();
        // Interior vertical faces in a uniform layer carry rho * g
        let ii = state.idx(50, 50);
        assert!((state.uy[ii] - 0.2 / 400.0).abs() < 1e-15);
        assert_eq!(state.uy[state.idx(50, 1)], 0.0);
        // No horizontal gradient away from the interface
        for x in 0..107 {
            assert_eq!(state.ux[state.idx(x, 50)], 0.0);
        }
    }

    #[test]
    fn test_flags_unchanged() {
        let state = scenario();
        assert_eq!(state.flags, crate::state::empty_domain(107, 400));
    }

    #[test]
    fn test_rejects_inverted_densities() {
        let batch = GridState::new_empty(8, 8).into_batch();
        let err = create_rayleigh_taylor_bcs(batch, &SimParams::default(), 2.0, 1.0).unwrap_err();
        assert!(matches!(err, SimError::Configuration(_)));
    }

    #[test]
    fn test_rejects_incomplete_batch() {
        let mut batch = GridState::new_empty(8, 8).into_batch();
        batch.fields.remove("p");
        let err = create_rayleigh_taylor_bcs(batch, &SimParams::default(), 1.0, 2.0).unwrap_err();
        assert!(matches!(err, SimError::Configuration(_)));
    }

    #[test]
    fn test_rejects_shape_mismatch() {
        let mut batch = GridState::new_empty(8, 8).into_batch();
        batch.insert("density", FieldData::Scalar(vec![0.0; 10]));
        let err = create_rayleigh_taylor_bcs(batch, &SimParams::default(), 1.0, 2.0).unwrap_err();
        assert!(matches!(err, SimError::Precondition(_)));
    }
}
