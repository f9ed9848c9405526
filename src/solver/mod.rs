mod boundary;
pub mod core;
pub mod diagnostics;
mod forces;
mod learned;
mod params;
mod projection;

// Re-export public API
pub use boundary::create_rayleigh_taylor_bcs;
pub use diagnostics::{extract, FieldStats, Snapshot, Window};
pub use params::SimParams;
pub use projection::{build_projection, Projected, Projection, ProjectionMethod};

use crate::error::{SimError, SimResult};
use crate::state::GridState;
use self::core::{advect_scalar, advect_velocity, diffuse_velocity, set_wall_bcs, DIFFUSE_ITER};
use forces::{apply_buoyancy, apply_gravity};

/// Advance the state by one time step.
pub fn step(params: &SimParams, state: &mut GridState, projection: &dyn Projection) -> SimResult<()> {
    state.check_shapes()?;
    let dt = params.dt;
    let (nx, ny) = (state.res_x, state.res_y);

    // Advect density and velocity through the pre-step velocity
    let density = advect_scalar(
        &state.density,
        &state.ux,
        &state.uy,
        &state.flags,
        dt,
        params.maccormack_strength,
        nx,
        ny,
    );
    let (ux, uy) = advect_velocity(&state.ux, &state.uy, &state.flags, dt, params.maccormack_strength, nx, ny);
    state.density = density;
    state.ux = ux;
    state.uy = uy;
    set_wall_bcs(&mut state.ux, &mut state.uy, &state.flags, nx, ny);

    // Body forces
    let direction = params.gravity_vec.normalized();
    if params.buoyancy_scale > 0.0 {
        let g = direction.scaled(params.buoyancy_scale);
        apply_buoyancy(&mut state.ux, &mut state.uy, &state.flags, &state.density, g, dt, nx, ny);
    }
    if params.gravity_scale > 0.0 {
        let g = direction.scaled(params.gravity_scale);
        apply_gravity(&mut state.ux, &mut state.uy, &state.flags, g, dt, nx, ny);
    }

    if params.viscosity > 0.0 {
        diffuse_velocity(&mut state.ux, &mut state.uy, &state.flags, params.viscosity, dt, DIFFUSE_ITER, nx, ny);
        set_wall_bcs(&mut state.ux, &mut state.uy, &state.flags, nx, ny);
    }

    let Projected { pressure, ux, uy } = projection.project(state, params)?;
    let expected = state.cell_count();
    if pressure.len() != expected || ux.len() != expected || uy.len() != expected {
        return Err(SimError::Precondition(format!(
            "{} projection returned {}/{}/{} values, expected {}",
            projection.name(),
            pressure.len(),
            ux.len(),
            uy.len(),
            expected
        )));
    }
    state.pressure = pressure;
    state.ux = ux;
    state.uy = uy;

    set_wall_bcs(&mut state.ux, &mut state.uy, &state.flags, nx, ny);
    Ok(())
}
