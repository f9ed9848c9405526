use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use crate::checkpoint;
use crate::config::{ModelDir, RunConfig};
use crate::error::{SimError, SimResult};
use crate::output::OutputSink;
use crate::solver::{self, build_projection, create_rayleigh_taylor_bcs, extract, FieldStats, Projection, SimParams, Window};
use crate::state::GridState;

/// Outcome of [`Simulation::run`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub steps: u64,
    pub extractions: u64,
    pub final_it: u64,
    pub interrupted: bool,
}

/// One simulation instance: parameters, the single owned state, the
/// iteration counter and the projection strategy.
pub struct Simulation {
    params: SimParams,
    state: GridState,
    it: u64,
    projection: Box<dyn Projection>,
}

impl Simulation {
    pub fn new(params: SimParams, state: GridState, it: u64, projection: Box<dyn Projection>) -> SimResult<Self> {
        params.validate()?;
        state.check_shapes()?;
        Ok(Self { params, state, it, projection })
    }

    pub fn state(&self) -> &GridState {
        &self.state
    }

    pub fn it(&self) -> u64 {
        self.it
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    /// Step until `max_iter`, extracting every `out_iter` iterations.
    /// A checkpoint taken after step `it` records `it + 1`, so a restart
    /// resumes at the step after the checkpoint.
    pub fn run(
        &mut self,
        max_iter: u64,
        out_iter: u64,
        window: &Window,
        sink: &mut dyn OutputSink,
        checkpoint_path: Option<&Path>,
        running: &AtomicBool,
    ) -> SimResult<RunSummary> {
        if out_iter == 0 {
            return Err(SimError::Configuration("out_iter must be >= 1".into()));
        }
        window.check(self.state.res_x, self.state.res_y)?;
        let with_divergence = sink.wants_divergence();
        info!(
            "Running {} projection from it = {} to {} (output every {})",
            self.projection.name(),
            self.it,
            max_iter,
            out_iter
        );

        let mut summary = RunSummary { steps: 0, extractions: 0, final_it: self.it, interrupted: false };
        while self.it < max_iter {
            if !running.load(Ordering::SeqCst) {
                summary.interrupted = true;
                break;
            }

            solver::step(&self.params, &mut self.state, self.projection.as_ref())?;
            summary.steps += 1;

            if self.it % out_iter == 0 {
                info!("It = {}", self.it);
                let snap = extract(&self.state, window, with_divergence, self.it)?;
                sink.emit(&snap)?;
                summary.extractions += 1;

                let stats = FieldStats::compute(&self.state);
                info!(
                    "  KE = {:.4e}, max|div| = {:.3e}, rho in [{:.4}, {:.4}], mass = {:.6e}",
                    stats.kinetic_energy, stats.max_divergence, stats.density_min, stats.density_max, stats.mass
                );
                if let Some(path) = checkpoint_path {
                    checkpoint::save(path, &self.state, self.it + 1)?;
                }
                if !sink.is_open() {
                    info!("Output closed; stopping after it = {}", self.it);
                    running.store(false, Ordering::SeqCst);
                }
            } else {
                debug!("it = {}", self.it);
            }
            self.it += 1;
        }

        if summary.interrupted {
            warn!("Interrupted at it = {}", self.it);
        }
        sink.finish()?;
        summary.final_it = self.it;
        Ok(summary)
    }
}

/// Build the simulation described by `cfg`: restore the checkpoint when
/// restarting, otherwise lay out an empty box with the two-layer BCs.
pub fn prepare(cfg: &RunConfig, model: &ModelDir) -> SimResult<Simulation> {
    let method = cfg.method()?;
    let (state, it, params) = if cfg.run.restart {
        let (state, it) = checkpoint::load(&cfg.restart_path())?;
        let params = model.sim_params(state.res_y)?;
        info!("Restarting at it = {}", it);
        (state, it, params)
    } else {
        let sc = &cfg.scenario;
        let params = model.sim_params(sc.res_y)?;
        let batch = GridState::new_empty(sc.res_x, sc.res_y).into_batch();
        let state = create_rayleigh_taylor_bcs(batch, &params, sc.rho1, sc.rho2)?;
        (state, 0, params)
    };
    info!(
        "Grid {}x{}, dt = {}, jacobiIter = {}, maccormack = {}, buoyancy = {:.3e}",
        state.res_x, state.res_y, params.dt, params.jacobi_iter, params.maccormack_strength, params.buoyancy_scale
    );
    let projection = build_projection(method, model.path(), cfg.run.jacobi_tolerance)?;
    Simulation::new(params, state, it, projection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::NullSink;
    use crate::solver::{ProjectionMethod, Snapshot};
    use std::fs;

    /// Records the iteration of every snapshot; closes after `close_after`.
    #[derive(Default)]
    struct Recorder {
        its: Vec<u64>,
        close_after: Option<usize>,
        finished: bool,
    }

    impl OutputSink for Recorder {
        fn emit(&mut self, snap: &Snapshot) -> SimResult<()> {
            self.its.push(snap.it);
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.close_after.map_or(true, |n| self.its.len() < n)
        }

        fn finish(&mut self) -> SimResult<()> {
            self.finished = true;
            Ok(())
        }
    }

    fn small_sim(it: u64) -> Simulation {
        let params = SimParams::rayleigh_taylor(24);
        let batch = GridState::new_empty(12, 24).into_batch();
        let state = create_rayleigh_taylor_bcs(batch, &params, 1.0, 2.0).unwrap();
        let projection = build_projection(ProjectionMethod::Jacobi, Path::new("."), 0.0).unwrap();
        Simulation::new(params, state, it, projection).unwrap()
    }

    #[test]
    fn test_extraction_cadence() {
        let mut sim = small_sim(0);
        let mut sink = Recorder::default();
        let running = AtomicBool::new(true);
        let summary = sim.run(25, 10, &Window::full(12, 24), &mut sink, None, &running).unwrap();
        assert_eq!(summary, RunSummary { steps: 25, extractions: 3, final_it: 25, interrupted: false });
        assert_eq!(sink.its, vec![0, 10, 20]);
        assert!(sink.finished);
    }

    #[test]
    fn test_resume_from_restart_counter() {
        let mut sim = small_sim(15);
        let mut sink = Recorder::default();
        let running = AtomicBool::new(true);
        let summary = sim.run(40, 10, &Window::full(12, 24), &mut sink, None, &running).unwrap();
        assert_eq!(summary.steps, 25);
        assert_eq!(sink.its, vec![20, 30]);
        assert_eq!(sim.it(), 40);
    }

    #[test]
    fn test_nothing_to_do_past_max_iter() {
        let mut sim = small_sim(50);
        let mut sink = NullSink::default();
        let running = AtomicBool::new(true);
        let summary = sim.run(50, 10, &Window::full(12, 24), &mut sink, None, &running).unwrap();
        assert_eq!(summary.steps, 0);
        assert_eq!(sink.emitted, 0);
    }

    #[test]
    fn test_zero_out_iter_rejected() {
        let mut sim = small_sim(0);
        let running = AtomicBool::new(true);
        let err = sim.run(10, 0, &Window::full(12, 24), &mut NullSink::default(), None, &running).unwrap_err();
        assert!(matches!(err, SimError::Configuration(_)));
    }

    #[test]
    fn test_bad_window_rejected_before_stepping() {
        let mut sim = small_sim(0);
        let running = AtomicBool::new(true);
        let window = Window { min_x: 0, max_x: 40, min_y: 0, max_y: 24 };
        let err = sim.run(10, 5, &window, &mut NullSink::default(), None, &running).unwrap_err();
        assert!(matches!(err, SimError::Precondition(_)));
        assert_eq!(sim.it(), 0);
    }

    #[test]
    fn test_interrupt_flag_stops_loop() {
        let mut sim = small_sim(0);
        let running = AtomicBool::new(false);
        let summary = sim.run(10, 5, &Window::full(12, 24), &mut NullSink::default(), None, &running).unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.steps, 0);
    }

    #[test]
    fn test_closed_sink_stops_loop() {
        let mut sim = small_sim(0);
        let mut sink = Recorder { close_after: Some(2), ..Recorder::default() };
        let running = AtomicBool::new(true);
        let summary = sim.run(100, 5, &Window::full(12, 24), &mut sink, None, &running).unwrap();
        assert!(summary.interrupted);
        assert_eq!(sink.its, vec![0, 5]);
        assert_eq!(summary.final_it, 6);
    }

    #[test]
    fn test_checkpoint_written_at_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/restart.ckpt");
        let mut sim = small_sim(0);
        let running = AtomicBool::new(true);
        sim.run(12, 5, &Window::full(12, 24), &mut NullSink::default(), Some(&path), &running).unwrap();
        let (state, it) = checkpoint::load(&path).unwrap();
        assert_eq!(it, 11);
        assert_eq!((state.res_x, state.res_y), (12, 24));
    }

    #[test]
    fn test_prepare_fresh_and_restart() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let conf = format!(
            "scenario:\n  res_x: 10\n  res_y: 20\nrun:\n  max_iter: 7\n  out_iter: 3\n  folder: {}\n",
            out.display()
        );
        fs::write(dir.path().join("conf.yaml"), conf).unwrap();
        let model = ModelDir::open(dir.path()).unwrap();
        let mut cfg = model.run_config().unwrap();

        let mut sim = prepare(&cfg, &model).unwrap();
        assert_eq!(sim.it(), 0);
        assert_eq!(sim.params().buoyancy_scale, 0.2 / 20.0);
        let running = AtomicBool::new(true);
        let window = cfg.window.to_window(10, 20);
        sim.run(cfg.run.max_iter, cfg.run.out_iter, &window, &mut NullSink::default(), Some(&cfg.restart_path()), &running)
            .unwrap();

        cfg.run.restart = true;
        let resumed = prepare(&cfg, &model).unwrap();
        assert_eq!(resumed.it(), 7);
        assert_eq!(resumed.state(), sim.state());
    }

    #[test]
    fn test_prepare_restart_without_checkpoint_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let model = ModelDir::open(dir.path()).unwrap();
        let mut cfg = RunConfig::default();
        cfg.run.folder = dir.path().join("missing");
        cfg.run.restart = true;
        assert!(matches!(prepare(&cfg, &model), Err(SimError::NotFound(_))));
    }
}
