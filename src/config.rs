use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

use crate::error::{SimError, SimResult};
use crate::solver::{ProjectionMethod, SimParams, Window};

/// Run configuration file inside a model directory.
pub const CONF_FILE: &str = "conf.yaml";
/// Simulation parameters file inside a model directory.
pub const MCONF_FILE: &str = "mconf.yaml";
/// Checkpoint written into the output folder.
pub const RESTART_FILE: &str = "restart.ckpt";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub scenario: ScenarioConfig,
    pub run: RunSection,
    pub window: WindowConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub res_x: usize,
    pub res_y: usize,
    pub rho1: f64,
    pub rho2: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub max_iter: u64,
    pub out_iter: u64,
    /// `jacobi` or `learned`.
    pub method: String,
    pub restart: bool,
    /// Live window when true, VTK files otherwise.
    pub real_time: bool,
    pub folder: PathBuf,
    /// Write `restart.ckpt` at every output iteration.
    pub checkpoint: bool,
    /// Jacobi early-exit threshold on the per-sweep pressure change; 0 runs every sweep.
    pub jacobi_tolerance: f64,
}

/// Diagnostics window; missing bounds default to the full grid.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub min_x: Option<usize>,
    pub max_x: Option<usize>,
    pub min_y: Option<usize>,
    pub max_y: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: usize,
    pub height: usize,
    /// Quiver stride in cells.
    pub skip: usize,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self { res_x: 107, res_y: 400, rho1: 1.0, rho2: 2.0 }
    }
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            max_iter: 80000,
            out_iter: 100,
            method: "jacobi".into(),
            restart: false,
            real_time: true,
            folder: PathBuf::from("output"),
            checkpoint: true,
            jacobi_tolerance: 0.0,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { width: 960, height: 720, skip: 20 }
    }
}

impl WindowConfig {
    pub fn to_window(&self, res_x: usize, res_y: usize) -> Window {
        let full = Window::full(res_x, res_y);
        Window {
            min_x: self.min_x.unwrap_or(full.min_x),
            max_x: self.max_x.unwrap_or(full.max_x),
            min_y: self.min_y.unwrap_or(full.min_y),
            max_y: self.max_y.unwrap_or(full.max_y),
        }
    }
}

impl RunConfig {
    pub fn from_yaml(text: &str) -> SimResult<Self> {
        let cfg: RunConfig = serde_yaml::from_str::<Option<RunConfig>>(text)
            .map_err(|e| SimError::Configuration(format!("malformed run config: {}", e)))?
            .unwrap_or_default();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> SimResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| SimError::from_io(path, e))?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.run.out_iter == 0 {
            return Err(SimError::Configuration("run.out_iter must be >= 1".into()));
        }
        if self.scenario.res_x < 3 || self.scenario.res_y < 3 {
            return Err(SimError::Configuration(format!(
                "scenario grid {}x{} is too small",
                self.scenario.res_x, self.scenario.res_y
            )));
        }
        if !(self.run.jacobi_tolerance >= 0.0 && self.run.jacobi_tolerance.is_finite()) {
            return Err(SimError::Configuration(format!(
                "run.jacobi_tolerance must be finite and >= 0, got {}",
                self.run.jacobi_tolerance
            )));
        }
        self.method()?;
        Ok(())
    }

    pub fn method(&self) -> SimResult<ProjectionMethod> {
        self.run.method.parse()
    }

    pub fn restart_path(&self) -> PathBuf {
        self.run.folder.join(RESTART_FILE)
    }
}

/// Directory holding `conf.yaml`, `mconf.yaml` and, for the learned
/// projection, `weights.json`.
#[derive(Debug, Clone)]
pub struct ModelDir {
    root: PathBuf,
}

impl ModelDir {
    pub fn open(root: impl Into<PathBuf>) -> SimResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SimError::NotFound(root));
        }
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// `conf.yaml`, or defaults when the file is absent.
    pub fn run_config(&self) -> SimResult<RunConfig> {
        let path = self.root.join(CONF_FILE);
        if !path.exists() {
            info!("{} not found; using default run configuration", path.display());
            return Ok(RunConfig::default());
        }
        RunConfig::load(&path)
    }

    /// `mconf.yaml` over the scenario defaults for `res_y`.
    pub fn sim_params(&self, res_y: usize) -> SimResult<SimParams> {
        let base = SimParams::rayleigh_taylor(res_y);
        let path = self.root.join(MCONF_FILE);
        if !path.exists() {
            return Ok(base);
        }
        let text = fs::read_to_string(&path).map_err(|e| SimError::from_io(&path, e))?;
        SimParams::from_yaml_over(&text, &base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.scenario.res_x, 107);
        assert_eq!(cfg.scenario.res_y, 400);
        assert_eq!(cfg.scenario.rho1, 1.0);
        assert_eq!(cfg.scenario.rho2, 2.0);
        assert_eq!(cfg.run.max_iter, 80000);
        assert_eq!(cfg.run.out_iter, 100);
        assert_eq!(cfg.method().unwrap(), ProjectionMethod::Jacobi);
        assert!(!cfg.run.restart);
        assert!(cfg.run.real_time);
        assert_eq!(cfg.display.skip, 20);
        assert_eq!(cfg.restart_path(), PathBuf::from("output/restart.ckpt"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = RunConfig::from_yaml("run:\n  max_iter: 500\n  method: learned\n").unwrap();
        assert_eq!(cfg.run.max_iter, 500);
        assert_eq!(cfg.run.out_iter, 100);
        assert_eq!(cfg.method().unwrap(), ProjectionMethod::Learned);
        assert_eq!(cfg.scenario.res_x, 107);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let cfg = RunConfig::from_yaml("").unwrap();
        assert_eq!(cfg.run.max_iter, 80000);
    }

    #[test]
    fn test_jacobi_tolerance_setting() {
        assert_eq!(RunConfig::default().run.jacobi_tolerance, 0.0);
        let cfg = RunConfig::from_yaml("run:\n  jacobi_tolerance: 1.0e-6\n").unwrap();
        assert_eq!(cfg.run.jacobi_tolerance, 1.0e-6);
        assert!(matches!(
            RunConfig::from_yaml("run:\n  jacobi_tolerance: -1.0\n"),
            Err(SimError::Configuration(_))
        ));
    }

    #[test]
    fn test_window_defaults_to_full_grid() {
        let cfg = RunConfig::from_yaml("window:\n  min_y: 10\n").unwrap();
        let w = cfg.window.to_window(107, 400);
        assert_eq!(w, Window { min_x: 0, max_x: 107, min_y: 10, max_y: 400 });
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(RunConfig::from_yaml("run:\n  out_iter: 0\n"), Err(SimError::Configuration(_))));
        assert!(matches!(RunConfig::from_yaml("run:\n  method: sor\n"), Err(SimError::Configuration(_))));
        assert!(matches!(RunConfig::from_yaml("scenario: [1, 2]"), Err(SimError::Configuration(_))));
    }

    #[test]
    fn test_model_dir_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(ModelDir::open(dir.path().join("nope")), Err(SimError::NotFound(_))));
    }

    #[test]
    fn test_model_dir_defaults_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let model = ModelDir::open(dir.path()).unwrap();
        assert_eq!(model.run_config().unwrap().run.out_iter, 100);
        assert_eq!(model.sim_params(200).unwrap(), SimParams::rayleigh_taylor(200));

        fs::write(dir.path().join(MCONF_FILE), "dt: 0.05\n").unwrap();
        fs::write(dir.path().join(CONF_FILE), "run:\n  out_iter: 10\n").unwrap();
        let p = model.sim_params(200).unwrap();
        assert_eq!(p.dt, 0.05);
        assert_eq!(p.buoyancy_scale, 0.2 / 200.0);
        assert_eq!(model.run_config().unwrap().run.out_iter, 10);
    }

    #[test]
    fn test_malformed_mconf_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MCONF_FILE), "dt: [oops").unwrap();
        let model = ModelDir::open(dir.path()).unwrap();
        assert!(matches!(model.sim_params(400), Err(SimError::Configuration(_))));
    }
}
