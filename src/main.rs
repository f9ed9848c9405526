mod checkpoint;
mod config;
mod error;
mod output;
mod renderer;
mod sim;
mod solver;
mod state;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};

use config::{ModelDir, RunConfig};
use error::{SimError, SimResult};
use output::{LiveView, NullSink, OutputSink, VtkExporter};

const WINDOW_TITLE: &str = "strativarium";
const USAGE: &str = "usage: strativarium <model_dir> [--export] [--restart] [--headless] [--config <file>]";

/// Parsed command line.
#[derive(Debug, PartialEq)]
struct Cli {
    model_dir: PathBuf,
    /// Write VTK files even when the config asks for the live view.
    export: bool,
    restart: bool,
    /// No output at all; logging and checkpoints only.
    headless: bool,
    config: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> SimResult<Cli> {
    let mut model_dir = None;
    let mut cli = Cli { model_dir: PathBuf::new(), export: false, restart: false, headless: false, config: None };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--export" => cli.export = true,
            "--restart" => cli.restart = true,
            "--headless" => cli.headless = true,
            "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| SimError::Configuration(format!("--config needs a file\n{}", USAGE)))?;
                cli.config = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => {
                return Err(SimError::Configuration(format!("unknown option {}\n{}", flag, USAGE)));
            }
            path if model_dir.is_none() => model_dir = Some(PathBuf::from(path)),
            extra => {
                return Err(SimError::Configuration(format!("unexpected argument {}\n{}", extra, USAGE)));
            }
        }
    }
    cli.model_dir = model_dir.ok_or_else(|| SimError::Configuration(USAGE.into()))?;
    Ok(cli)
}

fn open_sink(cli: &Cli, cfg: &RunConfig) -> SimResult<Box<dyn OutputSink>> {
    if cli.headless {
        return Ok(Box::new(NullSink::default()));
    }
    if cli.export || !cfg.run.real_time {
        info!("Exporting VTK files to {}", cfg.run.folder.display());
        return Ok(Box::new(VtkExporter::new(cfg.run.folder.clone())?));
    }
    let d = &cfg.display;
    Ok(Box::new(LiveView::new(WINDOW_TITLE, d.width, d.height, d.skip)?))
}

fn run() -> SimResult<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args)?;

    let model = ModelDir::open(&cli.model_dir)?;
    let mut cfg = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => model.run_config()?,
    };
    cfg.run.restart |= cli.restart;

    let mut sim = sim::prepare(&cfg, &model)?;
    let window = cfg.window.to_window(sim.state().res_x, sim.state().res_y);
    info!("Starting at it = {} with dt = {}", sim.it(), sim.params().dt);

    // Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        warn!("Ctrl+C handler not installed: {}", e);
    }

    let mut sink = open_sink(&cli, &cfg)?;
    let checkpoint = cfg.run.checkpoint.then(|| cfg.restart_path());
    let summary = sim.run(
        cfg.run.max_iter,
        cfg.run.out_iter,
        &window,
        sink.as_mut(),
        checkpoint.as_deref(),
        &running,
    )?;
    info!(
        "Done: {} steps, {} outputs, it = {}{}",
        summary.steps,
        summary.extractions,
        summary.final_it,
        if summary.interrupted { " (interrupted)" } else { "" }
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_model_dir_only() {
        let cli = parse_args(&args(&["models/rt"])).unwrap();
        assert_eq!(cli.model_dir, PathBuf::from("models/rt"));
        assert!(!cli.export && !cli.restart && !cli.headless);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_flags_any_order() {
        let cli = parse_args(&args(&["--restart", "m", "--config", "c.yaml", "--export"])).unwrap();
        assert_eq!(
            cli,
            Cli {
                model_dir: PathBuf::from("m"),
                export: true,
                restart: true,
                headless: false,
                config: Some(PathBuf::from("c.yaml")),
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        for bad in [&[][..], &["--export"][..], &["m", "--config"][..], &["m", "--bogus"][..], &["m", "n"][..]] {
            assert!(matches!(parse_args(&args(bad)), Err(SimError::Configuration(_))), "{:?}", bad);
        }
    }

    #[test]
    fn test_headless_and_export_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = RunConfig::default();
        cfg.run.folder = dir.path().join("vtk");

        let cli = parse_args(&args(&["m", "--headless"])).unwrap();
        assert!(!open_sink(&cli, &cfg).unwrap().wants_divergence());

        let cli = parse_args(&args(&["m", "--export"])).unwrap();
        assert!(open_sink(&cli, &cfg).unwrap().wants_divergence());
        assert!(cfg.run.folder.is_dir());
    }
}
