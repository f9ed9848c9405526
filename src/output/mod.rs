mod live;
mod vtk;

pub use live::LiveView;
pub use vtk::VtkExporter;

use crate::error::SimResult;
use crate::solver::Snapshot;

/// Consumer of diagnostic snapshots.
pub trait OutputSink {
    fn emit(&mut self, snap: &Snapshot) -> SimResult<()>;

    /// Whether snapshots handed to this sink should carry divergence.
    fn wants_divergence(&self) -> bool {
        false
    }

    /// False once the sink can no longer take output (closed window).
    fn is_open(&self) -> bool {
        true
    }

    /// Called once after the last snapshot.
    fn finish(&mut self) -> SimResult<()> {
        Ok(())
    }
}

/// Discards everything. Used for headless runs.
#[derive(Debug, Default)]
pub struct NullSink {
    pub emitted: usize,
}

impl OutputSink for NullSink {
    fn emit(&mut self, _snap: &Snapshot) -> SimResult<()> {
        self.emitted += 1;
        Ok(())
    }
}
