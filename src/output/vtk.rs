//! VTK RectilinearGrid (`.vtr`) export, one ASCII file per output
//! iteration plus a `.pvd` collection for ParaView.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{SimError, SimResult};
use crate::solver::Snapshot;

use super::OutputSink;

const COLLECTION_FILE: &str = "output.pvd";

#[derive(Debug)]
pub struct VtkExporter {
    folder: PathBuf,
    /// `(file name, iteration)` of everything written so far.
    written: Vec<(String, u64)>,
}

impl VtkExporter {
    pub fn new(folder: impl Into<PathBuf>) -> SimResult<Self> {
        let folder = folder.into();
        fs::create_dir_all(&folder)?;
        Ok(Self { folder, written: Vec::new() })
    }

    pub fn file_name(it: u64) -> String {
        format!("output_{:05}.vtr", it)
    }

    fn write_coords<W: Write>(w: &mut W, name: &str, coords: &[f64]) -> std::io::Result<()> {
        writeln!(w, r#"        <DataArray type="Float64" Name="{}" format="ascii">"#, name)?;
        write!(w, "         ")?;
        for c in coords {
            write!(w, " {}", c)?;
        }
        writeln!(w)?;
        writeln!(w, r#"        </DataArray>"#)
    }

    fn write_cell_array<W: Write>(w: &mut W, name: &str, values: &[f64], width: usize) -> std::io::Result<()> {
        writeln!(w, r#"        <DataArray type="Float64" Name="{}" format="ascii">"#, name)?;
        for row in values.chunks(width.max(1)) {
            write!(w, "         ")?;
            for v in row {
                if v.is_nan() {
                    write!(w, " nan")?;
                } else {
                    write!(w, " {}", v)?;
                }
            }
            writeln!(w)?;
        }
        writeln!(w, r#"        </DataArray>"#)
    }

    /// Write one snapshot as a rectilinear grid. Domain units put the full
    /// grid at x in [0, res_x/res_y], y in [0, 1].
    pub fn write_snapshot(&self, path: &Path, snap: &Snapshot) -> SimResult<()> {
        let h = 1.0 / snap.res_y as f64;
        let win = snap.window;
        let xs: Vec<f64> = (win.min_x..=win.max_x).map(|i| i as f64 * h).collect();
        let ys: Vec<f64> = (win.min_y..=win.max_y).map(|j| j as f64 * h).collect();
        let extent = format!("0 {} 0 {} 0 0", snap.width, snap.height);

        let file = File::create(path)?;
        let mut w = BufWriter::new(file);
        writeln!(w, r#"<?xml version="1.0"?>"#)?;
        writeln!(w, r#"<VTKFile type="RectilinearGrid" version="0.1" byte_order="LittleEndian">"#)?;
        writeln!(w, r#"  <RectilinearGrid WholeExtent="{}">"#, extent)?;
        writeln!(w, r#"    <FieldData>"#)?;
        writeln!(
            w,
            r#"      <DataArray type="Int64" Name="Iteration" NumberOfTuples="1" format="ascii">{}</DataArray>"#,
            snap.it
        )?;
        writeln!(w, r#"    </FieldData>"#)?;
        writeln!(w, r#"    <Piece Extent="{}">"#, extent)?;
        writeln!(w, r#"      <CellData Scalars="density">"#)?;
        Self::write_cell_array(&mut w, "density", &snap.density, snap.width)?;
        if let Some(div) = &snap.divergence {
            Self::write_cell_array(&mut w, "divergence", div, snap.width)?;
        }
        Self::write_cell_array(&mut w, "pressure", &snap.pressure, snap.width)?;
        Self::write_cell_array(&mut w, "ux", &snap.velx, snap.width)?;
        Self::write_cell_array(&mut w, "uy", &snap.vely, snap.width)?;
        writeln!(w, r#"      </CellData>"#)?;
        writeln!(w, r#"      <Coordinates>"#)?;
        Self::write_coords(&mut w, "x", &xs)?;
        Self::write_coords(&mut w, "y", &ys)?;
        Self::write_coords(&mut w, "z", &[0.0])?;
        writeln!(w, r#"      </Coordinates>"#)?;
        writeln!(w, r#"    </Piece>"#)?;
        writeln!(w, r#"  </RectilinearGrid>"#)?;
        writeln!(w, r#"</VTKFile>"#)?;
        w.flush()?;
        Ok(())
    }

    fn write_pvd(&self) -> SimResult<PathBuf> {
        let path = self.folder.join(COLLECTION_FILE);
        let file = File::create(&path)?;
        let mut w = BufWriter::new(file);
        writeln!(w, r#"<?xml version="1.0"?>"#)?;
        writeln!(w, r#"<VTKFile type="Collection" version="0.1" byte_order="LittleEndian">"#)?;
        writeln!(w, r#"  <Collection>"#)?;
        for (name, it) in &self.written {
            writeln!(w, r#"    <DataSet timestep="{}" file="{}"/>"#, it, name)?;
        }
        writeln!(w, r#"  </Collection>"#)?;
        writeln!(w, r#"</VTKFile>"#)?;
        w.flush()?;
        Ok(path)
    }
}

impl OutputSink for VtkExporter {
    fn emit(&mut self, snap: &Snapshot) -> SimResult<()> {
        if snap.width == 0 || snap.height == 0 {
            return Err(SimError::Precondition("cannot export an empty snapshot".into()));
        }
        let name = Self::file_name(snap.it);
        let path = self.folder.join(&name);
        self.write_snapshot(&path, snap)?;
        info!("Exported {}", path.display());
        self.written.push((name, snap.it));
        Ok(())
    }

    fn wants_divergence(&self) -> bool {
        true
    }

    fn finish(&mut self) -> SimResult<()> {
        if self.written.is_empty() {
            return Ok(());
        }
        let path = self.write_pvd()?;
        info!("Wrote collection {} ({} frames)", path.display(), self.written.len());
        Ok(())
    }
}
