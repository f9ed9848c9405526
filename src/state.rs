use std::collections::BTreeMap;

use crate::error::{SimError, SimResult};

/// Per-cell classification. Codes match the flag values stored in checkpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellFlag {
    Fluid,
    Solid,
    Empty,
}

impl CellFlag {
    pub const fn code(self) -> u8 {
        match self {
            CellFlag::Fluid => 1,
            CellFlag::Solid => 2,
            CellFlag::Empty => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(CellFlag::Fluid),
            2 => Some(CellFlag::Solid),
            4 => Some(CellFlag::Empty),
            _ => None,
        }
    }

    #[inline]
    pub fn is_fluid(self) -> bool {
        self == CellFlag::Fluid
    }

    #[inline]
    pub fn is_solid(self) -> bool {
        self == CellFlag::Solid
    }
}

/// Row-major index, `y = 0` is the bottom row.
/// Caller guarantees 0 <= x < nx.
#[inline(always)]
pub const fn idx_inner(x: usize, y: usize, nx: usize) -> usize {
    y * nx + x
}

/// Flags for an empty box: a one-cell solid border around a fluid interior.
pub fn empty_domain(res_x: usize, res_y: usize) -> Vec<CellFlag> {
    let mut flags = vec![CellFlag::Fluid; res_x * res_y];
    for y in 0..res_y {
        for x in 0..res_x {
            if x == 0 || y == 0 || x + 1 == res_x || y + 1 == res_y {
                flags[idx_inner(x, y, res_x)] = CellFlag::Solid;
            }
        }
    }
    flags
}

/// The mutable fields of one simulation instance.
///
/// Velocity is MAC-staggered: `ux[idx(x, y)]` sits on the left face of
/// cell `(x, y)` and `uy[idx(x, y)]` on its bottom face. Every buffer holds
/// exactly `res_x * res_y` values.
#[derive(Clone, Debug, PartialEq)]
pub struct GridState {
    pub res_x: usize,
    pub res_y: usize,
    pub pressure: Vec<f64>,
    pub ux: Vec<f64>,
    pub uy: Vec<f64>,
    pub flags: Vec<CellFlag>,
    pub density: Vec<f64>,
}

impl GridState {
    /// Zero fields over an `empty_domain` flag layout.
    pub fn new_empty(res_x: usize, res_y: usize) -> Self {
        let size = res_x * res_y;
        Self {
            res_x,
            res_y,
            pressure: vec![0.0; size],
            ux: vec![0.0; size],
            uy: vec![0.0; size],
            flags: empty_domain(res_x, res_y),
            density: vec![0.0; size],
        }
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.res_x * self.res_y
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        idx_inner(x, y, self.res_x)
    }

    /// Fail fast if any buffer disagrees with `res_x * res_y`.
    pub fn check_shapes(&self) -> SimResult<()> {
        let expected = self.cell_count();
        if self.res_x < 3 || self.res_y < 3 {
            return Err(SimError::Precondition(format!(
                "grid {}x{} is too small (need at least 3x3)",
                self.res_x, self.res_y
            )));
        }
        let lens = [
            ("pressure", self.pressure.len()),
            ("ux", self.ux.len()),
            ("uy", self.uy.len()),
            ("flags", self.flags.len()),
            ("density", self.density.len()),
        ];
        for (name, len) in lens {
            if len != expected {
                return Err(SimError::Precondition(format!(
                    "field '{}' has {} values, expected {} ({}x{})",
                    name, len, expected, self.res_x, self.res_y
                )));
            }
        }
        Ok(())
    }

    /// Split into the named batch layout `{p, U, flags, density}`.
    pub fn into_batch(self) -> FieldBatch {
        let mut batch = FieldBatch::new(self.res_x, self.res_y);
        batch.insert("p", FieldData::Scalar(self.pressure));
        batch.insert("U", FieldData::Vector(self.ux, self.uy));
        batch.insert("flags", FieldData::Flags(self.flags));
        batch.insert("density", FieldData::Scalar(self.density));
        batch
    }
}

/// One named entry of a [`FieldBatch`].
#[derive(Clone, Debug, PartialEq)]
pub enum FieldData {
    Scalar(Vec<f64>),
    /// Staggered velocity, x then y component.
    Vector(Vec<f64>, Vec<f64>),
    Flags(Vec<CellFlag>),
}

/// Loosely-typed bag of named fields, as handed over by a dataset or a
/// caller building its own domain. Converted into a [`GridState`] with
/// `GridState::try_from`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldBatch {
    pub res_x: usize,
    pub res_y: usize,
    pub fields: BTreeMap<String, FieldData>,
}

impl FieldBatch {
    pub fn new(res_x: usize, res_y: usize) -> Self {
        Self { res_x, res_y, fields: BTreeMap::new() }
    }

    pub fn insert(&mut self, name: &str, data: FieldData) {
        self.fields.insert(name.to_string(), data);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

const BATCH_FIELDS: [&str; 4] = ["p", "U", "flags", "density"];

impl TryFrom<FieldBatch> for GridState {
    type Error = SimError;

    fn try_from(mut batch: FieldBatch) -> SimResult<Self> {
        if batch.len() != BATCH_FIELDS.len() {
            return Err(SimError::Configuration(format!(
                "batch must contain 4 fields (p, U, flags, density), got {}",
                batch.len()
            )));
        }
        let mut take = |name: &str| {
            batch.fields.remove(name).ok_or_else(|| {
                SimError::Configuration(format!("batch is missing field '{}'", name))
            })
        };
        let pressure = take("p")?;
        let velocity = take("U")?;
        let flags = take("flags")?;
        let density = take("density")?;

        let (pressure, (ux, uy), flags, density) = match (pressure, velocity, flags, density) {
            (
                FieldData::Scalar(p),
                FieldData::Vector(ux, uy),
                FieldData::Flags(f),
                FieldData::Scalar(d),
            ) => (p, (ux, uy), f, d),
            _ => {
                return Err(SimError::Configuration(
                    "batch fields have the wrong kind (expected scalar p, vector U, flags, scalar density)".into(),
                ))
            }
        };

        let state = GridState {
            res_x: batch.res_x,
            res_y: batch.res_y,
            pressure,
            ux,
            uy,
            flags,
            density,
        };
        state.check_shapes()?;
        Ok(state)
    }
}
