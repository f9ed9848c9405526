// .ckpt full-state checkpoint: writer and reader.

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{SimError, SimResult};
use crate::state::{CellFlag, GridState};

const CKPT_MAGIC: &[u8; 4] = b"RTCK";
const CKPT_VERSION: u32 = 1;
const FIELD_NAME_ENTRY_SIZE: usize = 16;
const FIELD_NAMES: [&str; 5] = ["pressure", "ux", "uy", "flags", "density"];

/// Bytes before the field data: magic, version, res_x/y/z, it, field count, names.
const HEADER_SIZE: usize = 4 + 4 + 3 * 4 + 8 + 4 + FIELD_NAMES.len() * FIELD_NAME_ENTRY_SIZE;

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_checkpoint<W: Write>(w: &mut W, state: &GridState, it: u64) -> io::Result<()> {
    w.write_all(CKPT_MAGIC)?;
    w.write_all(&CKPT_VERSION.to_le_bytes())?;
    w.write_all(&(state.res_x as u32).to_le_bytes())?;
    w.write_all(&(state.res_y as u32).to_le_bytes())?;
    w.write_all(&1u32.to_le_bytes())?;
    w.write_all(&it.to_le_bytes())?;
    w.write_all(&(FIELD_NAMES.len() as u32).to_le_bytes())?;
    for name in FIELD_NAMES {
        let mut entry = [0u8; FIELD_NAME_ENTRY_SIZE];
        entry[0] = name.len() as u8;
        entry[1..1 + name.len()].copy_from_slice(name.as_bytes());
        w.write_all(&entry)?;
    }

    let flags: Vec<f64> = state.flags.iter().map(|f| f.code() as f64).collect();
    for field in [&state.pressure, &state.ux, &state.uy, &flags, &state.density] {
        for v in field.iter() {
            w.write_all(&v.to_le_bytes())?;
        }
    }
    w.flush()
}

/// Persist `state` and `it` to `path`. The file is written next to its
/// destination and renamed, so a crash never leaves a half-written checkpoint.
pub fn save(path: &Path, state: &GridState, it: u64) -> SimResult<()> {
    state.check_shapes()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    {
        let file = fs::File::create(&tmp)?;
        let mut w = BufWriter::new(file);
        write_checkpoint(&mut w, state, it)?;
    }
    fs::rename(&tmp, path)?;
    info!("Checkpoint saved: {} (it = {})", path.display(), it);
    Ok(())
}

/// Restore a checkpoint written by [`save`].
pub fn load(path: &Path) -> SimResult<(GridState, u64)> {
    let bytes = fs::read(path).map_err(|e| SimError::from_io(path, e))?;
    let (state, it) = parse_checkpoint(&bytes, path)?;
    info!("Checkpoint loaded: {} ({}x{}, it = {})", path.display(), state.res_x, state.res_y, it);
    Ok((state, it))
}

fn parse_checkpoint(bytes: &[u8], path: &Path) -> SimResult<(GridState, u64)> {
    let corrupt = |reason: String| SimError::corrupt(path, reason);
    let truncated = |_: io::Error| SimError::corrupt(path, "truncated header");
    if bytes.len() < HEADER_SIZE {
        return Err(corrupt(format!("truncated header: {} bytes, expected {}", bytes.len(), HEADER_SIZE)));
    }
    let mut r = bytes;

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(truncated)?;
    if &magic != CKPT_MAGIC {
        return Err(corrupt(format!("invalid checkpoint magic: {:?}", magic)));
    }

    let mut buf4 = [0u8; 4];
    let mut buf8 = [0u8; 8];
    r.read_exact(&mut buf4).map_err(truncated)?;
    let version = u32::from_le_bytes(buf4);
    if version != CKPT_VERSION {
        return Err(corrupt(format!("unsupported checkpoint version: {}", version)));
    }

    r.read_exact(&mut buf4).map_err(truncated)?;
    let res_x = u32::from_le_bytes(buf4) as usize;
    r.read_exact(&mut buf4).map_err(truncated)?;
    let res_y = u32::from_le_bytes(buf4) as usize;
    r.read_exact(&mut buf4).map_err(truncated)?;
    let res_z = u32::from_le_bytes(buf4);
    if res_z != 1 {
        return Err(corrupt(format!("expected a 2-D grid, res_z = {}", res_z)));
    }

    r.read_exact(&mut buf8).map_err(truncated)?;
    let it = u64::from_le_bytes(buf8);

    r.read_exact(&mut buf4).map_err(truncated)?;
    let field_count = u32::from_le_bytes(buf4) as usize;
    if field_count != FIELD_NAMES.len() {
        return Err(corrupt(format!("expected {} fields, found {}", FIELD_NAMES.len(), field_count)));
    }
    for expected in FIELD_NAMES {
        let mut entry = [0u8; FIELD_NAME_ENTRY_SIZE];
        r.read_exact(&mut entry).map_err(truncated)?;
        let len = (entry[0] as usize).min(FIELD_NAME_ENTRY_SIZE - 1);
        let name = std::str::from_utf8(&entry[1..1 + len])
            .map_err(|e| corrupt(format!("field name is not utf-8: {}", e)))?;
        if name != expected {
            return Err(corrupt(format!("expected field '{}', found '{}'", expected, name)));
        }
    }

    if res_x < 3 || res_y < 3 {
        return Err(corrupt(format!("grid {}x{} is too small", res_x, res_y)));
    }
    let cells = res_x
        .checked_mul(res_y)
        .ok_or_else(|| corrupt(format!("grid {}x{} overflows", res_x, res_y)))?;
    let field_bytes = cells
        .checked_mul(8)
        .ok_or_else(|| corrupt(format!("grid {}x{} overflows", res_x, res_y)))?;
    let data_len = field_bytes
        .checked_mul(FIELD_NAMES.len())
        .ok_or_else(|| corrupt(format!("grid {}x{} overflows", res_x, res_y)))?;
    if r.len() < data_len {
        return Err(corrupt(format!("truncated data: {} bytes, expected {}", r.len(), data_len)));
    }
    if r.len() > data_len {
        return Err(corrupt(format!("{} trailing bytes", r.len() - data_len)));
    }

    let field = |k: usize| -> Vec<f64> {
        r[k * field_bytes..(k + 1) * field_bytes]
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect()
    };
    let pressure = field(0);
    let ux = field(1);
    let uy = field(2);
    let raw_flags = field(3);
    let density = field(4);

    let flags = raw_flags
        .iter()
        .map(|&code| {
            let valid = code.fract() == 0.0 && (0.0..=255.0).contains(&code);
            valid
                .then(|| CellFlag::from_code(code as u8))
                .flatten()
                .ok_or_else(|| corrupt(format!("unknown cell flag code {}", code)))
        })
        .collect::<SimResult<Vec<_>>>()?;

    let state = GridState { res_x, res_y, pressure, ux, uy, flags, density };
    state
        .check_shapes()
        .map_err(|e| corrupt(format!("inconsistent grid: {}", e)))?;
    Ok((state, it))
}
