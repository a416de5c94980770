//! Tab-separated text tables.
//!
//! Property and cluster-label files share a three-line header:
//! ```text
//! off
//! x pix=3, y pix=2, x mic=1.5, y mic=1
//! x_coer_p		x_coer_m		area
//! ```
//! followed by one row per pixel in linear order, `nan` for missing values.

use super::{ModeTable, PropertyBundle};
use crate::cluster::ClusterAssignment;
use crate::error::{Result, SspfmError};
use crate::raster::io::write_text_atomic;
use crate::types::{Grid, Mode};
use csv::StringRecord;
use std::fs::File;
use std::path::{Path, PathBuf};

pub fn properties_file(dir: &Path, mode: Mode) -> PathBuf {
    dir.join(format!("properties_{mode}.txt"))
}

pub fn best_loops_file(dir: &Path, mode: Mode) -> PathBuf {
    dir.join(format!("best_loops_{mode}.txt"))
}

/// Number formatting shared by every table; round-trips through [`parse_value`].
pub fn format_value(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v == f64::INFINITY {
        "inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{v}")
    }
}

pub fn parse_value(token: &str) -> Option<f64> {
    match token.trim().to_ascii_lowercase().as_str() {
        "nan" | "" => Some(f64::NAN),
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        t => t.parse().ok(),
    }
}

fn grid_line(grid: &Grid) -> String {
    let mic = |v: Option<f64>| v.map_or_else(|| "nan".to_string(), format_value);
    format!(
        "x pix={}, y pix={}, x mic={}, y mic={}",
        grid.nx,
        grid.ny,
        mic(grid.lx_um),
        mic(grid.ly_um)
    )
}

fn parse_grid_line(line: &str) -> Option<Grid> {
    let mut nx = None;
    let mut ny = None;
    let mut lx = None;
    let mut ly = None;
    for part in line.split(',') {
        let (key, value) = part.split_once('=')?;
        match key.trim() {
            "x pix" => nx = value.trim().parse().ok(),
            "y pix" => ny = value.trim().parse().ok(),
            "x mic" => lx = parse_value(value).filter(|v| v.is_finite()),
            "y mic" => ly = parse_value(value).filter(|v| v.is_finite()),
            _ => {}
        }
    }
    Some(Grid {
        nx: nx?,
        ny: ny?,
        lx_um: lx,
        ly_um: ly,
    })
}

type TableWriter = csv::Writer<Vec<u8>>;

fn table_writer() -> TableWriter {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_writer(Vec::new())
}

fn write_err(path: &Path) -> impl Fn(csv::Error) -> SspfmError + '_ {
    move |e| SspfmError::table(format!("Failed to write {}", path.display()), e)
}

/// Mode line, grid line and the double-tab separated column names.
fn write_header(w: &mut TableWriter, path: &Path, mode: Mode, grid: &Grid, names: &[&str]) -> Result<()> {
    w.write_record([mode.as_str()]).map_err(write_err(path))?;
    w.write_record([grid_line(grid)]).map_err(write_err(path))?;
    let mut spaced = Vec::with_capacity(2 * names.len());
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            spaced.push("");
        }
        spaced.push(*name);
    }
    w.write_record(&spaced).map_err(write_err(path))
}

fn finish(w: TableWriter, path: &Path) -> Result<()> {
    let bytes = w.into_inner().map_err(|e| {
        SspfmError::io(format!("Failed to flush {}", path.display()), e.into_error())
    })?;
    write_text_atomic(path, bytes)
}

/// Write `properties_<mode>.txt` into `dir`; returns the written path.
pub fn write_properties(dir: &Path, bundle: &PropertyBundle, mode: Mode) -> Result<PathBuf> {
    let table = bundle
        .table(mode)
        .ok_or_else(|| SspfmError::Config(format!("no {mode} properties to write")))?;
    let path = properties_file(dir, mode);
    let names: Vec<&str> = table.names().iter().map(String::as_str).collect();
    let mut w = table_writer();
    write_header(&mut w, &path, mode, &bundle.grid, &names)?;
    for pixel in 0..table.n_pixels() {
        w.write_record(table.row(pixel).into_iter().map(format_value))
            .map_err(write_err(&path))?;
    }
    finish(w, &path)?;
    Ok(path)
}

/// Every mode of the bundle, one file each.
pub fn write_bundle(dir: &Path, bundle: &PropertyBundle) -> Result<Vec<PathBuf>> {
    bundle
        .modes()
        .map(|mode| write_properties(dir, bundle, mode))
        .collect()
}

fn table_reader(path: &Path) -> Result<csv::Reader<File>> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| SspfmError::table(format!("Failed to read {}", path.display()), e))
}

fn malformed(path: &Path, what: &str) -> SspfmError {
    SspfmError::Config(format!("Malformed table {}: {what}", path.display()))
}

fn next_record<I>(records: &mut I, path: &Path, what: &str) -> Result<StringRecord>
where
    I: Iterator<Item = csv::Result<StringRecord>>,
{
    records
        .next()
        .ok_or_else(|| malformed(path, what))?
        .map_err(|e| SspfmError::table(format!("Failed to read {}", path.display()), e))
}

/// Parse one property file back into its mode, grid and table.
pub fn read_properties(path: &Path) -> Result<(Mode, Grid, ModeTable)> {
    let mut reader = table_reader(path)?;
    let mut records = reader.records();
    let mode = next_record(&mut records, path, "missing mode line")?
        .get(0)
        .and_then(Mode::parse)
        .ok_or_else(|| malformed(path, "unknown mode line"))?;
    let grid = next_record(&mut records, path, "missing grid line")?
        .get(0)
        .and_then(parse_grid_line)
        .ok_or_else(|| malformed(path, "bad grid line"))?;
    let names: Vec<String> = next_record(&mut records, path, "missing column names")?
        .iter()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let mut columns = vec![Vec::with_capacity(grid.len()); names.len()];
    for (row, record) in records.enumerate() {
        let record = record
            .map_err(|e| SspfmError::table(format!("Failed to read {}", path.display()), e))?;
        if record.len() != names.len() {
            return Err(malformed(path, &format!("row {row} has {} values", record.len())));
        }
        for (column, token) in columns.iter_mut().zip(record.iter()) {
            let v = parse_value(token)
                .ok_or_else(|| malformed(path, &format!("bad value '{token}' on row {row}")))?;
            column.push(v);
        }
    }
    let mut table = ModeTable::new(grid.len());
    for (name, column) in names.iter().zip(columns) {
        table.insert(name, column)?;
    }
    Ok((mode, grid, table))
}

/// Read every `properties_<mode>.txt` present in `dir`.
pub fn read_bundle(dir: &Path) -> Result<PropertyBundle> {
    let mut bundle: Option<PropertyBundle> = None;
    for mode in Mode::ALL {
        let path = properties_file(dir, mode);
        if !path.exists() {
            continue;
        }
        let (file_mode, grid, table) = read_properties(&path)?;
        let b = bundle.get_or_insert_with(|| PropertyBundle::new(grid));
        if b.grid.nx != grid.nx || b.grid.ny != grid.ny {
            return Err(SspfmError::Geometry(format!(
                "{} does not match the {}x{} grid",
                path.display(),
                b.grid.nx,
                b.grid.ny
            )));
        }
        b.insert_table(file_mode, table)?;
    }
    bundle.ok_or_else(|| {
        SspfmError::Config(format!("no property files in {}", dir.display()))
    })
}

/// One best loop: pixel index, write voltages and piezoresponse.
pub type LoopRows<'a> = (usize, &'a [f64], &'a [f64]);

pub fn write_best_loops(path: &Path, mode: Mode, loops: &[LoopRows<'_>]) -> Result<()> {
    let mut w = table_writer();
    w.write_record([mode.as_str()]).map_err(write_err(path))?;
    w.write_record(["index pix", "voltage", "piezoresponse"])
        .map_err(write_err(path))?;
    for (pixel, volt, piezo) in loops {
        for (v, y) in volt.iter().zip(piezo.iter()) {
            w.write_record([pixel.to_string(), format_value(*v), format_value(*y)])
                .map_err(write_err(path))?;
        }
    }
    finish(w, path)
}

/// Per-cluster average curves over a shared x axis.
pub fn write_average_curves(path: &Path, x: &[f64], averages: &[Vec<f64>]) -> Result<()> {
    let mut w = table_writer();
    w.write_record(["cluster_index", "x values", "y values"])
        .map_err(write_err(path))?;
    for (k, curve) in averages.iter().enumerate() {
        for (xv, yv) in x.iter().zip(curve) {
            w.write_record([k.to_string(), format_value(*xv), format_value(*yv)])
                .map_err(write_err(path))?;
        }
    }
    finish(w, path)
}

/// Label file with the property-file header; one label per pixel.
pub fn write_cluster_labels(path: &Path, grid: &Grid, assignment: &ClusterAssignment) -> Result<()> {
    if let Some(note) = &assignment.note {
        log::info!("{}: {note}", path.display());
    }
    let mut w = table_writer();
    write_header(&mut w, path, assignment.mode, grid, &[assignment.label_column()])?;
    let mut values = assignment.label_values();
    values.resize(grid.len(), f64::NAN);
    for v in values {
        w.write_record([format_value(v)]).map_err(write_err(path))?;
    }
    finish(w, path)
}
