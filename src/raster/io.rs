//! I/O helpers for rasters and JSON.
//!
//! - `save_raster_png`: write a raster as a normalized grayscale PNG.
//! - `write_json_file`: pretty-print a serializable value to disk.
//! - `write_text_atomic`: write a file through a temporary sibling.
use super::{Raster, RasterView};
use crate::error::{Result, SspfmError};
use image::{GrayImage, Luma};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Save a raster as grayscale PNG, stretching the finite range to [0, 254].
///
/// NaN cells and the `blank` cells (row-major indices) are painted white.
pub fn save_raster_png(raster: &Raster, blank: &[usize], path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let (lo, hi) = raster.finite_range().unwrap_or((0.0, 1.0));
    let span = if hi - lo > 0.0 { hi - lo } else { 1.0 };
    let mut out = GrayImage::new(raster.w as u32, raster.h as u32);
    for (y, row) in raster.rows().enumerate() {
        for (x, &v) in row.iter().enumerate() {
            let level = if v.is_finite() {
                (((v - lo) / span) * 254.0).clamp(0.0, 254.0) as u8
            } else {
                255
            };
            out.put_pixel(x as u32, y as u32, Luma([level]));
        }
    }
    for &i in blank {
        if i < raster.data.len() {
            out.put_pixel((i % raster.w) as u32, (i / raster.w) as u32, Luma([255]));
        }
    }
    out.save(path).map_err(|e| {
        SspfmError::io(
            format!("Failed to save {}", path.display()),
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        )
    })
}

/// Serialize a value as pretty JSON to `path`, creating parent directories.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        SspfmError::Config(format!("Failed to serialize JSON for {}: {e}", path.display()))
    })?;
    write_text_atomic(path, &json)
}

/// Write `contents` to a temporary sibling of `path`, then rename it in place.
///
/// An aborted run therefore never leaves a truncated file behind.
pub fn write_text_atomic(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    ensure_parent_dir(path)?;
    let tmp = temp_sibling(path);
    fs::write(&tmp, contents.as_ref())
        .map_err(|e| SspfmError::io(format!("Failed to write {}", tmp.display()), e))?;
    fs::rename(&tmp, path)
        .map_err(|e| SspfmError::io(format!("Failed to move {}", path.display()), e))
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| SspfmError::io(format!("Failed to create {}", parent.display()), e))?;
        }
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    path.with_file_name(format!(".{name}.part"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("table.txt");
        write_text_atomic(&path, "a\tb\n").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "a\tb\n");
        assert!(!temp_sibling(&path).exists());
    }

    #[test]
    fn png_export_accepts_nan_cells() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("map.png");
        let raster = Raster::from_rows(&[vec![1.0, f64::NAN], vec![3.0, 4.0]]).expect("raster");
        save_raster_png(&raster, &[3], &path).expect("save");
        assert!(path.exists());
    }
}
