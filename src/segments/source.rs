//! Sources yielding typed per-pixel segment tables.
//!
//! The pipeline only depends on [`SegmentSource`]. Instrument-specific
//! readers live outside the crate; a delimited-text reader and an in-memory
//! source are provided.

use super::{Channel, ChannelSet, PixelSegments};
use crate::error::{Result, SspfmError};
use crate::signal::{cut_segments, SegmentTrim, SspfmBias};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub trait SegmentSource: Sync {
    /// Number of measured pixels (may be less than the grid size).
    fn pixel_count(&self) -> usize;

    /// Segment table of pixel `index`; errors only invalidate that pixel.
    fn read_pixel(&self, index: usize) -> Result<PixelSegments>;
}

/// Segment tables held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    pixels: Vec<Option<PixelSegments>>,
}

impl MemorySource {
    pub fn new(pixels: Vec<PixelSegments>) -> Self {
        Self {
            pixels: pixels.into_iter().map(Some).collect(),
        }
    }

    /// Pixels given as `None` report a parse error when read.
    pub fn with_gaps(pixels: Vec<Option<PixelSegments>>) -> Self {
        Self { pixels }
    }
}

impl SegmentSource for MemorySource {
    fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    fn read_pixel(&self, index: usize) -> Result<PixelSegments> {
        match self.pixels.get(index) {
            Some(Some(px)) => Ok(PixelSegments {
                index,
                segments: px.segments.clone(),
            }),
            _ => Err(SspfmError::parse(index, "no segment table")),
        }
    }
}

/// Shape of a delimited per-pixel text file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableLayout {
    /// Lines before the first data row.
    pub header_lines: usize,
    /// Line (0-based) holding the column names.
    pub index_line_meas_name: usize,
    pub delimiter: String,
    /// Canonical channel → column name in the file.
    pub key_measurement_extraction: BTreeMap<Channel, String>,
}

impl Default for TableLayout {
    fn default() -> Self {
        let key_measurement_extraction = Channel::ALL
            .iter()
            .map(|c| (*c, c.as_str().to_string()))
            .collect();
        Self {
            header_lines: 1,
            index_line_meas_name: 0,
            delimiter: "\t".to_string(),
            key_measurement_extraction,
        }
    }
}

impl TableLayout {
    fn delimiter_byte(&self) -> std::result::Result<u8, String> {
        match self.delimiter.as_bytes() {
            [] => Ok(b'\t'),
            [b] => Ok(*b),
            _ => Err(format!("delimiter '{}' is not a single byte", self.delimiter)),
        }
    }

    /// Parse file contents into the canonical channels.
    ///
    /// Empty cells read as NaN; a data row whose field count differs from
    /// the column-name row is an error.
    pub fn parse(&self, contents: &str) -> std::result::Result<ChannelSet, String> {
        // Preamble lines may have any width; data rows are checked below.
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(self.delimiter_byte()?)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(contents.as_bytes());
        let mut names: Option<Vec<String>> = None;
        let mut columns: Vec<Vec<f64>> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| e.to_string())?;
            let line = record
                .position()
                .map_or(0, |p| p.line().saturating_sub(1) as usize);
            if line == self.index_line_meas_name {
                columns = vec![Vec::new(); record.len()];
                names = Some(record.iter().map(str::to_string).collect());
                continue;
            }
            if line < self.header_lines || (record.len() == 1 && record[0].is_empty()) {
                continue;
            }
            let Some(header) = &names else {
                return Err(format!("line {}: data before the column names", line + 1));
            };
            if record.len() != header.len() {
                return Err(format!(
                    "line {}: {} fields, expected {}",
                    line + 1,
                    record.len(),
                    header.len()
                ));
            }
            for (column, field) in columns.iter_mut().zip(record.iter()) {
                let v = parse_number(field)
                    .ok_or_else(|| format!("line {}: bad number '{field}'", line + 1))?;
                column.push(v);
            }
        }
        let names = names.ok_or_else(|| {
            format!("missing column-name line {}", self.index_line_meas_name)
        })?;
        let mut set = ChannelSet::default();
        for (channel, key) in &self.key_measurement_extraction {
            if let Some(col) = names.iter().position(|n| n.eq_ignore_ascii_case(key)) {
                set.set(*channel, std::mem::take(&mut columns[col]));
            }
        }
        if set.is_empty() {
            return Err("no recognised measurement column".to_string());
        }
        Ok(set)
    }
}

fn parse_number(field: &str) -> Option<f64> {
    let f = field.trim();
    if f.is_empty() || f.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    f.parse::<f64>().ok()
}

/// One delimited text file per pixel, cut into segments by the bias schedule.
#[derive(Clone, Debug)]
pub struct TextTableSource {
    files: Vec<PathBuf>,
    layout: TableLayout,
    bias: SspfmBias,
    trim: SegmentTrim,
}

impl TextTableSource {
    pub fn new(files: Vec<PathBuf>, layout: TableLayout, bias: SspfmBias, trim: SegmentTrim) -> Self {
        Self {
            files,
            layout,
            bias,
            trim,
        }
    }

    /// Every file in `dir` with the given extension, in natural name order.
    pub fn from_dir(
        dir: &Path,
        extension: &str,
        layout: TableLayout,
        bias: SspfmBias,
        trim: SegmentTrim,
    ) -> Result<Self> {
        let entries = fs::read_dir(dir)
            .map_err(|e| SspfmError::io(format!("Failed to list {}", dir.display()), e))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .map(|x| x.eq_ignore_ascii_case(extension))
                    .unwrap_or(false)
            })
            .collect();
        files.sort_by_key(|p| natural_key(p));
        debug!("TextTableSource: {} files in {}", files.len(), dir.display());
        Ok(Self::new(files, layout, bias, trim))
    }
}

fn natural_key(path: &Path) -> (String, u64) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<char>>()
        .into_iter()
        .rev()
        .collect();
    let prefix = stem[..stem.len() - digits.len()].to_string();
    (prefix, digits.parse().unwrap_or(0))
}

impl SegmentSource for TextTableSource {
    fn pixel_count(&self) -> usize {
        self.files.len()
    }

    fn read_pixel(&self, index: usize) -> Result<PixelSegments> {
        let path = self
            .files
            .get(index)
            .ok_or_else(|| SspfmError::parse(index, "pixel index beyond file list"))?;
        let contents = fs::read_to_string(path)
            .map_err(|e| SspfmError::parse(index, format!("{}: {e}", path.display())))?;
        let measurement = self
            .layout
            .parse(&contents)
            .map_err(|e| SspfmError::parse(index, format!("{}: {e}", path.display())))?;
        cut_segments(index, &measurement, &self.bias, &self.trim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_maps_source_columns_to_channels() {
        let mut layout = TableLayout {
            header_lines: 2,
            index_line_meas_name: 1,
            delimiter: ",".to_string(),
            ..Default::default()
        };
        layout
            .key_measurement_extraction
            .insert(Channel::Amp, "Amplitude [nm]".to_string());
        let text = "# pixel 4\ntimes,Amplitude [nm],pha\n0.0,1.5,90\n0.1,nan,91\n";
        let set = layout.parse(text).expect("parse");
        assert_eq!(set.get(Channel::Times), Some(&[0.0, 0.1][..]));
        let amp = set.get(Channel::Amp).expect("amp");
        assert_eq!(amp[0], 1.5);
        assert!(amp[1].is_nan());
        assert!(set.get(Channel::Height).is_none());
    }

    #[test]
    fn empty_cells_stay_in_their_column() {
        let layout = TableLayout {
            delimiter: ",".to_string(),
            ..Default::default()
        };
        let set = layout
            .parse("times,amp,pha\n0.0,,90\n0.1,2.0,91\n")
            .expect("parse");
        let amp = set.get(Channel::Amp).expect("amp");
        assert!(amp[0].is_nan());
        assert_eq!(amp[1], 2.0);
        assert_eq!(set.get(Channel::Pha), Some(&[90.0, 91.0][..]));
        assert_eq!(set.get(Channel::Times).map(<[f64]>::len), Some(2));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let layout = TableLayout {
            delimiter: ",".to_string(),
            ..Default::default()
        };
        let err = layout.parse("times,amp,pha\n0.0,1.0\n").unwrap_err();
        assert!(err.contains("line 2"), "{err}");
        let multi = TableLayout {
            delimiter: "::".to_string(),
            ..Default::default()
        };
        assert!(multi.parse("times\n0.0\n").is_err());
    }

    fn tiny_bias() -> SspfmBias {
        SspfmBias {
            min_volt_write: -1.0,
            max_volt_write: 1.0,
            nb_volt_write: 2,
            write_mode: Default::default(),
            min_volt_read: 0.0,
            max_volt_read: 0.0,
            nb_volt_read: 1,
            read_mode: Default::default(),
            nb_cycles: 1,
            samples_write: 2,
            samples_read: 2,
        }
    }

    #[test]
    fn directory_source_reads_files_in_natural_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bias = tiny_bias();
        let n = bias.samples_per_pixel();
        for file_no in [1usize, 2, 10] {
            let mut text = String::from("times\tamp\tpha\n");
            for i in 0..n {
                let amp = (100 * file_no + i / 2) as f64;
                text.push_str(&format!("{}\t{amp}\t90\n", i as f64 * 0.01));
            }
            fs::write(dir.path().join(format!("px_{file_no}.txt")), text).expect("write");
        }
        fs::write(dir.path().join("notes.md"), "not a pixel").expect("write");

        let source = TextTableSource::from_dir(
            dir.path(),
            "txt",
            TableLayout::default(),
            bias,
            SegmentTrim::default(),
        )
        .expect("source");
        assert_eq!(source.pixel_count(), 3);

        for (index, file_no) in [(0usize, 1usize), (1, 2), (2, 10)] {
            let px = source.read_pixel(index).expect("pixel");
            assert_eq!(px.index, index);
            assert_eq!(px.segments.len(), 8);
            for (k, seg) in px.segments.iter().enumerate() {
                assert_eq!(seg.mean(Channel::Amp), (100 * file_no + k) as f64);
            }
        }
        assert!(source.read_pixel(3).is_err());
    }

    #[test]
    fn natural_order_sorts_numeric_suffix() {
        let mut files = vec![
            PathBuf::from("px_10.txt"),
            PathBuf::from("px_2.txt"),
            PathBuf::from("px_1.txt"),
        ];
        files.sort_by_key(|p| natural_key(p));
        assert_eq!(files[0], PathBuf::from("px_1.txt"));
        assert_eq!(files[2], PathBuf::from("px_10.txt"));
    }

    #[test]
    fn memory_source_reports_gaps_as_parse_errors() {
        let src = MemorySource::with_gaps(vec![Some(PixelSegments::default()), None]);
        assert!(src.read_pixel(0).is_ok());
        assert!(src.read_pixel(1).unwrap_err().is_per_pixel());
        assert!(src.read_pixel(5).is_err());
    }
}
