//! Configuration records and their loaders.
//!
//! Every record rejects unknown keys. Keys starting with `color_` only affect
//! rendering and are stripped before deserialization.

pub mod analysis;
pub mod metadata;

pub use analysis::{AnalysisConfig, ExtractParameters};
pub use metadata::ScanMetadata;

use crate::cluster::ClusterOptions;
use crate::error::{Result, SspfmError};
use crate::geometry::Mask;
use crate::map::{BoundsPrompt, InteractiveMask, ListMask, MapOptions, MaskPolicy, ProgrammaticMask};
use crate::properties::PropertyBundle;
use crate::types::Mode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Where per-pixel files are read from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    pub dir: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_extension() -> String {
    "txt".to_string()
}

/// Excluded pixel selection for maps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum MaskConfig {
    #[default]
    None,
    List {
        indices: Vec<usize>,
        #[serde(default)]
        revert: bool,
    },
    Criterion {
        mode: Mode,
        property: String,
        v_min: f64,
        v_max: f64,
        #[serde(default)]
        revert: bool,
        /// Ask for new bounds on the terminal until accepted.
        #[serde(default)]
        interactive: bool,
    },
}

impl MaskConfig {
    /// Resolve the mask against `bundle`. `prompt` is only asked when the
    /// criterion is interactive.
    pub fn build<P: BoundsPrompt>(&self, bundle: &PropertyBundle, prompt: P) -> Result<Mask> {
        let n = bundle.grid.len();
        match self {
            MaskConfig::None => Ok(Mask::empty()),
            MaskConfig::List { indices, revert } => ListMask {
                indices: indices.clone(),
                revert: *revert,
            }
            .build(&vec![f64::NAN; n]),
            MaskConfig::Criterion {
                mode,
                property,
                v_min,
                v_max,
                revert,
                interactive,
            } => {
                let reference = bundle.get(*mode, property).ok_or_else(|| {
                    SspfmError::Config(format!("mask reference '{property}' missing in mode {mode}"))
                })?;
                if *interactive {
                    InteractiveMask {
                        prompt,
                        initial: (*v_min, *v_max),
                        revert: *revert,
                    }
                    .build(reference)
                } else {
                    ProgrammaticMask {
                        v_min: *v_min,
                        v_max: *v_max,
                        revert: *revert,
                    }
                    .build(reference)
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapConfig {
    pub modes: Vec<Mode>,
    /// Properties to map; every column when empty.
    pub properties: Vec<String>,
    pub mask: MaskConfig,
    pub interpolation: MapOptions,
    /// Write a grayscale PNG per map.
    pub png: bool,
    pub correlation: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            modes: vec![Mode::Off, Mode::On, Mode::Coupled],
            properties: Vec::new(),
            mask: MaskConfig::None,
            interpolation: MapOptions::default(),
            png: true,
            correlation: true,
        }
    }
}

/// Per-pixel vector used as clustering input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopChannel {
    Piezorep,
    Amp,
    Pha,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterConfig {
    /// `other` holds force curves and is only clustered when listed.
    pub modes: Vec<Mode>,
    /// Loop channels concatenated per pixel.
    pub channels: Vec<LoopChannel>,
    pub options: ClusterOptions,
    /// Largest `k` of the elbow scan.
    pub elbow_k_max: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            modes: vec![Mode::Off, Mode::On, Mode::Coupled],
            channels: vec![LoopChannel::Piezorep],
            options: ClusterOptions::default(),
            elbow_k_max: 8,
        }
    }
}

/// Complete run description loaded by the command-line tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub input: InputConfig,
    /// Measurement sheet file, relative to the config file.
    pub measurement_sheet: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

/// File formats accepted by [`load_config`].
fn format_of(path: &Path) -> Result<ExtractParameters> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => Ok(ExtractParameters::Json),
        Some("toml") => Ok(ExtractParameters::Toml),
        Some("py") => Ok(ExtractParameters::Python),
        _ => Err(SspfmError::Config(format!(
            "Unsupported config format {}",
            path.display()
        ))),
    }
}

fn strip_rendering_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|k, _| !k.starts_with("color_"));
            map.values_mut().for_each(strip_rendering_keys);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_rendering_keys),
        _ => {}
    }
}

fn python_rejected(path: &Path) -> SspfmError {
    SspfmError::Config(format!(
        "Python parameter files are not supported ({}); use json or toml",
        path.display()
    ))
}

/// Read a JSON or TOML file into `T`.
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = format_of(path)?;
    if format == ExtractParameters::Python {
        return Err(python_rejected(path));
    }
    let data = fs::read_to_string(path)
        .map_err(|e| SspfmError::Config(format!("Failed to read config {}: {e}", path.display())))?;
    parse_config(&data, format)
        .map_err(|e| SspfmError::Config(format!("Failed to parse config {}: {e}", path.display())))
}

fn parse_config<T: DeserializeOwned>(data: &str, format: ExtractParameters) -> std::result::Result<T, String> {
    let mut value: Value = match format {
        ExtractParameters::Toml => toml::from_str(data).map_err(|e| e.to_string())?,
        _ => serde_json::from_str(data).map_err(|e| e.to_string())?,
    };
    if let Some(ExtractParameters::Python) = value
        .get("analysis")
        .or(Some(&value))
        .and_then(|v| v.get("extract_parameters"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
    {
        return Err("extract_parameters = python is not supported".to_string());
    }
    strip_rendering_keys(&mut value);
    serde_json::from_value(value).map_err(|e| e.to_string())
}

/// Load a run config and resolve its paths against the config directory.
pub fn load_run_config(path: &Path) -> Result<RunConfig> {
    let mut config: RunConfig = load_config(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    for p in [
        &mut config.input.dir,
        &mut config.measurement_sheet,
        &mut config.output_dir,
    ] {
        if p.is_relative() {
            *p = base.join(&*p);
        }
    }
    Ok(config)
}

pub fn load_metadata(path: &Path) -> Result<ScanMetadata> {
    let meta: ScanMetadata = load_config(path)?;
    meta.validate()?;
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hysteresis::FitMethod;
    use crate::phase::PeakMethod;

    #[test]
    fn analysis_keys_map_onto_options() {
        let json = r#"{
            "fit_method": "nelder",
            "histo_phase_method": "max",
            "electrostatic_offset": true,
            "color_map": "viridis",
            "sat_domain": [-4.0, 4.0]
        }"#;
        let cfg: AnalysisConfig = parse_config(json, ExtractParameters::Json).expect("parse");
        assert_eq!(cfg.hysteresis_options().method, FitMethod::Nelder);
        assert_eq!(cfg.phase_options().peak_method, PeakMethod::Max);
        assert!(cfg.electrostatic_options().electrostatic_offset);
        assert_eq!(cfg.sat_domain, Some((-4.0, 4.0)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse_config::<AnalysisConfig>(r#"{"fit_methd": "nelder"}"#, ExtractParameters::Json);
        assert!(err.is_err());
    }

    #[test]
    fn python_loader_is_rejected() {
        let err = parse_config::<AnalysisConfig>(
            r#"{"extract_parameters": "python"}"#,
            ExtractParameters::Json,
        );
        assert!(err.is_err());
        assert!(matches!(
            load_config::<AnalysisConfig>(Path::new("params.py")),
            Err(SspfmError::Config(_))
        ));
    }

    struct Refuse;

    impl BoundsPrompt for Refuse {
        fn ask(&mut self, _: (f64, f64), _: usize, _: usize) -> Result<crate::map::PromptReply> {
            Ok(crate::map::PromptReply::Cancel)
        }
    }

    #[test]
    fn mask_configs_resolve_against_the_bundle() {
        let mut bundle = PropertyBundle::new(crate::types::Grid::new(2, 2));
        bundle
            .insert(Mode::Off, "r_square", vec![0.99, 0.5, 0.95, f64::NAN])
            .expect("insert");
        let criterion = MaskConfig::Criterion {
            mode: Mode::Off,
            property: "r_square".into(),
            v_min: 0.9,
            v_max: 1.0,
            revert: false,
            interactive: false,
        };
        assert_eq!(criterion.build(&bundle, Refuse).expect("mask").to_vec(), vec![1, 3]);

        let list = MaskConfig::List {
            indices: vec![0],
            revert: true,
        };
        assert_eq!(list.build(&bundle, Refuse).expect("mask").to_vec(), vec![1, 2, 3]);

        let interactive = MaskConfig::Criterion {
            mode: Mode::Off,
            property: "r_square".into(),
            v_min: 0.9,
            v_max: 1.0,
            revert: false,
            interactive: true,
        };
        assert!(matches!(interactive.build(&bundle, Refuse), Err(SspfmError::UserAbort)));
    }

    #[test]
    fn toml_run_config() {
        let text = r#"
            measurement_sheet = "sheet.toml"
            output_dir = "out"

            [input]
            dir = "raw"

            [analysis]
            fit_method = "leastsq"
            del_1st_loop = true

            [map.mask]
            kind = "criterion"
            mode = "off"
            property = "r_square"
            v_min = 0.9
            v_max = 1.0
            color_mask = "red"

            [cluster]
            elbow_k_max = 5
        "#;
        let cfg: RunConfig = parse_config(text, ExtractParameters::Toml).expect("parse");
        assert_eq!(cfg.input.extension, "txt");
        assert!(cfg.analysis.del_1st_loop);
        assert!(matches!(cfg.map.mask, MaskConfig::Criterion { mode: Mode::Off, .. }));
        assert_eq!(cfg.cluster.elbow_k_max, 5);
        assert_eq!(cfg.cluster.options.n_init, 20);
    }
}
