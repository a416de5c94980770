use crate::signal::SspfmBias;
use crate::types::Grid;
use serde::{Deserialize, Serialize};

/// Measurement sheet of one scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanMetadata {
    pub grid: Grid,
    /// Cantilever stiffness in N/m.
    #[serde(default)]
    pub tip_stiffness: Option<f64>,
    /// Samples held at each bias step before acquisition.
    #[serde(default)]
    pub hold_samples: Option<usize>,
    #[serde(default)]
    pub q_factor: Option<f64>,
    pub bias: SspfmBias,
    /// Bias applied to the sample with the tip grounded.
    #[serde(default)]
    pub grounded_tip: bool,
}

impl ScanMetadata {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.grid.is_empty() {
            return Err(crate::error::SspfmError::Config(format!(
                "empty scan grid {}x{}",
                self.grid.nx, self.grid.ny
            )));
        }
        self.bias.validate()
    }
}
