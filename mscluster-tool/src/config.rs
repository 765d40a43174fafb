use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use mscluster::params::ClusteringParameters;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolError};

pub const DEFAULT_PRECURSOR_SCALE: f64 = 1000.0;
pub const DEFAULT_FRAGMENT_BIN_WIDTH: f64 = 0.5;

/// How peak lists in Th are mapped onto the integer m/z space of the engine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSettings {
    /// Precursor m/z is stored as `round(mz * precursor_scale)`.
    pub precursor_scale: f64,
    /// Fragment peaks are binned as `floor(mz / fragment_bin_width)`.
    pub fragment_bin_width: f64,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        ConversionSettings {
            precursor_scale: DEFAULT_PRECURSOR_SCALE,
            fragment_bin_width: DEFAULT_FRAGMENT_BIN_WIDTH,
        }
    }
}

impl ConversionSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.precursor_scale.is_finite() && self.precursor_scale > 0.0) {
            return Err(ToolError::InvalidSetting {
                name: "precursor_scale",
                reason: format!("must be positive, got {}", self.precursor_scale),
            });
        }
        if !(self.fragment_bin_width.is_finite() && self.fragment_bin_width > 0.0) {
            return Err(ToolError::InvalidSetting {
                name: "fragment_bin_width",
                reason: format!("must be positive, got {}", self.fragment_bin_width),
            });
        }
        Ok(())
    }
}

/// Contents of the JSON configuration file. Missing keys take their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub clustering: ClusteringParameters,
    pub conversion: ConversionSettings,
}

impl ToolConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: ToolConfig = serde_json::from_reader(reader)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.clustering.validate()?;
        self.conversion.validate()
    }
}
