//! YAML run configuration for the block iterators and the window sampler.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BlockError, Result};
use crate::resample::ResamplingMethod;
use crate::vector::VectorFormat;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockIterConfig {
    /// Tile edge length in pixels.
    pub tile_size: usize,
    /// Tiles per batch (batch iterator only).
    pub batch_size: usize,
}

impl Default for BlockIterConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            batch_size: 16,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Column holding the rotation angle in degrees. No column: no rotation.
    pub angle_col: Option<String>,
    /// Column holding the window half-width in pixels.
    pub x_box_col: String,
    /// Column holding the window half-height in pixels.
    pub y_box_col: String,
    pub resampling: ResamplingMethod,
    /// Fill value for samples without valid data. Defaults to the raster's
    /// no-data value, or NaN if it has none.
    pub no_data_val: Option<f64>,
    pub out_format: VectorFormat,
    pub out_layer: Option<String>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            angle_col: None,
            x_box_col: "x_box".into(),
            y_box_col: "y_box".into(),
            resampling: ResamplingMethod::Nearest,
            no_data_val: None,
            out_format: VectorFormat::GeoJson,
            out_layer: None,
        }
    }
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| {
        BlockError::io_with(format!("could not read config {}", path.display()), e)
    })?;
    Ok(serde_yaml::from_str(&text)?)
}

impl BlockIterConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_yaml(path.as_ref())
    }
}

impl SamplerConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_yaml(path.as_ref())
    }
}
