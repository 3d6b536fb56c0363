//! Grid alignment, tiled block iteration and oriented window sampling over
//! co-registered rasters.

pub mod affine;
pub mod align;
pub mod blockiter;
pub mod config;
pub mod error;
pub mod geometry;
pub mod progress;
pub mod raster;
pub mod resample;
pub mod sampler;
pub mod tiling;
pub mod vector;

#[cfg(feature = "python")]
mod py;

pub use align::{compute_intersection, Intersection};
pub use blockiter::{Batch, BatchBlockIterator, Block, BlockIterator, ImageBandInfo, OutImageInfo};
pub use error::{BlockError, Result};
pub use sampler::{calc_pt_smpl_img_vals, SummaryCalculator, WindowSampler};
pub use tiling::TileGrid;

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// A Python module implemented in Rust.
#[cfg(feature = "python")]
#[pymodule]
fn _rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    py::register(m)?;
    Ok(())
}
