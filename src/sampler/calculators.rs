//! Summary calculators run on every extracted window.

use std::collections::HashMap;
use std::path::PathBuf;

use ndarray::s;

use super::window::RoiWindow;
use crate::error::{BlockError, Result};
use crate::raster::{DataType, Dataset, Driver};

/// Turns one window into named numeric columns.
///
/// `calc_vals` must return a value for every name in `out_val_names`.
pub trait SummaryCalculator {
    fn n_out_vals(&self) -> usize {
        self.out_val_names().len()
    }

    fn out_val_names(&self) -> Vec<String>;

    fn calc_vals(&mut self, index: usize, roi: &RoiWindow) -> Result<HashMap<String, f64>>;
}

/// Mean, standard deviation, minimum and maximum of one band, ignoring
/// samples without valid data. All four are NaN when nothing is valid.
#[derive(Debug, Clone)]
pub struct BandStatsCalculator {
    band: usize,
    prefix: String,
}

impl BandStatsCalculator {
    /// `band` is 1-based; columns are named `{prefix}_mean` etc.
    pub fn new(band: usize, prefix: impl Into<String>) -> Self {
        Self {
            band,
            prefix: prefix.into(),
        }
    }
}

impl SummaryCalculator for BandStatsCalculator {
    fn out_val_names(&self) -> Vec<String> {
        ["mean", "std", "min", "max"]
            .iter()
            .map(|stat| format!("{}_{stat}", self.prefix))
            .collect()
    }

    fn calc_vals(&mut self, _index: usize, roi: &RoiWindow) -> Result<HashMap<String, f64>> {
        let band = roi.band(self.band).ok_or_else(|| {
            BlockError::Configuration(format!(
                "band {} requested but the window has {} bands",
                self.band,
                roi.n_bands()
            ))
        })?;

        let (mut n, mut sum, mut sum_sq) = (0usize, 0.0, 0.0);
        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
        for &v in band.iter().filter(|&&v| roi.is_valid(v)) {
            n += 1;
            sum += v;
            sum_sq += v * v;
            min = min.min(v);
            max = max.max(v);
        }

        let (mean, std) = if n == 0 {
            (f64::NAN, f64::NAN)
        } else {
            let mean = sum / n as f64;
            (mean, (sum_sq / n as f64 - mean * mean).max(0.0).sqrt())
        };
        if n == 0 {
            min = f64::NAN;
            max = f64::NAN;
        }

        let names = self.out_val_names();
        Ok(names.into_iter().zip([mean, std, min, max]).collect())
    }
}

/// Writes every window to `{out_dir}/{prefix}_{index}.tif`. Adds no columns.
#[derive(Debug, Clone)]
pub struct RoiExportCalculator {
    out_dir: PathBuf,
    prefix: String,
    data_type: DataType,
}

impl RoiExportCalculator {
    pub fn new(out_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            prefix: prefix.into(),
            data_type: DataType::Float32,
        }
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.out_dir.join(format!("{}_{index}.tif", self.prefix))
    }
}

impl SummaryCalculator for RoiExportCalculator {
    fn out_val_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn calc_vals(&mut self, index: usize, roi: &RoiWindow) -> Result<HashMap<String, f64>> {
        let (bands, rows, cols) = roi.data.dim();
        let mut ds = Dataset::create(
            self.path_for(index),
            Driver::GTiff,
            cols,
            rows,
            bands,
            self.data_type,
            roi.transform,
            roi.epsg,
            roi.no_data,
        )?;
        for b in 0..bands {
            ds.write_window(b + 1, 0, 0, roi.data.slice(s![b, .., ..]))?;
        }
        ds.flush()?;
        Ok(HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affine::Affine;
    use approx::assert_relative_eq;
    use ndarray::{array, Array3};

    fn roi(data: Array3<f64>, no_data: Option<f64>) -> RoiWindow {
        RoiWindow {
            data,
            transform: Affine::new(10.0, 0.0, 500.0, 0.0, -10.0, 900.0),
            epsg: Some(32630),
            no_data,
            centre: (515.0, 885.0),
            angle: 0.0,
        }
    }

    #[test]
    fn test_band_stats_skip_invalid() {
        let data = array![[[1.0, 2.0, 3.0], [4.0, -9.0, f64::NAN], [5.0, 6.0, 7.0]]];
        let mut calc = BandStatsCalculator::new(1, "b1");
        assert_eq!(calc.n_out_vals(), 4);
        let vals = calc.calc_vals(0, &roi(data, Some(-9.0))).unwrap();
        assert_relative_eq!(vals["b1_mean"], 4.0);
        assert_relative_eq!(vals["b1_std"], 2.0);
        assert_eq!(vals["b1_min"], 1.0);
        assert_eq!(vals["b1_max"], 7.0);
    }

    #[test]
    fn test_band_stats_empty_and_missing_band() {
        let data = Array3::from_elem((1, 2, 2), -9.0);
        let mut calc = BandStatsCalculator::new(1, "b1");
        let vals = calc.calc_vals(0, &roi(data.clone(), Some(-9.0))).unwrap();
        assert!(vals.values().all(|v| v.is_nan()));

        let mut calc = BandStatsCalculator::new(2, "b2");
        assert!(matches!(
            calc.calc_vals(0, &roi(data, None)),
            Err(BlockError::Configuration(_))
        ));
    }

    #[test]
    fn test_export_writes_geotiff() {
        let dir = tempfile::tempdir().unwrap();
        let mut calc = RoiExportCalculator::new(dir.path(), "roi");
        assert_eq!(calc.n_out_vals(), 0);
        let data = Array3::from_shape_fn((2, 3, 4), |(b, r, c)| (b * 100 + r * 10 + c) as f64);
        let vals = calc.calc_vals(3, &roi(data.clone(), Some(-1.0))).unwrap();
        assert!(vals.is_empty());

        let mut ds = Dataset::open(calc.path_for(3)).unwrap();
        let grid = ds.grid().clone();
        assert_eq!((grid.width, grid.height, grid.n_bands), (4, 3, 2));
        assert_eq!(grid.epsg, Some(32630));
        assert_eq!(grid.no_data, Some(-1.0));
        assert_eq!(ds.read_band(2).unwrap(), data.slice(s![1, .., ..]));
    }
}
