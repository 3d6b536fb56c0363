//! Oriented window sampling at vector points.
//!
//! For every point the sampler extracts a (possibly rotated) window from the
//! raster, hands it to each [`SummaryCalculator`] and stores the returned
//! values as new columns on the point.

pub mod calculators;
pub mod window;

pub use calculators::{BandStatsCalculator, RoiExportCalculator, SummaryCalculator};
pub use window::{extract_window, RoiWindow, SampleWindow, MAX_HALF_SIZE};

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use crate::config::SamplerConfig;
use crate::error::{BlockError, Result};
use crate::progress::{NoProgress, ProgressReporter};
use crate::raster::Dataset;
use crate::vector::{self, PointFeature, PointLayer};

fn half_size(idx: usize, feature: &PointFeature, col: &str) -> Result<usize> {
    let v = feature.number(col).ok_or_else(|| {
        BlockError::InputValue(format!("feature {idx} has no numeric '{col}' column"))
    })?;
    if !v.is_finite() || v < 0.0 || v.fract() != 0.0 {
        return Err(BlockError::InputValue(format!(
            "feature {idx}: '{col}' must be a non-negative whole number of pixels, got {v}"
        )));
    }
    if v > MAX_HALF_SIZE as f64 {
        return Err(BlockError::InputValue(format!(
            "feature {idx}: '{col}' of {v} pixels exceeds {MAX_HALF_SIZE}"
        )));
    }
    Ok(v as usize)
}

/// Runs a set of calculators over windows around every point of a layer.
pub struct WindowSampler {
    config: SamplerConfig,
    progress: Box<dyn ProgressReporter>,
}

impl WindowSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: impl ProgressReporter + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Window requests for every feature, checked before any raster is read.
    pub fn windows(&self, layer: &PointLayer) -> Result<Vec<SampleWindow>> {
        layer
            .features
            .iter()
            .enumerate()
            .map(|(idx, f)| {
                let half_width = half_size(idx, f, &self.config.x_box_col)?;
                let half_height = half_size(idx, f, &self.config.y_box_col)?;
                let angle = match &self.config.angle_col {
                    Some(col) => f.number(col).ok_or_else(|| {
                        BlockError::InputValue(format!(
                            "feature {idx} has no numeric '{col}' column"
                        ))
                    })?,
                    None => 0.0,
                };
                SampleWindow::new(f.x, f.y, half_width, half_height, angle).map_err(|e| match e {
                    BlockError::InputValue(msg) => {
                        BlockError::InputValue(format!("feature {idx}: {msg}"))
                    }
                    other => other,
                })
            })
            .collect()
    }

    /// Sample `dataset` at every point of `layer` and return the layer with
    /// the calculators' columns added.
    pub fn sample_points(
        &mut self,
        dataset: &mut Dataset,
        layer: &PointLayer,
        calculators: &mut [Box<dyn SummaryCalculator>],
    ) -> Result<PointLayer> {
        let windows = self.windows(layer)?;
        let columns = output_columns(calculators)?;

        let fill = self.config.no_data_val.or(dataset.grid().no_data);
        let total = windows.len();
        let mut out = layer.clone();
        for (idx, (window, feature)) in windows.iter().zip(out.features.iter_mut()).enumerate() {
            let roi = extract_window(dataset, window, self.config.resampling, fill)?;
            for (calc, names) in calculators.iter_mut().zip(&columns) {
                let vals = calc.calc_vals(idx, &roi)?;
                for name in names {
                    let v = vals.get(name).ok_or_else(|| {
                        BlockError::Configuration(format!(
                            "calculator did not return a value for '{name}' (feature {idx})"
                        ))
                    })?;
                    feature.set_number(name, *v);
                }
            }
            self.progress.report(idx + 1, total);
        }
        debug!(points = total, "sampled windows");
        Ok(out)
    }

    /// Sample the raster at `raster_path` at the points in `vec_path` and
    /// write the augmented layer to `out_path`.
    ///
    /// Nothing is written unless every point succeeds.
    pub fn run<P, Q, R>(
        &mut self,
        raster_path: P,
        vec_path: Q,
        calculators: &mut [Box<dyn SummaryCalculator>],
        out_path: R,
    ) -> Result<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
        R: AsRef<Path>,
    {
        let layer = vector::read_geojson(vec_path)?;
        // Fail on bad attributes before touching the raster.
        self.windows(&layer)?;
        output_columns(calculators)?;

        let mut dataset = Dataset::open(raster_path)?;
        let sampled = self.sample_points(&mut dataset, &layer, calculators)?;
        vector::write_layer(
            &sampled,
            out_path.as_ref(),
            self.config.out_format,
            self.config.out_layer.as_deref(),
        )?;
        info!(
            points = sampled.len(),
            path = %out_path.as_ref().display(),
            "wrote sampled points"
        );
        Ok(())
    }
}

/// Declared column names per calculator, checked for consistency and
/// uniqueness across calculators.
fn output_columns(calculators: &[Box<dyn SummaryCalculator>]) -> Result<Vec<Vec<String>>> {
    let mut seen = HashSet::new();
    let mut all = Vec::with_capacity(calculators.len());
    for calc in calculators {
        let names = calc.out_val_names();
        if names.len() != calc.n_out_vals() {
            return Err(BlockError::Configuration(format!(
                "calculator declares {} values but names {}",
                calc.n_out_vals(),
                names.len()
            )));
        }
        for name in &names {
            if !seen.insert(name.clone()) {
                return Err(BlockError::Configuration(format!(
                    "output column '{name}' is produced by more than one calculator"
                )));
            }
        }
        all.push(names);
    }
    Ok(all)
}

/// Sample `raster_path` at the points of `vec_path` with `calculators` and
/// write the result to `out_path`.
pub fn calc_pt_smpl_img_vals<P, Q, R>(
    raster_path: P,
    vec_path: Q,
    calculators: &mut [Box<dyn SummaryCalculator>],
    config: &SamplerConfig,
    out_path: R,
) -> Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: AsRef<Path>,
{
    WindowSampler::new(config.clone()).run(raster_path, vec_path, calculators, out_path)
}
