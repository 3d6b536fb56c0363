//! PyO3 binding for oriented window extraction.

use ndarray::Array3;
use numpy::{PyArray3, PyReadonlyArray3};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use super::to_py_err;
use crate::affine::Affine;
use crate::raster::Dataset;
use crate::resample::ResamplingMethod;
use crate::sampler::{self, SampleWindow};

type WindowResult<'py> = (Bound<'py, PyArray3<f64>>, (f64, f64, f64, f64, f64, f64));

/// Extract a rotated window around a point from an in-memory raster.
///
/// Args:
///     src: Raster as a (bands, rows, cols) f64 array.
///     transform: Affine transform (a, b, c, d, e, f) of `src`.
///     x, y: Sample point in the raster's CRS.
///     half_width, half_height: Window half sizes in pixels.
///     angle: Clockwise rotation in degrees, >= 0.
///     resampling: "nearest", "bilinear" or "cubic".
///     nodata: No-data value of `src`.
///     fill: Value for samples without valid data. Defaults to NaN.
///
/// Returns:
///     Tuple of the (bands, 2*half_height+1, 2*half_width+1) window and its
///     affine transform.
#[pyfunction]
#[pyo3(signature = (src, transform, x, y, half_width, half_height, angle=0.0, resampling="nearest", nodata=None, fill=None))]
#[allow(clippy::too_many_arguments)]
pub fn extract_window<'py>(
    py: Python<'py>,
    src: PyReadonlyArray3<'py, f64>,
    transform: [f64; 6],
    x: f64,
    y: f64,
    half_width: usize,
    half_height: usize,
    angle: f64,
    resampling: &str,
    nodata: Option<f64>,
    fill: Option<f64>,
) -> PyResult<WindowResult<'py>> {
    let method = ResamplingMethod::from_name(resampling)
        .ok_or_else(|| PyValueError::new_err(format!("Unknown resampling method: {resampling}")))?;
    let window = SampleWindow::new(x, y, half_width, half_height, angle).map_err(to_py_err)?;
    let src_array: Array3<f64> = src.as_array().to_owned();
    let [a, b, c, d, e, f] = transform;

    let roi = py
        .allow_threads(move || {
            let mut ds = Dataset::mem(src_array, Affine::new(a, b, c, d, e, f), None, nodata);
            sampler::extract_window(&mut ds, &window, method, fill)
        })
        .map_err(to_py_err)?;

    let out_transform = roi.transform.to_tuple();
    Ok((PyArray3::from_owned_array(py, roi.data), out_transform))
}
