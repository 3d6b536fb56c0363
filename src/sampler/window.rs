//! Extraction of one oriented window around a point.

use ndarray::{s, Array3, ArrayView2};
use tracing::trace;

use crate::affine::Affine;
use crate::error::{BlockError, Result};
use crate::geometry::{find_point_on_whole_num_grid, PixelBBox};
use crate::raster::Dataset;
use crate::resample::{is_valid, ResamplingMethod};

/// Largest accepted half width or height, in pixels. Keeps the window and
/// its read margin well inside integer range.
pub const MAX_HALF_SIZE: usize = (u32::MAX / 4) as usize;

/// A window request: centre point, half sizes in pixels and a rotation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleWindow {
    pub x: f64,
    pub y: f64,
    pub half_width: usize,
    pub half_height: usize,
    /// Degrees, clockwise as seen on a north-up image.
    pub angle: f64,
}

impl SampleWindow {
    pub fn new(x: f64, y: f64, half_width: usize, half_height: usize, angle: f64) -> Result<Self> {
        if !x.is_finite() || !y.is_finite() {
            return Err(BlockError::InputValue(format!(
                "window centre ({x}, {y}) is not finite"
            )));
        }
        if !angle.is_finite() || angle < 0.0 {
            return Err(BlockError::InputValue(format!(
                "rotation angle must be finite and >= 0, got {angle}"
            )));
        }
        if half_width > MAX_HALF_SIZE || half_height > MAX_HALF_SIZE {
            return Err(BlockError::InputValue(format!(
                "window half sizes {half_width}x{half_height} exceed {MAX_HALF_SIZE} pixels"
            )));
        }
        Ok(Self {
            x,
            y,
            half_width,
            half_height,
            angle,
        })
    }

    pub fn n_cols(&self) -> usize {
        2 * self.half_width + 1
    }

    pub fn n_rows(&self) -> usize {
        2 * self.half_height + 1
    }

    /// Margin read around the window so a rotation never pulls in
    /// pixels that were not read.
    pub fn buffer(&self) -> usize {
        2 * self.half_width.max(self.half_height)
    }
}

/// The extracted, rotated window handed to summary calculators.
#[derive(Clone, Debug)]
pub struct RoiWindow {
    /// `(bands, 2 * half_height + 1, 2 * half_width + 1)`.
    pub data: Array3<f64>,
    /// Geotransform of the unrotated window.
    pub transform: Affine,
    pub epsg: Option<u32>,
    /// Value used for samples without valid data; `None` means NaN.
    pub no_data: Option<f64>,
    /// Centre of the pixel containing the sample point.
    pub centre: (f64, f64),
    pub angle: f64,
}

impl RoiWindow {
    pub fn n_bands(&self) -> usize {
        self.data.dim().0
    }

    /// One band (1-based).
    pub fn band(&self, band: usize) -> Option<ArrayView2<'_, f64>> {
        (band >= 1 && band <= self.n_bands()).then(|| self.data.slice(s![band - 1, .., ..]))
    }

    pub fn is_valid(&self, v: f64) -> bool {
        is_valid(v, self.no_data)
    }
}

/// Extract `window` from `dataset`.
///
/// The pixel containing the point is the window centre. A buffered region
/// around it is read, rotated by `window.angle` about that pixel's centre and
/// resampled onto the unrotated window grid. Samples that fall off the
/// raster or touch its no-data value get `fill` (NaN if `None`).
pub fn extract_window(
    dataset: &mut Dataset,
    window: &SampleWindow,
    method: ResamplingMethod,
    fill: Option<f64>,
) -> Result<RoiWindow> {
    let grid = dataset.grid().clone();
    let (pc, pr) = find_point_on_whole_num_grid(&grid.transform, window.x, window.y)
        .ok_or_else(|| {
            BlockError::InputValue(format!(
                "{} has a non-invertible geotransform",
                grid.path.display()
            ))
        })?;
    if pc < 0 || pr < 0 || pc >= grid.width as i64 || pr >= grid.height as i64 {
        return Err(BlockError::InputValue(format!(
            "point ({}, {}) is outside {}",
            window.x,
            window.y,
            grid.path.display()
        )));
    }
    if window.n_cols() > grid.width || window.n_rows() > grid.height {
        return Err(BlockError::InputValue(format!(
            "{}x{} window is larger than the {}x{} raster {}",
            window.n_cols(),
            window.n_rows(),
            grid.width,
            grid.height,
            grid.path.display()
        )));
    }

    let (hw, hh) = (window.half_width as i64, window.half_height as i64);
    // The kernel reaches past the rotated footprint.
    let buf = (window.buffer() + method.kernel_radius().ceil() as usize) as i64;
    let roi = PixelBBox::new(pc - hw, pc + hw + 1, pr - hh, pr + hh + 1);
    let read = PixelBBox::new(roi.min_x - buf, roi.max_x + buf, roi.min_y - buf, roi.max_y + buf)
        .clip(grid.width, grid.height);

    let n_bands = grid.n_bands;
    let mut src = Array3::zeros((n_bands, read.height() as usize, read.width() as usize));
    for b in 0..n_bands {
        dataset.read_window(
            b + 1,
            read.min_x as usize,
            read.min_y as usize,
            src.slice_mut(s![b, .., ..]),
        )?;
    }
    trace!(col = pc, row = pr, ?read, "read buffered window");

    // Pixel space of the buffered read from here on.
    let cx = (pc - read.min_x) as f64 + 0.5;
    let cy = (pr - read.min_y) as f64 + 0.5;
    let to_src = Affine::rotation_about(window.angle, cx, cy).inverse()?;
    let (x0, y0) = ((roi.min_x - read.min_x) as f64, (roi.min_y - read.min_y) as f64);

    let fill_val = fill.unwrap_or(f64::NAN);
    let mut data = Array3::from_elem((n_bands, window.n_rows(), window.n_cols()), fill_val);
    let bands: Vec<ArrayView2<'_, f64>> = (0..n_bands).map(|b| src.slice(s![b, .., ..])).collect();
    for i in 0..window.n_rows() {
        for j in 0..window.n_cols() {
            let (sx, sy) = to_src.forward(x0 + j as f64 + 0.5, y0 + i as f64 + 0.5);
            for (b, band) in bands.iter().enumerate() {
                if let Some(v) = method.sample(band, sx, sy, grid.no_data) {
                    data[(b, i, j)] = v;
                }
            }
        }
    }

    Ok(RoiWindow {
        data,
        transform: grid
            .transform
            .shifted_to(roi.min_x as f64, roi.min_y as f64),
        epsg: grid.epsg,
        no_data: fill,
        centre: grid.transform.forward(pc as f64 + 0.5, pr as f64 + 0.5),
        angle: window.angle,
    })
}
