//! Interpolation kernels used when sampling a rotated window.
//!
//! All kernels take corner-based pixel coordinates: pixel (0, 0) spans
//! `[0, 1) x [0, 1)` and its centre is at (0.5, 0.5). A kernel returns
//! `None` when its neighbourhood leaves the array or touches an invalid
//! value (no-data or NaN).

pub mod bilinear;
pub mod cubic;
pub mod nearest;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingMethod {
    #[default]
    Nearest,
    Bilinear,
    Cubic,
}

impl ResamplingMethod {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "nearest" | "near" => Some(Self::Nearest),
            "bilinear" => Some(Self::Bilinear),
            "cubic" => Some(Self::Cubic),
            _ => None,
        }
    }

    /// How far from the sample point the kernel reads, in pixels.
    pub fn kernel_radius(&self) -> f64 {
        match self {
            Self::Nearest => 0.5,
            Self::Bilinear => 1.0,
            Self::Cubic => 2.0,
        }
    }

    pub fn sample(&self, src: &ArrayView2<'_, f64>, x: f64, y: f64, no_data: Option<f64>) -> Option<f64> {
        match self {
            Self::Nearest => nearest::sample(src, x, y, no_data),
            Self::Bilinear => bilinear::sample(src, x, y, no_data),
            Self::Cubic => cubic::sample(src, x, y, no_data),
        }
    }
}

#[inline]
pub(crate) fn is_valid(v: f64, no_data: Option<f64>) -> bool {
    !v.is_nan() && no_data.map_or(true, |nd| v != nd)
}
