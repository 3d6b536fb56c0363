//! Geographic and pixel-space rectangles.

use serde::{Deserialize, Serialize};

use crate::affine::Affine;

/// Round half up: `floor(v + 0.5)`.
///
/// Ties at negative coordinates go towards +inf (-2.5 -> -2), which keeps
/// pixel offsets identical to the ones RSGISLib writes.
#[inline]
pub fn round_half_up(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}

/// Geographic bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl BBox {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self {
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn is_empty(&self) -> bool {
        self.xmax <= self.xmin || self.ymax <= self.ymin
    }

    /// Overlap of two boxes, `None` when they only touch or are disjoint.
    pub fn intersection(&self, other: &BBox) -> Option<BBox> {
        let bbox = BBox {
            xmin: self.xmin.max(other.xmin),
            xmax: self.xmax.min(other.xmax),
            ymin: self.ymin.max(other.ymin),
            ymax: self.ymax.min(other.ymax),
        };
        if bbox.is_empty() {
            None
        } else {
            Some(bbox)
        }
    }
}

/// Pixel-space box, end-exclusive: columns `min_x..max_x`, rows `min_y..max_y`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBBox {
    pub min_x: i64,
    pub max_x: i64,
    pub min_y: i64,
    pub max_y: i64,
}

impl PixelBBox {
    pub fn new(min_x: i64, max_x: i64, min_y: i64, max_y: i64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    pub fn width(&self) -> i64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i64 {
        self.max_y - self.min_y
    }

    /// Clip to `0..width, 0..height`.
    pub fn clip(&self, width: usize, height: usize) -> PixelBBox {
        let (w, h) = (width as i64, height as i64);
        PixelBBox {
            min_x: self.min_x.clamp(0, w),
            max_x: self.max_x.clamp(0, w),
            min_y: self.min_y.clamp(0, h),
            max_y: self.max_y.clamp(0, h),
        }
    }
}

/// Pixel (col, row) whose area contains the geographic point.
///
/// A point sitting exactly on a grid node belongs to the pixel below-right
/// of the node.
pub fn find_point_on_whole_num_grid(transform: &Affine, x: f64, y: f64) -> Option<(i64, i64)> {
    let inv = transform.inverse().ok()?;
    let (col, row) = inv.forward(x, y);
    if !col.is_finite() || !row.is_finite() {
        return None;
    }
    // Snap nodes that only miss by floating error before flooring.
    let snap = |v: f64| {
        let r = v.round();
        if (v - r).abs() < 1e-9 {
            r
        } else {
            v
        }
    };
    Some((snap(col).floor() as i64, snap(row).floor() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(2.49), 2);
        assert_eq!(round_half_up(-2.5), -2);
        assert_eq!(round_half_up(-2.51), -3);
        assert_eq!(round_half_up(0.0), 0);
    }

    #[test]
    fn test_intersection() {
        let a = BBox::new(0.0, 100.0, 0.0, 100.0);
        let b = BBox::new(50.0, 150.0, -20.0, 60.0);
        assert_eq!(a.intersection(&b), Some(BBox::new(50.0, 100.0, 0.0, 60.0)));

        let c = BBox::new(100.0, 200.0, 0.0, 100.0);
        assert_eq!(a.intersection(&c), None);
    }

    #[test]
    fn test_pixel_bbox_clip() {
        let pb = PixelBBox::new(-3, 12, 5, 40);
        assert_eq!(pb.clip(10, 30), PixelBBox::new(0, 10, 5, 30));
        assert_eq!(pb.width(), 15);
        assert_eq!(pb.height(), 35);
    }

    #[test]
    fn test_point_on_grid() {
        let gt = Affine::new(10.0, 0.0, 1000.0, 0.0, -10.0, 2000.0);
        // pixel centre of (3, 7)
        assert_eq!(find_point_on_whole_num_grid(&gt, 1035.0, 1925.0), Some((3, 7)));
        // grid node between (2,6) and (3,7) lands on (3,7)
        assert_eq!(find_point_on_whole_num_grid(&gt, 1030.0, 1930.0), Some((3, 7)));
        // left of the raster
        assert_eq!(find_point_on_whole_num_grid(&gt, 995.0, 1995.0), Some((-1, 0)));
    }
}
