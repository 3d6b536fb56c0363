//! Intersection of several raster grids that share CRS and resolution.
//!
//! The shared geographic box is translated into each raster's own pixel
//! space; the translations must all have the same pixel size or the rasters
//! are not on a common grid.

use tracing::debug;

use crate::error::{BlockError, Result};
use crate::geometry::{round_half_up, BBox, PixelBBox};
use crate::raster::RasterGrid;

/// Relative tolerance when comparing pixel resolutions.
const RES_TOLERANCE: f64 = 1e-6;

/// Overlap shared by all registered grids.
#[derive(Clone, Debug, PartialEq)]
pub struct Intersection {
    pub bbox: BBox,
    pub overlap_width: usize,
    pub overlap_height: usize,
    /// One box per input grid, in input order.
    pub pxl_bboxes: Vec<PixelBBox>,
}

fn same_res(a: f64, b: f64) -> bool {
    (a - b).abs() <= RES_TOLERANCE * a.abs().max(b.abs())
}

/// Pixel window of `grid` covering `bbox`, rounding edges half-up.
pub fn pixel_subset_bbox(grid: &RasterGrid, bbox: &BBox) -> PixelBBox {
    let img = grid.bbox();
    let res_x = grid.res_x().abs();
    let res_y = grid.res_y().abs();
    PixelBBox {
        min_x: round_half_up((bbox.xmin - img.xmin) / res_x),
        max_x: round_half_up((bbox.xmax - img.xmin) / res_x),
        min_y: round_half_up((img.ymax - bbox.ymax) / res_y),
        max_y: round_half_up((img.ymax - bbox.ymin) / res_y),
    }
}

/// Compute the pixel-space overlap of `grids`.
pub fn compute_intersection(grids: &[RasterGrid]) -> Result<Intersection> {
    let first = grids
        .first()
        .ok_or_else(|| BlockError::Configuration("no input rasters were provided".into()))?;

    let mut epsg = None;
    for grid in grids {
        let code = grid.epsg.ok_or_else(|| {
            BlockError::Configuration(format!(
                "{} does not have a defined CRS/EPSG code",
                grid.path.display()
            ))
        })?;
        match epsg {
            None => epsg = Some(code),
            Some(e) if e != code => {
                return Err(BlockError::Configuration(format!(
                    "{} is in EPSG:{code} but the first raster is in EPSG:{e}",
                    grid.path.display()
                )))
            }
            Some(_) => {}
        }
        if !grid.transform.is_rectilinear() {
            return Err(BlockError::Configuration(format!(
                "{} has a rotated geotransform",
                grid.path.display()
            )));
        }
        if !same_res(grid.res_x(), first.res_x()) || !same_res(grid.res_y(), first.res_y()) {
            return Err(BlockError::Configuration(format!(
                "{} has resolution ({}, {}) but the first raster has ({}, {})",
                grid.path.display(),
                grid.res_x(),
                grid.res_y(),
                first.res_x(),
                first.res_y()
            )));
        }
    }

    let mut bbox = first.bbox();
    for grid in &grids[1..] {
        bbox = bbox.intersection(&grid.bbox()).ok_or_else(|| {
            BlockError::Configuration(format!(
                "{} does not overlap the other input rasters",
                grid.path.display()
            ))
        })?;
    }

    let pxl_bboxes: Vec<PixelBBox> = grids.iter().map(|g| pixel_subset_bbox(g, &bbox)).collect();
    let (w, h) = (pxl_bboxes[0].width(), pxl_bboxes[0].height());
    for (grid, pb) in grids.iter().zip(&pxl_bboxes) {
        if pb.width() != w || pb.height() != h {
            return Err(BlockError::GridMismatch(format!(
                "overlap is {}x{} pixels in {} but {w}x{h} in {}; the rasters are not on a common pixel grid",
                pb.width(),
                pb.height(),
                grid.path.display(),
                first.path.display()
            )));
        }
    }
    if w <= 0 || h <= 0 {
        return Err(BlockError::Configuration(format!(
            "overlap of the input rasters is less than one pixel ({w}x{h})"
        )));
    }

    debug!(
        xmin = bbox.xmin,
        xmax = bbox.xmax,
        ymin = bbox.ymin,
        ymax = bbox.ymax,
        width = w,
        height = h,
        "computed raster intersection"
    );

    Ok(Intersection {
        bbox,
        overlap_width: w as usize,
        overlap_height: h as usize,
        pxl_bboxes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affine::Affine;
    use crate::raster::DataType;
    use std::path::PathBuf;

    fn grid(name: &str, x0: f64, y0: f64, w: usize, h: usize, res: f64) -> RasterGrid {
        RasterGrid {
            path: PathBuf::from(name),
            transform: Affine::new(res, 0.0, x0, 0.0, -res, y0),
            width: w,
            height: h,
            n_bands: 1,
            epsg: Some(32630),
            no_data: None,
            data_type: DataType::Float32,
        }
    }

    #[test]
    fn test_offset_grids_share_overlap_size() {
        let a = grid("a.tif", 0.0, 1000.0, 100, 100, 10.0);
        let b = grid("b.tif", 200.0, 900.0, 100, 100, 10.0);
        let c = grid("c.tif", -50.0, 1050.0, 60, 60, 10.0);

        let inter = compute_intersection(&[a, b, c]).unwrap();
        // x: 200..550, y: 450..900
        assert_eq!(inter.bbox, BBox::new(200.0, 550.0, 450.0, 900.0));
        assert_eq!((inter.overlap_width, inter.overlap_height), (35, 45));
        assert_eq!(inter.pxl_bboxes[0], PixelBBox::new(20, 55, 10, 55));
        assert_eq!(inter.pxl_bboxes[1], PixelBBox::new(0, 35, 0, 45));
        assert_eq!(inter.pxl_bboxes[2], PixelBBox::new(25, 60, 15, 60));
        for pb in &inter.pxl_bboxes {
            assert_eq!((pb.width(), pb.height()), (35, 45));
        }
    }

    #[test]
    fn test_single_raster_is_its_own_overlap() {
        let a = grid("a.tif", 0.0, 100.0, 10, 8, 10.0);
        let inter = compute_intersection(&[a]).unwrap();
        assert_eq!((inter.overlap_width, inter.overlap_height), (10, 8));
        assert_eq!(inter.pxl_bboxes[0], PixelBBox::new(0, 10, 0, 8));
    }

    #[test]
    fn test_sub_pixel_shift_is_grid_mismatch() {
        let a = grid("a.tif", 0.0, 1000.0, 100, 100, 10.0);
        // half a pixel east: the two edges round in opposite directions
        let b = grid("b.tif", 5.0, 1000.0, 100, 100, 10.0);
        let res = compute_intersection(&[a, b]);
        assert!(matches!(res, Err(BlockError::GridMismatch(_))), "{res:?}");
    }

    #[test]
    fn test_missing_crs() {
        let a = grid("a.tif", 0.0, 100.0, 10, 10, 10.0);
        let mut b = grid("b.tif", 0.0, 100.0, 10, 10, 10.0);
        b.epsg = None;
        let res = compute_intersection(&[a, b]);
        assert!(matches!(res, Err(BlockError::Configuration(_))));
    }

    #[test]
    fn test_crs_and_resolution_must_match() {
        let a = grid("a.tif", 0.0, 100.0, 10, 10, 10.0);
        let mut b = grid("b.tif", 0.0, 100.0, 10, 10, 10.0);
        b.epsg = Some(4326);
        assert!(matches!(
            compute_intersection(&[a.clone(), b]),
            Err(BlockError::Configuration(_))
        ));

        let c = grid("c.tif", 0.0, 100.0, 5, 5, 20.0);
        assert!(matches!(
            compute_intersection(&[a, c]),
            Err(BlockError::Configuration(_))
        ));
    }

    #[test]
    fn test_disjoint_and_empty_inputs() {
        let a = grid("a.tif", 0.0, 100.0, 10, 10, 10.0);
        let b = grid("b.tif", 500.0, 100.0, 10, 10, 10.0);
        assert!(matches!(
            compute_intersection(&[a, b]),
            Err(BlockError::Configuration(_))
        ));
        assert!(matches!(compute_intersection(&[]), Err(BlockError::Configuration(_))));
    }
}
