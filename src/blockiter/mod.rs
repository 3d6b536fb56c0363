//! Tiled block iteration over several co-registered rasters.
//!
//! Both iterators share [`BlockSource`]: the opened inputs, their common
//! overlap, the tile layout and the lazily created outputs. Reads and writes
//! place tiles through [`TileGrid::tile_offset`] so the two paths cannot
//! drift apart.

pub mod batch;
pub mod single;

pub use batch::{Batch, BatchBlockIterator};
pub use single::{Block, BlockIterator, ImageBlock};

use std::collections::HashSet;
use std::path::PathBuf;

use ndarray::{s, ArrayView3, ArrayViewMut3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::affine::Affine;
use crate::align::{compute_intersection, Intersection};
use crate::error::{BlockError, Result};
use crate::geometry::PixelBBox;
use crate::raster::{DataType, Dataset, Driver};
use crate::tiling::TileGrid;

/// An input raster and the bands (1-based) to read from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageBandInfo {
    pub name: String,
    pub path: PathBuf,
    pub bands: Vec<usize>,
}

impl ImageBandInfo {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, bands: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            bands,
        }
    }
}

/// An output raster to be created over the overlap region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutImageInfo {
    pub name: String,
    pub path: PathBuf,
    pub n_bands: usize,
    pub no_data_val: Option<f64>,
    pub driver: Driver,
    pub data_type: DataType,
}

impl OutImageInfo {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        n_bands: usize,
        no_data_val: Option<f64>,
        driver: Driver,
        data_type: DataType,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            n_bands,
            no_data_val,
            driver,
            data_type,
        }
    }
}

pub(crate) struct InputImage {
    pub(crate) info: ImageBandInfo,
    pub(crate) dataset: Dataset,
    pub(crate) pxl_bbox: PixelBBox,
}

struct OutputImage {
    info: OutImageInfo,
    dataset: Dataset,
}

/// Inputs, tile layout and outputs shared by both iterators.
pub(crate) struct BlockSource {
    pub(crate) inputs: Vec<InputImage>,
    pub(crate) intersection: Intersection,
    pub(crate) grid: TileGrid,
    out_transform: Affine,
    out_epsg: Option<u32>,
    outputs: Option<Vec<OutputImage>>,
}

fn check_unique<'a>(names: impl Iterator<Item = &'a str>, what: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(BlockError::Configuration(format!(
                "{what} name '{name}' is used more than once"
            )));
        }
    }
    Ok(())
}

impl BlockSource {
    pub(crate) fn open(imgs: Vec<ImageBandInfo>, tile_size: usize) -> Result<Self> {
        if imgs.is_empty() {
            return Err(BlockError::Configuration("no input rasters were provided".into()));
        }
        check_unique(imgs.iter().map(|i| i.name.as_str()), "input image")?;
        let mut opened = Vec::with_capacity(imgs.len());
        for info in imgs {
            let dataset = Dataset::open(&info.path)?;
            opened.push((info, dataset));
        }
        Self::from_datasets(opened, tile_size)
    }

    pub(crate) fn from_datasets(
        opened: Vec<(ImageBandInfo, Dataset)>,
        tile_size: usize,
    ) -> Result<Self> {
        check_unique(opened.iter().map(|(i, _)| i.name.as_str()), "input image")?;
        for (info, dataset) in &opened {
            if info.bands.is_empty() {
                return Err(BlockError::Configuration(format!(
                    "no bands were selected for '{}'",
                    info.name
                )));
            }
            let n_bands = dataset.grid().n_bands;
            if let Some(&band) = info.bands.iter().find(|&&b| b == 0 || b > n_bands) {
                return Err(BlockError::io(format!(
                    "band {band} of '{}' ({}) could not be opened; it has {n_bands} bands",
                    info.name,
                    info.path.display()
                )));
            }
        }

        let grids: Vec<_> = opened.iter().map(|(_, ds)| ds.grid().clone()).collect();
        let intersection = compute_intersection(&grids)?;
        let grid = TileGrid::new(
            intersection.overlap_width,
            intersection.overlap_height,
            tile_size,
        )?;

        let first = &grids[0];
        let origin = intersection.pxl_bboxes[0];
        let out_transform = first
            .transform
            .shifted_to(origin.min_x as f64, origin.min_y as f64);
        let out_epsg = first.epsg;

        let inputs = opened
            .into_iter()
            .zip(&intersection.pxl_bboxes)
            .map(|((info, dataset), &pxl_bbox)| InputImage {
                info,
                dataset,
                pxl_bbox,
            })
            .collect();

        info!(
            width = grid.overlap_width,
            height = grid.overlap_height,
            tile_size,
            n_tiles = grid.n_tiles(),
            "scheduled tiles over raster overlap"
        );

        Ok(Self {
            inputs,
            intersection,
            grid,
            out_transform,
            out_epsg,
            outputs: None,
        })
    }

    pub(crate) fn total_bands(&self) -> usize {
        self.inputs.iter().map(|i| i.info.bands.len()).sum()
    }

    /// Read every selected band of input `idx` for tile (x_tile, y_tile).
    pub(crate) fn read_tile(
        &mut self,
        idx: usize,
        x_tile: usize,
        y_tile: usize,
        mut out: ArrayViewMut3<'_, f64>,
    ) -> Result<(usize, usize)> {
        let (tx, ty) = self.grid.tile_offset(x_tile, y_tile);
        let input = &mut self.inputs[idx];
        let x_off = input.pxl_bbox.min_x as usize + tx;
        let y_off = input.pxl_bbox.min_y as usize + ty;
        for (i, &band) in input.info.bands.iter().enumerate() {
            input
                .dataset
                .read_window(band, x_off, y_off, out.slice_mut(s![i, .., ..]))?;
        }
        Ok((x_off, y_off))
    }

    pub(crate) fn create_output_imgs(&mut self, outs: Vec<OutImageInfo>) -> Result<()> {
        check_unique(outs.iter().map(|o| o.name.as_str()), "output image")?;
        let mut created = Vec::with_capacity(outs.len());
        for info in outs {
            let dataset = Dataset::create(
                &info.path,
                info.driver,
                self.grid.overlap_width,
                self.grid.overlap_height,
                info.n_bands,
                info.data_type,
                self.out_transform,
                self.out_epsg,
                info.no_data_val,
            )?;
            debug!(name = %info.name, path = %info.path.display(), bands = info.n_bands, "created output image");
            created.push(OutputImage { info, dataset });
        }
        // Replacing an existing set flushes it first.
        if let Some(old) = self.outputs.as_mut() {
            for out in old.iter_mut() {
                out.dataset.flush()?;
            }
        }
        self.outputs = Some(created);
        Ok(())
    }

    /// Write one `(bands, tile, tile)` block to the named output.
    pub(crate) fn write_tile(
        &mut self,
        x_tile: usize,
        y_tile: usize,
        name: &str,
        data: ArrayView3<'_, f64>,
    ) -> Result<()> {
        if !self.grid.contains_tile(x_tile, y_tile) {
            return Err(BlockError::Configuration(format!(
                "tile ({x_tile}, {y_tile}) is outside the {}x{} tile grid",
                self.grid.n_x_tiles, self.grid.n_y_tiles
            )));
        }
        let tile_size = self.grid.tile_size;
        let (x_off, y_off) = self.grid.tile_offset(x_tile, y_tile);
        let outputs = self.outputs.as_mut().ok_or_else(|| {
            BlockError::Configuration("output images have not been created".into())
        })?;
        let out = outputs
            .iter_mut()
            .find(|o| o.info.name == name)
            .ok_or_else(|| BlockError::Configuration(format!("no output image named '{name}'")))?;

        let (bands, rows, cols) = data.dim();
        if bands != out.info.n_bands {
            return Err(BlockError::ShapeMismatch(format!(
                "block for '{name}' has {bands} bands but the output image has {}",
                out.info.n_bands
            )));
        }
        if rows != tile_size || cols != tile_size {
            return Err(BlockError::ShapeMismatch(format!(
                "block for '{name}' is {cols}x{rows} but tiles are {tile_size}x{tile_size}"
            )));
        }
        for b in 0..bands {
            out.dataset
                .write_window(b + 1, x_off, y_off, data.slice(s![b, .., ..]))?;
        }
        Ok(())
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        if let Some(outputs) = self.outputs.as_mut() {
            for out in outputs.iter_mut() {
                out.dataset.flush()?;
            }
        }
        Ok(())
    }

    /// Mutable access to a created output, e.g. to read back a `MEM` image.
    pub(crate) fn output_mut(&mut self, name: &str) -> Option<&mut Dataset> {
        self.outputs
            .as_mut()?
            .iter_mut()
            .find(|o| o.info.name == name)
            .map(|o| &mut o.dataset)
    }
}

impl Drop for BlockSource {
    fn drop(&mut self) {
        if let Some(outputs) = self.outputs.as_mut() {
            for out in outputs.iter_mut() {
                if let Err(e) = out.dataset.flush() {
                    warn!(path = %out.info.path.display(), error = %e, "failed to flush output image on drop");
                }
            }
        }
    }
}
