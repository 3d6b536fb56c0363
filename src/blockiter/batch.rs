//! Tiles grouped into batches, e.g. for feeding a model.

use std::ops::Range;

use ndarray::{s, Array4, ArrayView3, ArrayView4};
use tracing::debug;

use super::{BlockSource, ImageBandInfo, OutImageInfo};
use crate::align::Intersection;
use crate::config::BlockIterConfig;
use crate::error::{BlockError, Result};
use crate::progress::{NoProgress, ProgressReporter};
use crate::raster::Dataset;
use crate::tiling::TileGrid;

/// Up to `batch_size` tiles stacked along the first axis.
#[derive(Debug, Clone)]
pub struct Batch {
    pub x_tiles: Vec<usize>,
    pub y_tiles: Vec<usize>,
    /// Per item, the `(x, y)` pixel offset of the tile in each input image.
    pub offsets: Vec<Vec<(usize, usize)>>,
    /// `(items, bands, tile_size, tile_size)`; the band axis holds every
    /// selected band of every input, inputs in order.
    pub data: Array4<f64>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.x_tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x_tiles.is_empty()
    }
}

pub struct BatchBlockIterator {
    source: BlockSource,
    batch_size: usize,
    next_tile: usize,
    progress: Box<dyn ProgressReporter>,
}

impl BatchBlockIterator {
    pub fn new(imgs: Vec<ImageBandInfo>, tile_size: usize, batch_size: usize) -> Result<Self> {
        check_batch_size(batch_size)?;
        Ok(Self::with_source(BlockSource::open(imgs, tile_size)?, batch_size))
    }

    pub fn from_datasets(
        imgs: Vec<(ImageBandInfo, Dataset)>,
        tile_size: usize,
        batch_size: usize,
    ) -> Result<Self> {
        check_batch_size(batch_size)?;
        Ok(Self::with_source(
            BlockSource::from_datasets(imgs, tile_size)?,
            batch_size,
        ))
    }

    pub fn from_config(imgs: Vec<ImageBandInfo>, config: &BlockIterConfig) -> Result<Self> {
        Self::new(imgs, config.tile_size, config.batch_size)
    }

    fn with_source(source: BlockSource, batch_size: usize) -> Self {
        Self {
            source,
            batch_size,
            next_tile: 0,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: impl ProgressReporter + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn n_tiles(&self) -> usize {
        self.source.grid.n_tiles()
    }

    /// Number of batches.
    pub fn len(&self) -> usize {
        self.n_tiles().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn tile_grid(&self) -> &TileGrid {
        &self.source.grid
    }

    pub fn intersection(&self) -> &Intersection {
        &self.source.intersection
    }

    /// Total length of the band axis of [`Batch::data`].
    pub fn n_bands(&self) -> usize {
        self.source.total_bands()
    }

    /// Where the bands of input `name` sit on the band axis of a batch.
    pub fn band_index(&self, name: &str) -> Option<Range<usize>> {
        let mut start = 0;
        for input in &self.source.inputs {
            let end = start + input.info.bands.len();
            if input.info.name == name {
                return Some(start..end);
            }
            start = end;
        }
        None
    }

    fn read_batch(&mut self) -> Result<Batch> {
        let n_tiles = self.n_tiles();
        let first = self.next_tile;
        let n_items = self.batch_size.min(n_tiles - first);
        let ts = self.source.grid.tile_size;
        let mut data = Array4::zeros((n_items, self.source.total_bands(), ts, ts));
        let mut x_tiles = Vec::with_capacity(n_items);
        let mut y_tiles = Vec::with_capacity(n_items);
        let mut offsets = Vec::with_capacity(n_items);

        for item in 0..n_items {
            let Some(tile) = self.source.grid.tile(first + item) else {
                break;
            };
            let mut band_start = 0;
            let mut item_offsets = Vec::with_capacity(self.source.inputs.len());
            for idx in 0..self.source.inputs.len() {
                let n_bands = self.source.inputs[idx].info.bands.len();
                let view = data.slice_mut(s![item, band_start..band_start + n_bands, .., ..]);
                item_offsets.push(self.source.read_tile(idx, tile.x_tile, tile.y_tile, view)?);
                band_start += n_bands;
            }
            x_tiles.push(tile.x_tile);
            y_tiles.push(tile.y_tile);
            offsets.push(item_offsets);
        }
        debug!(first_tile = first, items = n_items, "read batch");

        Ok(Batch {
            x_tiles,
            y_tiles,
            offsets,
            data,
        })
    }

    pub fn create_output_imgs(&mut self, outs: Vec<OutImageInfo>) -> Result<()> {
        self.source.create_output_imgs(outs)
    }

    /// Write a batch of processed tiles, `(items, bands, tile, tile)`, to
    /// output `name`; item `i` goes to tile `(x_tiles[i], y_tiles[i])`.
    pub fn write_blocks_to_image(
        &mut self,
        x_tiles: &[usize],
        y_tiles: &[usize],
        name: &str,
        data: ArrayView4<'_, f64>,
    ) -> Result<()> {
        let n_items = data.dim().0;
        if x_tiles.len() != n_items || y_tiles.len() != n_items {
            return Err(BlockError::ShapeMismatch(format!(
                "{n_items} blocks for '{name}' but {} x and {} y tile indices",
                x_tiles.len(),
                y_tiles.len()
            )));
        }
        for (i, (&x, &y)) in x_tiles.iter().zip(y_tiles).enumerate() {
            self.source.write_tile(x, y, name, data.slice(s![i, .., .., ..]))?;
        }
        Ok(())
    }

    /// Write one `(bands, tile, tile)` block to output `name`.
    pub fn write_sgl_block_to_image(
        &mut self,
        x_tile: usize,
        y_tile: usize,
        name: &str,
        data: ArrayView3<'_, f64>,
    ) -> Result<()> {
        self.source.write_tile(x_tile, y_tile, name, data)
    }

    pub fn output_image(&mut self, name: &str) -> Option<&mut Dataset> {
        self.source.output_mut(name)
    }

    pub fn close(&mut self) -> Result<()> {
        self.source.close()
    }
}

fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(BlockError::Configuration("batch size must be > 0".into()));
    }
    Ok(())
}

impl Iterator for BatchBlockIterator {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let n_tiles = self.n_tiles();
        if self.next_tile >= n_tiles {
            return None;
        }
        match self.read_batch() {
            Ok(batch) => {
                self.next_tile += batch.len();
                self.progress.report(self.next_tile, n_tiles);
                Some(Ok(batch))
            }
            Err(e) => {
                self.next_tile = n_tiles;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.n_tiles().saturating_sub(self.next_tile).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affine::Affine;
    use crate::raster::{DataType, Driver};
    use ndarray::Array3;

    fn ramp(rows: usize, cols: usize, bands: usize, base: f64) -> Dataset {
        let data = Array3::from_shape_fn((bands, rows, cols), |(b, r, c)| {
            base + (b * 10_000 + r * 100 + c) as f64
        });
        Dataset::mem(
            data,
            Affine::new(2.0, 0.0, 500.0, 0.0, -2.0, 800.0),
            Some(27700),
            None,
        )
    }

    fn two_inputs(tile_size: usize, batch_size: usize) -> BatchBlockIterator {
        BatchBlockIterator::from_datasets(
            vec![
                (ImageBandInfo::new("img", "img.tif", vec![1, 3]), ramp(50, 50, 3, 0.0)),
                (ImageBandInfo::new("msk", "msk.tif", vec![1]), ramp(50, 50, 1, 0.5)),
            ],
            tile_size,
            batch_size,
        )
        .unwrap()
    }

    #[test]
    fn test_batch_counts_and_last_batch() {
        // 50 / 16 -> 4 x 4 = 16 tiles, batches of 5 -> 5, 5, 5, 1
        let iter = two_inputs(16, 5);
        assert_eq!(iter.n_tiles(), 16);
        assert_eq!(iter.len(), 4);
        let sizes: Vec<usize> = iter.map(|b| b.unwrap().data.dim().0).collect();
        assert_eq!(sizes, vec![5, 5, 5, 16 - 5 * 3]);
    }

    #[test]
    fn test_bands_concatenated_in_input_order() {
        let mut iter = two_inputs(16, 4);
        assert_eq!(iter.n_bands(), 3);
        assert_eq!(iter.band_index("img"), Some(0..2));
        assert_eq!(iter.band_index("msk"), Some(2..3));
        assert_eq!(iter.band_index("other"), None);

        let batch = iter.next().unwrap().unwrap();
        assert_eq!(batch.data.dim(), (4, 3, 16, 16));
        assert_eq!(batch.x_tiles, vec![0, 1, 2, 3]);
        assert_eq!(batch.y_tiles, vec![0, 0, 0, 0]);
        // last x tile is anchored to the edge: 50 - 16
        assert_eq!(batch.offsets[3], vec![(34, 0), (34, 0)]);
        assert_eq!(batch.data[(3, 0, 0, 0)], 34.0);
        assert_eq!(batch.data[(3, 1, 0, 0)], 20_034.0);
        assert_eq!(batch.data[(3, 2, 0, 0)], 34.5);
    }

    #[test]
    fn test_zero_batch_size() {
        let res = BatchBlockIterator::from_datasets(
            vec![(ImageBandInfo::new("img", "img.tif", vec![1]), ramp(10, 10, 1, 0.0))],
            5,
            0,
        );
        assert!(matches!(res, Err(BlockError::Configuration(_))));
    }

    #[test]
    fn test_batch_write_round_trip() {
        let mut iter = two_inputs(20, 3);
        iter.create_output_imgs(vec![OutImageInfo::new(
            "sum",
            "",
            1,
            None,
            Driver::Mem,
            DataType::Float64,
        )])
        .unwrap();

        let img = iter.band_index("img").unwrap();
        let msk = iter.band_index("msk").unwrap();
        while let Some(batch) = iter.next() {
            let batch = batch.unwrap();
            let sum = &batch.data.slice(s![.., img.start..img.start + 1, .., ..])
                + &batch.data.slice(s![.., msk.start..msk.end, .., ..]);
            iter.write_blocks_to_image(&batch.x_tiles, &batch.y_tiles, "sum", sum.view())
                .unwrap();
        }
        assert!(iter.next().is_none());

        let out = iter.output_image("sum").unwrap().read_band(1).unwrap();
        for ((r, c), &v) in out.indexed_iter() {
            assert_eq!(v, 2.0 * (r * 100 + c) as f64 + 0.5);
        }
    }

    #[test]
    fn test_write_index_length_mismatch() {
        let mut iter = two_inputs(25, 2);
        iter.create_output_imgs(vec![OutImageInfo::new(
            "o", "", 1, None, Driver::Mem, DataType::UInt8,
        )])
        .unwrap();
        let blocks = Array4::<f64>::zeros((2, 1, 25, 25));
        assert!(matches!(
            iter.write_blocks_to_image(&[0], &[0, 1], "o", blocks.view()),
            Err(BlockError::ShapeMismatch(_))
        ));
        assert!(iter
            .write_sgl_block_to_image(1, 1, "o", blocks.slice(s![0, .., .., ..]))
            .is_ok());
    }
}
