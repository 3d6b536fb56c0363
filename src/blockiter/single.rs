//! One tile at a time, read into buffers that are reused between steps.

use ndarray::{Array3, ArrayView3};
use tracing::debug;

use super::{BlockSource, ImageBandInfo, OutImageInfo};
use crate::align::Intersection;
use crate::config::BlockIterConfig;
use crate::error::Result;
use crate::progress::{NoProgress, ProgressReporter};
use crate::raster::Dataset;
use crate::tiling::TileGrid;

/// Tile data for one input image.
#[derive(Debug)]
pub struct ImageBlock {
    pub name: String,
    /// Pixel offset of the tile in this image's own pixel space.
    pub x_pxl_off: usize,
    pub y_pxl_off: usize,
    /// `(bands, tile_size, tile_size)`, bands in the order requested.
    pub data: Array3<f64>,
}

/// A tile across all inputs.
///
/// Borrows the iterator's buffers: it has to be dropped (or its data copied
/// out) before the next call to [`BlockIterator::next_block`].
#[derive(Debug)]
pub struct Block<'a> {
    pub x_tile: usize,
    pub y_tile: usize,
    pub images: &'a [ImageBlock],
}

impl<'a> Block<'a> {
    pub fn get(&self, name: &str) -> Option<&'a ImageBlock> {
        self.images.iter().find(|b| b.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a ImageBlock> {
        self.images.iter()
    }
}

/// Sequential reader/writer over the tiles shared by a set of rasters.
///
/// ```no_run
/// use rsgis_blocks::blockiter::{BlockIterator, ImageBandInfo, OutImageInfo};
/// use rsgis_blocks::raster::{DataType, Driver};
///
/// # fn main() -> rsgis_blocks::error::Result<()> {
/// let imgs = vec![
///     ImageBandInfo::new("sref", "sen2_sref.tif", vec![3, 4]),
///     ImageBandInfo::new("vld", "sen2_vld.tif", vec![1]),
/// ];
/// let mut iter = BlockIterator::new(imgs, 256)?;
/// iter.create_output_imgs(vec![OutImageInfo::new(
///     "ndvi", "ndvi.tif", 1, Some(-999.0), Driver::GTiff, DataType::Float32,
/// )])?;
/// while let Some(block) = iter.next_block() {
///     let block = block?;
///     let (x, y) = (block.x_tile, block.y_tile);
///     let sref = &block.get("sref").unwrap().data;
///     let ndvi = (&sref.slice(ndarray::s![1..2, .., ..]) - &sref.slice(ndarray::s![0..1, .., ..]))
///         / (&sref.slice(ndarray::s![1..2, .., ..]) + &sref.slice(ndarray::s![0..1, .., ..]));
///     iter.write_block_to_image(x, y, &[("ndvi", ndvi.view())])?;
/// }
/// iter.close()?;
/// # Ok(())
/// # }
/// ```
pub struct BlockIterator {
    source: BlockSource,
    buffers: Vec<ImageBlock>,
    next_tile: usize,
    progress: Box<dyn ProgressReporter>,
}

impl BlockIterator {
    /// Open `imgs` and lay out `tile_size` tiles over their overlap.
    pub fn new(imgs: Vec<ImageBandInfo>, tile_size: usize) -> Result<Self> {
        Ok(Self::with_source(BlockSource::open(imgs, tile_size)?))
    }

    /// Same as [`BlockIterator::new`] for datasets that are already open.
    pub fn from_datasets(imgs: Vec<(ImageBandInfo, Dataset)>, tile_size: usize) -> Result<Self> {
        Ok(Self::with_source(BlockSource::from_datasets(imgs, tile_size)?))
    }

    pub fn from_config(imgs: Vec<ImageBandInfo>, config: &BlockIterConfig) -> Result<Self> {
        Self::new(imgs, config.tile_size)
    }

    fn with_source(source: BlockSource) -> Self {
        let ts = source.grid.tile_size;
        let buffers = source
            .inputs
            .iter()
            .map(|input| ImageBlock {
                name: input.info.name.clone(),
                x_pxl_off: 0,
                y_pxl_off: 0,
                data: Array3::zeros((input.info.bands.len(), ts, ts)),
            })
            .collect();
        Self {
            source,
            buffers,
            next_tile: 0,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: impl ProgressReporter + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.source.grid.n_tiles()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tile_grid(&self) -> &TileGrid {
        &self.source.grid
    }

    pub fn intersection(&self) -> &Intersection {
        &self.source.intersection
    }

    /// Read the next tile, or `None` once every tile has been visited.
    pub fn next_block(&mut self) -> Option<Result<Block<'_>>> {
        let n_tiles = self.len();
        let tile = self.source.grid.tile(self.next_tile)?;
        self.next_tile += 1;

        for (idx, buf) in self.buffers.iter_mut().enumerate() {
            match self
                .source
                .read_tile(idx, tile.x_tile, tile.y_tile, buf.data.view_mut())
            {
                Ok((x_off, y_off)) => {
                    buf.x_pxl_off = x_off;
                    buf.y_pxl_off = y_off;
                }
                Err(e) => {
                    // A failed read ends the iteration.
                    self.next_tile = n_tiles;
                    return Some(Err(e));
                }
            }
        }
        debug!(x_tile = tile.x_tile, y_tile = tile.y_tile, "read tile");
        self.progress.report(self.next_tile, n_tiles);

        Some(Ok(Block {
            x_tile: tile.x_tile,
            y_tile: tile.y_tile,
            images: &self.buffers,
        }))
    }

    /// Create the output images; they cover the overlap region.
    pub fn create_output_imgs(&mut self, outs: Vec<OutImageInfo>) -> Result<()> {
        self.source.create_output_imgs(outs)
    }

    /// Write processed tiles, each `(bands, tile_size, tile_size)`, to the
    /// named outputs at the position of tile (x_tile, y_tile).
    pub fn write_block_to_image(
        &mut self,
        x_tile: usize,
        y_tile: usize,
        blocks: &[(&str, ArrayView3<'_, f64>)],
    ) -> Result<()> {
        for (name, data) in blocks {
            self.source.write_tile(x_tile, y_tile, name, data.view())?;
        }
        Ok(())
    }

    /// An output image, e.g. to read back one created with `Driver::Mem`.
    pub fn output_image(&mut self, name: &str) -> Option<&mut Dataset> {
        self.source.output_mut(name)
    }

    /// Flush all output images to disk.
    pub fn close(&mut self) -> Result<()> {
        self.source.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affine::Affine;
    use crate::error::BlockError;
    use crate::raster::{DataType, Driver};
    use ndarray::{s, Array2};

    /// `value = offset + row * 1000 + col` over a 10m grid.
    fn ramp(x0: f64, y0: f64, rows: usize, cols: usize, bands: usize) -> Dataset {
        let data = Array3::from_shape_fn((bands, rows, cols), |(b, r, c)| {
            (b * 1_000_000 + r * 1000 + c) as f64
        });
        Dataset::mem(
            data,
            Affine::new(10.0, 0.0, x0, 0.0, -10.0, y0),
            Some(32630),
            None,
        )
    }

    #[test]
    fn test_reads_each_tile_from_each_image() {
        let a = ramp(0.0, 1000.0, 100, 100, 2);
        // b starts 5 pixels right and 3 pixels down of a
        let b = ramp(50.0, 970.0, 100, 100, 1);
        let mut iter = BlockIterator::from_datasets(
            vec![
                (ImageBandInfo::new("a", "a.tif", vec![2, 1]), a),
                (ImageBandInfo::new("b", "b.tif", vec![1]), b),
            ],
            40,
        )
        .unwrap();

        // overlap is 95 x 97 -> 3 x 3 tiles
        assert_eq!(iter.len(), 9);
        let mut visited = Vec::new();
        while let Some(block) = iter.next_block() {
            let block = block.unwrap();
            let a = block.get("a").unwrap();
            let b = block.get("b").unwrap();
            assert_eq!(a.data.dim(), (2, 40, 40));
            // same ground position in both images
            assert_eq!(a.x_pxl_off, b.x_pxl_off + 5);
            assert_eq!(a.y_pxl_off, b.y_pxl_off + 3);
            // band order follows the request: band 2 first
            let expect = (1_000_000 + a.y_pxl_off * 1000 + a.x_pxl_off) as f64;
            assert_eq!(a.data[(0, 0, 0)], expect);
            assert_eq!(a.data[(1, 39, 39)], ((a.y_pxl_off + 39) * 1000 + a.x_pxl_off + 39) as f64);
            visited.push((block.x_tile, block.y_tile, b.x_pxl_off, b.y_pxl_off));
        }
        assert_eq!(visited.len(), 9);
        assert_eq!(visited[0], (0, 0, 0, 0));
        assert_eq!(visited[2], (2, 0, 95 - 40, 0));
        assert_eq!(visited[8], (2, 2, 55, 97 - 40));
        assert!(iter.next_block().is_none());
    }

    #[test]
    fn test_write_then_read_back() {
        let a = ramp(0.0, 1000.0, 100, 100, 1);
        let mut iter = BlockIterator::from_datasets(
            vec![(ImageBandInfo::new("a", "a.tif", vec![1]), a)],
            64,
        )
        .unwrap();
        iter.create_output_imgs(vec![OutImageInfo::new(
            "out",
            "",
            1,
            Some(-1.0),
            Driver::Mem,
            DataType::Float64,
        )])
        .unwrap();

        while let Some(block) = iter.next_block() {
            let block = block.unwrap();
            let (x, y) = (block.x_tile, block.y_tile);
            let doubled = &block.get("a").unwrap().data * 2.0;
            iter.write_block_to_image(x, y, &[("out", doubled.view())])
                .unwrap();
        }

        let out = iter.output_image("out").unwrap().read_band(1).unwrap();
        assert_eq!(out.dim(), (100, 100));
        for ((r, c), &v) in out.indexed_iter() {
            assert_eq!(v, 2.0 * (r * 1000 + c) as f64);
        }
    }

    #[test]
    fn test_write_shape_checks() {
        let a = ramp(0.0, 1000.0, 50, 50, 1);
        let mut iter = BlockIterator::from_datasets(
            vec![(ImageBandInfo::new("a", "a.tif", vec![1]), a)],
            16,
        )
        .unwrap();

        let block = Array3::<f64>::zeros((1, 16, 16));
        assert!(matches!(
            iter.write_block_to_image(0, 0, &[("out", block.view())]),
            Err(BlockError::Configuration(_))
        ));

        iter.create_output_imgs(vec![OutImageInfo::new(
            "out", "", 2, None, Driver::Mem, DataType::UInt8,
        )])
        .unwrap();

        assert!(matches!(
            iter.write_block_to_image(0, 0, &[("out", block.view())]),
            Err(BlockError::ShapeMismatch(_))
        ));
        let wrong_size = Array3::<f64>::zeros((2, 16, 15));
        assert!(matches!(
            iter.write_block_to_image(0, 0, &[("out", wrong_size.view())]),
            Err(BlockError::ShapeMismatch(_))
        ));
        let good = Array3::<f64>::zeros((2, 16, 16));
        assert!(iter.write_block_to_image(3, 3, &[("out", good.view())]).is_ok());
        assert!(matches!(
            iter.write_block_to_image(4, 0, &[("out", good.view())]),
            Err(BlockError::Configuration(_))
        ));
        assert!(matches!(
            iter.write_block_to_image(0, 0, &[("nope", good.view())]),
            Err(BlockError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_band_and_duplicate_names() {
        let res = BlockIterator::from_datasets(
            vec![(ImageBandInfo::new("a", "a.tif", vec![1, 2]), ramp(0.0, 100.0, 10, 10, 1))],
            5,
        );
        assert!(matches!(res, Err(BlockError::Io { .. })));

        let res = BlockIterator::from_datasets(
            vec![
                (ImageBandInfo::new("a", "a.tif", vec![1]), ramp(0.0, 100.0, 10, 10, 1)),
                (ImageBandInfo::new("a", "b.tif", vec![1]), ramp(0.0, 100.0, 10, 10, 1)),
            ],
            5,
        );
        assert!(matches!(res, Err(BlockError::Configuration(_))));
    }

    #[test]
    fn test_progress_is_reported() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut iter = BlockIterator::from_datasets(
            vec![(ImageBandInfo::new("a", "a.tif", vec![1]), ramp(0.0, 100.0, 10, 10, 1))],
            5,
        )
        .unwrap()
        .with_progress(move |done: usize, total: usize| sink.borrow_mut().push((done, total)));

        while let Some(block) = iter.next_block() {
            block.unwrap();
        }
        assert_eq!(*seen.borrow(), vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    }

    #[test]
    fn test_buffer_is_reused() {
        let mut iter = BlockIterator::from_datasets(
            vec![(ImageBandInfo::new("a", "a.tif", vec![1]), ramp(0.0, 100.0, 10, 10, 1))],
            5,
        )
        .unwrap();
        let first: Array2<f64> = {
            let block = iter.next_block().unwrap().unwrap();
            block.get("a").unwrap().data.slice(s![0, .., ..]).to_owned()
        };
        let block = iter.next_block().unwrap().unwrap();
        let second = block.get("a").unwrap();
        assert_eq!(first[(0, 0)], 0.0);
        assert_eq!(second.data[(0, 0, 0)], 5.0);
    }
}
