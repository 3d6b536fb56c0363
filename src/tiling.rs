//! Tile scheduler: splits an overlap region into fixed-size square tiles.
//!
//! Every tile is exactly `tile_size x tile_size`. When an axis does not
//! divide evenly, the last tile on that axis is pushed back so it ends flush
//! with the far edge and overlaps its neighbour by `tile_size - remainder`
//! pixels instead of running past the edge.

use crate::error::{BlockError, Result};

/// Offset of tile `index` along one axis.
///
/// This is the only place tile placement is decided; the read and write
/// paths both go through it.
#[inline]
pub fn tile_origin(
    index: usize,
    n_tiles: usize,
    tile_size: usize,
    extent: usize,
    has_remainder: bool,
) -> usize {
    if has_remainder && index + 1 == n_tiles {
        extent - tile_size
    } else {
        tile_size * index
    }
}

/// One scheduled tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tile {
    pub x_tile: usize,
    pub y_tile: usize,
    /// Pixel offset relative to the overlap origin.
    pub x_off: usize,
    pub y_off: usize,
}

/// Tile layout over an `overlap_width x overlap_height` region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    pub overlap_width: usize,
    pub overlap_height: usize,
    pub tile_size: usize,
    pub n_x_tiles: usize,
    pub n_y_tiles: usize,
    pub remain_x_tile: bool,
    pub remain_y_tile: bool,
}

impl TileGrid {
    pub fn new(overlap_width: usize, overlap_height: usize, tile_size: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(BlockError::Configuration("tile size must be > 0".into()));
        }
        if tile_size > overlap_width || tile_size > overlap_height {
            return Err(BlockError::Configuration(format!(
                "tile size {tile_size} is larger than the {overlap_width}x{overlap_height} overlap"
            )));
        }

        let mut n_x_tiles = overlap_width / tile_size;
        let remain_x_tile = overlap_width % tile_size != 0;
        if remain_x_tile {
            n_x_tiles += 1;
        }
        let mut n_y_tiles = overlap_height / tile_size;
        let remain_y_tile = overlap_height % tile_size != 0;
        if remain_y_tile {
            n_y_tiles += 1;
        }

        Ok(Self {
            overlap_width,
            overlap_height,
            tile_size,
            n_x_tiles,
            n_y_tiles,
            remain_x_tile,
            remain_y_tile,
        })
    }

    pub fn n_tiles(&self) -> usize {
        self.n_x_tiles * self.n_y_tiles
    }

    /// Pixel offset of tile (x_tile, y_tile) within the overlap.
    pub fn tile_offset(&self, x_tile: usize, y_tile: usize) -> (usize, usize) {
        (
            tile_origin(
                x_tile,
                self.n_x_tiles,
                self.tile_size,
                self.overlap_width,
                self.remain_x_tile,
            ),
            tile_origin(
                y_tile,
                self.n_y_tiles,
                self.tile_size,
                self.overlap_height,
                self.remain_y_tile,
            ),
        )
    }

    /// Tile at raster-scan position `i` (x fastest).
    pub fn tile(&self, i: usize) -> Option<Tile> {
        if i >= self.n_tiles() {
            return None;
        }
        let x_tile = i % self.n_x_tiles;
        let y_tile = i / self.n_x_tiles;
        let (x_off, y_off) = self.tile_offset(x_tile, y_tile);
        Some(Tile {
            x_tile,
            y_tile,
            x_off,
            y_off,
        })
    }

    pub fn contains_tile(&self, x_tile: usize, y_tile: usize) -> bool {
        x_tile < self.n_x_tiles && y_tile < self.n_y_tiles
    }

    /// All tiles, row-major with x fastest.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.n_tiles()).filter_map(move |i| self.tile(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_100_by_100_with_64_tiles() {
        let grid = TileGrid::new(100, 100, 64).unwrap();
        assert_eq!((grid.n_x_tiles, grid.n_y_tiles), (2, 2));
        assert!(grid.remain_x_tile && grid.remain_y_tile);
        assert_eq!(grid.n_tiles(), 4);

        let offsets: Vec<(usize, usize)> = grid.tiles().map(|t| (t.x_off, t.y_off)).collect();
        assert_eq!(offsets, vec![(0, 0), (36, 0), (0, 36), (36, 36)]);

        // neighbours overlap by 64 - 36 = 28 pixels
        let (x1, _) = grid.tile_offset(1, 0);
        assert_eq!(grid.tile_size - x1, 28);
    }

    #[test]
    fn test_raster_scan_order() {
        let grid = TileGrid::new(30, 20, 10).unwrap();
        let order: Vec<(usize, usize)> = grid.tiles().map(|t| (t.x_tile, t.y_tile)).collect();
        assert_eq!(
            order,
            vec![(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)]
        );
        assert!(!grid.remain_x_tile && !grid.remain_y_tile);
        assert_eq!(grid.tile_offset(2, 1), (20, 10));
    }

    #[test]
    fn test_edge_anchoring_per_axis() {
        // remainder only on y
        let grid = TileGrid::new(64, 70, 32).unwrap();
        assert_eq!((grid.n_x_tiles, grid.n_y_tiles), (2, 3));
        assert_eq!(grid.tile_offset(1, 2), (32, 70 - 32));
        // not 32 * 2
        assert_ne!(grid.tile_offset(1, 2).1, 64);
    }

    #[test]
    fn test_tiles_cover_without_gaps() {
        for &(w, h, ts) in &[(100, 100, 64), (37, 91, 16), (50, 50, 50), (129, 65, 64), (7, 5, 1)] {
            let grid = TileGrid::new(w, h, ts).unwrap();
            let mut covered = vec![vec![false; w]; h];
            let mut count = 0;
            for tile in grid.tiles() {
                assert!(tile.x_off + ts <= w, "tile runs past right edge");
                assert!(tile.y_off + ts <= h, "tile runs past bottom edge");
                for row in &mut covered[tile.y_off..tile.y_off + ts] {
                    for cell in &mut row[tile.x_off..tile.x_off + ts] {
                        *cell = true;
                    }
                }
                count += 1;
            }
            assert_eq!(count, grid.n_x_tiles * grid.n_y_tiles);
            assert!(covered.iter().flatten().all(|&c| c), "gap for {w}x{h}/{ts}");
        }
    }

    #[test]
    fn test_tile_origin_last_tile() {
        assert_eq!(tile_origin(3, 4, 10, 35, true), 25);
        assert_eq!(tile_origin(3, 4, 10, 40, false), 30);
        assert_eq!(tile_origin(2, 4, 10, 35, true), 20);
    }

    #[test]
    fn test_invalid_tile_sizes() {
        assert!(matches!(TileGrid::new(10, 10, 0), Err(BlockError::Configuration(_))));
        assert!(matches!(TileGrid::new(10, 100, 32), Err(BlockError::Configuration(_))));
    }

    #[test]
    fn test_tile_out_of_range() {
        let grid = TileGrid::new(10, 10, 5).unwrap();
        assert!(grid.tile(4).is_none());
        assert!(!grid.contains_tile(2, 0));
        assert!(grid.contains_tile(1, 1));
    }
}
