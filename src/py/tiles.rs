//! PyO3 binding for the tile layout.

use pyo3::prelude::*;
use pyo3::types::PyDict;

use super::to_py_err;
use crate::tiling::TileGrid;

/// Lay out square tiles over an overlap region.
///
/// Args:
///     overlap_width: Overlap width in pixels.
///     overlap_height: Overlap height in pixels.
///     tile_size: Tile edge length in pixels.
///
/// Returns:
///     List of dicts with keys x_tile, y_tile, x_off, y_off in raster-scan
///     order. The last tile on an axis that does not divide evenly is moved
///     back to end on the far edge.
#[pyfunction]
pub fn tile_grid(
    py: Python<'_>,
    overlap_width: usize,
    overlap_height: usize,
    tile_size: usize,
) -> PyResult<Vec<PyObject>> {
    let grid = TileGrid::new(overlap_width, overlap_height, tile_size).map_err(to_py_err)?;
    grid.tiles()
        .map(|tile| -> PyResult<PyObject> {
            let dict = PyDict::new(py);
            dict.set_item("x_tile", tile.x_tile)?;
            dict.set_item("y_tile", tile.y_tile)?;
            dict.set_item("x_off", tile.x_off)?;
            dict.set_item("y_off", tile.y_off)?;
            Ok(dict.into_any().unbind())
        })
        .collect()
}
