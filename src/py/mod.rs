use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::error::BlockError;

mod tiles;
mod window;

/// Register all Python-visible functions.
pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(tiles::tile_grid, m)?)?;
    m.add_function(wrap_pyfunction!(window::extract_window, m)?)?;
    Ok(())
}

pub(crate) fn to_py_err(e: BlockError) -> PyErr {
    match e {
        BlockError::Configuration(_)
        | BlockError::InputValue(_)
        | BlockError::ShapeMismatch(_)
        | BlockError::Affine(_) => PyValueError::new_err(e.to_string()),
        BlockError::Io { .. } => PyIOError::new_err(e.to_string()),
        _ => PyRuntimeError::new_err(e.to_string()),
    }
}
