//! Raster datasets: grid metadata plus windowed band reads and writes.
//!
//! Two drivers are available. `GTiff` datasets opened from disk decode only
//! the strips/tiles a window touches. `GTiff` datasets created for output
//! are laid out on disk straight away and written a strip at a time, with
//! recently touched strips kept in memory until evicted or flushed. `MEM`
//! datasets never touch the filesystem.

mod geotiff;

use std::path::{Path, PathBuf};

use ndarray::{s, Array2, Array3, ArrayView2, ArrayViewMut2};
use num_traits::{Bounded, ToPrimitive};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::affine::Affine;
use crate::error::{BlockError, Result};
use crate::geometry::BBox;

/// Pixel data type of a raster on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    UInt8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    /// Parse a GDAL/RSGISLib style type name ("Float32", "uint8", ...).
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "byte" | "uint8" => Some(Self::UInt8),
            "uint16" => Some(Self::UInt16),
            "int16" => Some(Self::Int16),
            "uint32" => Some(Self::UInt32),
            "int32" => Some(Self::Int32),
            "float32" => Some(Self::Float32),
            "float64" => Some(Self::Float64),
            _ => None,
        }
    }

    pub fn bits(&self) -> u16 {
        match self {
            Self::UInt8 => 8,
            Self::UInt16 | Self::Int16 => 16,
            Self::UInt32 | Self::Int32 | Self::Float32 => 32,
            Self::Float64 => 64,
        }
    }

    /// TIFF SampleFormat: 1 unsigned, 2 signed, 3 IEEE float.
    pub fn sample_format(&self) -> u16 {
        match self {
            Self::UInt8 | Self::UInt16 | Self::UInt32 => 1,
            Self::Int16 | Self::Int32 => 2,
            Self::Float32 | Self::Float64 => 3,
        }
    }

    pub fn from_tiff(bits: u16, sample_format: u16) -> Option<Self> {
        match (sample_format, bits) {
            (1, 8) => Some(Self::UInt8),
            (1, 16) => Some(Self::UInt16),
            (1, 32) => Some(Self::UInt32),
            (2, 16) => Some(Self::Int16),
            (2, 32) => Some(Self::Int32),
            (3, 32) => Some(Self::Float32),
            (3, 64) => Some(Self::Float64),
            _ => None,
        }
    }

    /// Value as it will be stored: rounded and saturated for integer types.
    /// NaN cannot be stored in an integer band and becomes `fill`.
    pub fn cast(&self, v: f64, fill: f64) -> f64 {
        fn saturate<T: Bounded + ToPrimitive>(v: f64, fill: f64) -> f64 {
            if v.is_nan() {
                return fill;
            }
            let lo = T::min_value().to_f64().unwrap_or(f64::MIN);
            let hi = T::max_value().to_f64().unwrap_or(f64::MAX);
            v.round().clamp(lo, hi)
        }
        match self {
            Self::UInt8 => saturate::<u8>(v, fill),
            Self::UInt16 => saturate::<u16>(v, fill),
            Self::Int16 => saturate::<i16>(v, fill),
            Self::UInt32 => saturate::<u32>(v, fill),
            Self::Int32 => saturate::<i32>(v, fill),
            Self::Float32 => v as f32 as f64,
            Self::Float64 => v,
        }
    }
}

/// Output driver short names, as accepted by GDAL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Driver {
    #[serde(rename = "GTiff")]
    GTiff,
    #[serde(rename = "MEM")]
    Mem,
}

impl Driver {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GTIFF" => Some(Self::GTiff),
            "MEM" => Some(Self::Mem),
            _ => None,
        }
    }
}

/// Georeferencing and layout of one raster.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterGrid {
    pub path: PathBuf,
    pub transform: Affine,
    pub width: usize,
    pub height: usize,
    pub n_bands: usize,
    pub epsg: Option<u32>,
    pub no_data: Option<f64>,
    pub data_type: DataType,
}

impl RasterGrid {
    pub fn res_x(&self) -> f64 {
        self.transform.a
    }

    /// Signed; negative for north-up rasters.
    pub fn res_y(&self) -> f64 {
        self.transform.e
    }

    pub fn bbox(&self) -> BBox {
        let (x0, y0) = self.transform.forward(0.0, 0.0);
        let (x1, y1) = self
            .transform
            .forward(self.width as f64, self.height as f64);
        BBox::new(x0.min(x1), x0.max(x1), y0.min(y1), y0.max(y1))
    }
}

enum Store {
    Tiff(geotiff::TiffSource),
    Sink(geotiff::TiffSink),
    Buffer(Array3<f64>),
}

/// An open raster.
pub struct Dataset {
    grid: RasterGrid,
    driver: Driver,
    store: Store,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("grid", &self.grid)
            .field("driver", &self.driver)
            .finish()
    }
}

impl Dataset {
    /// Open an existing GeoTIFF for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (grid, source) = geotiff::TiffSource::open(path.as_ref())?;
        debug!(
            path = %grid.path.display(),
            width = grid.width,
            height = grid.height,
            bands = grid.n_bands,
            "opened raster"
        );
        Ok(Self {
            grid,
            driver: Driver::GTiff,
            store: Store::Tiff(source),
        })
    }

    /// Create a new raster filled with `no_data` (or zero).
    ///
    /// A `GTiff` file exists as soon as this returns; writes reach it when
    /// their strip is evicted from memory or on [`Dataset::flush`]. Outputs
    /// too large for 32-bit offsets are written as BigTIFF.
    #[allow(clippy::too_many_arguments)]
    pub fn create<P: AsRef<Path>>(
        path: P,
        driver: Driver,
        width: usize,
        height: usize,
        n_bands: usize,
        data_type: DataType,
        transform: Affine,
        epsg: Option<u32>,
        no_data: Option<f64>,
    ) -> Result<Self> {
        if width == 0 || height == 0 || n_bands == 0 {
            return Err(BlockError::Configuration(format!(
                "cannot create a {n_bands} band {width}x{height} raster"
            )));
        }
        let fill = data_type.cast(no_data.unwrap_or(0.0), 0.0);
        let grid = RasterGrid {
            path: path.as_ref().to_path_buf(),
            transform,
            width,
            height,
            n_bands,
            epsg,
            no_data,
            data_type,
        };
        let store = match driver {
            Driver::GTiff => Store::Sink(geotiff::TiffSink::create(&grid, fill)?),
            Driver::Mem => Store::Buffer(Array3::from_elem((n_bands, height, width), fill)),
        };
        Ok(Self {
            grid,
            driver,
            store,
        })
    }

    /// Wrap an in-memory `(bands, rows, cols)` array as a `MEM` dataset.
    pub fn mem(
        data: Array3<f64>,
        transform: Affine,
        epsg: Option<u32>,
        no_data: Option<f64>,
    ) -> Self {
        let (n_bands, height, width) = data.dim();
        let grid = RasterGrid {
            path: PathBuf::new(),
            transform,
            width,
            height,
            n_bands,
            epsg,
            no_data,
            data_type: DataType::Float64,
        };
        Self {
            grid,
            driver: Driver::Mem,
            store: Store::Buffer(data),
        }
    }

    pub fn grid(&self) -> &RasterGrid {
        &self.grid
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    fn check_window(&self, band: usize, x_off: usize, y_off: usize, shape: (usize, usize)) -> Result<()> {
        if band == 0 || band > self.grid.n_bands {
            return Err(BlockError::io(format!(
                "band {band} does not exist in {} ({} bands)",
                self.grid.path.display(),
                self.grid.n_bands
            )));
        }
        let (rows, cols) = shape;
        if x_off + cols > self.grid.width || y_off + rows > self.grid.height {
            return Err(BlockError::io(format!(
                "window {cols}x{rows} at ({x_off}, {y_off}) exceeds {}x{} raster {}",
                self.grid.width,
                self.grid.height,
                self.grid.path.display()
            )));
        }
        Ok(())
    }

    /// Read a window of one band (1-based) into `out`, sized by `out`'s shape.
    pub fn read_window(
        &mut self,
        band: usize,
        x_off: usize,
        y_off: usize,
        mut out: ArrayViewMut2<'_, f64>,
    ) -> Result<()> {
        self.check_window(band, x_off, y_off, out.dim())?;
        let (rows, cols) = out.dim();
        match &mut self.store {
            Store::Tiff(src) => src.read_window(band - 1, x_off, y_off, out),
            Store::Sink(sink) => sink.read_window(band - 1, x_off, y_off, out),
            Store::Buffer(data) => {
                out.assign(&data.slice(s![
                    band - 1,
                    y_off..y_off + rows,
                    x_off..x_off + cols
                ]));
                Ok(())
            }
        }
    }

    /// Read a whole band (1-based).
    pub fn read_band(&mut self, band: usize) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((self.grid.height, self.grid.width));
        self.read_window(band, 0, 0, out.view_mut())?;
        Ok(out)
    }

    /// Write a window of one band (1-based), casting to the band data type.
    pub fn write_window(
        &mut self,
        band: usize,
        x_off: usize,
        y_off: usize,
        block: ArrayView2<'_, f64>,
    ) -> Result<()> {
        self.check_window(band, x_off, y_off, block.dim())?;
        let (rows, cols) = block.dim();
        let data_type = self.grid.data_type;
        let fill = self.grid.no_data.unwrap_or(0.0);
        match &mut self.store {
            Store::Tiff(_) => Err(BlockError::io(format!(
                "{} was opened read-only",
                self.grid.path.display()
            ))),
            Store::Sink(sink) => sink.write_window(band - 1, x_off, y_off, block, fill),
            Store::Buffer(data) => {
                let mut dst = data.slice_mut(s![
                    band - 1,
                    y_off..y_off + rows,
                    x_off..x_off + cols
                ]);
                dst.zip_mut_with(&block, |d, &v| *d = data_type.cast(v, fill));
                Ok(())
            }
        }
    }

    /// Write pending strips to disk. No-op for `MEM` and read-only datasets.
    pub fn flush(&mut self) -> Result<()> {
        if let Store::Sink(sink) = &mut self.store {
            sink.flush()?;
            debug!(path = %self.grid.path.display(), "flushed raster");
        }
        Ok(())
    }
}
