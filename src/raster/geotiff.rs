//! GeoTIFF decoding (windowed, chunk at a time) and strip-streamed encoding.
//!
//! Only chunky (pixel-interleaved) layouts are handled, which is what
//! [`TiffSink`] produces and what GDAL writes by default for multi-band
//! GeoTIFFs with `INTERLEAVE=PIXEL`.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;
use ndarray::{ArrayView2, ArrayViewMut2};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tracing::{debug, trace, warn};

use super::{DataType, RasterGrid};
use crate::affine::Affine;
use crate::error::{BlockError, Result};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const USER_DEFINED: u16 = 32767;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Decoded chunks kept per open file.
const CHUNK_CACHE_SIZE: usize = 64;
/// Target uncompressed strip size when writing.
const STRIP_BYTES: usize = 64 * 1024;
/// Strip bytes held in memory per output file.
const WRITE_CACHE_BYTES: usize = 256 << 20;
/// Largest strip data plus strip tables kept in a classic TIFF, leaving
/// room below the 4 GiB offset limit for the header and tags.
const CLASSIC_TIFF_LIMIT: u64 = u32::MAX as u64 - (1 << 20);

/// Read side of a GeoTIFF: the decoder plus a cache of decoded chunks.
pub(crate) struct TiffSource {
    decoder: Decoder<BufReader<File>>,
    width: usize,
    samples: usize,
    chunk_w: usize,
    chunk_h: usize,
    chunks_across: usize,
    cache: LruCache<u32, (usize, Vec<f64>)>,
}

impl TiffSource {
    pub(crate) fn open(path: &Path) -> Result<(RasterGrid, Self)> {
        let file = File::open(path)
            .map_err(|e| BlockError::io_with(format!("cannot open {}", path.display()), e))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| BlockError::io(format!("{} is not a readable TIFF: {e}", path.display())))?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions()?;
        let samples = decoder
            .find_tag_unsigned::<u16>(Tag::SamplesPerPixel)?
            .unwrap_or(1) as usize;
        let planar = decoder
            .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)?
            .unwrap_or(1);
        if planar != 1 {
            return Err(BlockError::io(format!(
                "{}: band-sequential (planar) TIFF layout is not supported",
                path.display()
            )));
        }

        let bits = decoder
            .find_tag_unsigned_vec::<u16>(Tag::BitsPerSample)?
            .and_then(|v| v.first().copied())
            .unwrap_or(1);
        let format = decoder
            .find_tag_unsigned_vec::<u16>(Tag::SampleFormat)?
            .and_then(|v| v.first().copied())
            .unwrap_or(1);
        let data_type = DataType::from_tiff(bits, format).ok_or_else(|| {
            BlockError::io(format!(
                "{}: unsupported sample type ({bits} bits, format {format})",
                path.display()
            ))
        })?;

        let transform = read_transform(&mut decoder)?;
        let epsg = read_epsg(&mut decoder)?;
        let no_data = decoder
            .find_tag(Tag::Unknown(GDAL_NODATA))?
            .map(|v| v.into_string())
            .transpose()?
            .and_then(|s| s.trim_end_matches('\0').trim().parse::<f64>().ok());

        let (chunk_w, chunk_h) = decoder.chunk_dimensions();
        let (chunk_w, chunk_h) = (chunk_w as usize, chunk_h as usize);
        let chunks_across = (width as usize).div_ceil(chunk_w.max(1));

        let grid = RasterGrid {
            path: path.to_path_buf(),
            transform,
            width: width as usize,
            height: height as usize,
            n_bands: samples,
            epsg,
            no_data,
            data_type,
        };
        let source = Self {
            decoder,
            width: width as usize,
            samples,
            chunk_w,
            chunk_h,
            chunks_across,
            cache: LruCache::new(NonZeroUsize::new(CHUNK_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN)),
        };
        Ok((grid, source))
    }

    /// Decoded chunk as (row stride in pixels, interleaved samples).
    fn chunk(&mut self, index: u32) -> Result<&(usize, Vec<f64>)> {
        if !self.cache.contains(&index) {
            let (data_w, _) = self.decoder.chunk_data_dimensions(index);
            let values = decoded_to_f64(self.decoder.read_chunk(index)?);
            self.cache.put(index, (data_w as usize, values));
        }
        self.cache
            .get(&index)
            .ok_or_else(|| BlockError::io(format!("chunk {index} missing from cache")))
    }

    /// `band` is 0-based here; bounds were checked by the dataset.
    pub(crate) fn read_window(
        &mut self,
        band: usize,
        x_off: usize,
        y_off: usize,
        mut out: ArrayViewMut2<'_, f64>,
    ) -> Result<()> {
        let (rows, cols) = out.dim();
        if rows == 0 || cols == 0 {
            return Ok(());
        }
        let (width, samples) = (self.width, self.samples);
        let (chunk_w, chunk_h) = (self.chunk_w, self.chunk_h);
        let chunks_across = self.chunks_across;

        let cx0 = x_off / chunk_w;
        let cx1 = (x_off + cols - 1) / chunk_w;
        let cy0 = y_off / chunk_h;
        let cy1 = (y_off + rows - 1) / chunk_h;

        for cy in cy0..=cy1 {
            for cx in cx0..=cx1 {
                let index = (cy * chunks_across + cx) as u32;
                let (stride, values) = self.chunk(index)?;
                let stride = *stride;

                // Overlap of the window and this chunk, in image pixels.
                let px0 = x_off.max(cx * chunk_w);
                let px1 = (x_off + cols).min((cx + 1) * chunk_w).min(width);
                let py0 = y_off.max(cy * chunk_h);
                let py1 = (y_off + rows).min((cy + 1) * chunk_h);

                for py in py0..py1 {
                    let chunk_row = py - cy * chunk_h;
                    for px in px0..px1 {
                        let chunk_col = px - cx * chunk_w;
                        let idx = (chunk_row * stride + chunk_col) * samples + band;
                        out[(py - y_off, px - x_off)] = values.get(idx).copied().ok_or_else(|| {
                            BlockError::io(format!("chunk {index} is shorter than expected"))
                        })?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn decoded_to_f64(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F16(v) => v.into_iter().map(|x| x.to_f64()).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
    }
}

fn read_transform(decoder: &mut Decoder<BufReader<File>>) -> Result<Affine> {
    if let Some(m) = decoder
        .find_tag(Tag::Unknown(MODEL_TRANSFORMATION))?
        .map(|v| v.into_f64_vec())
        .transpose()?
    {
        if m.len() >= 8 {
            return Ok(Affine::new(m[0], m[1], m[3], m[4], m[5], m[7]));
        }
    }

    let scale = decoder
        .find_tag(Tag::Unknown(MODEL_PIXEL_SCALE))?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let tie = decoder
        .find_tag(Tag::Unknown(MODEL_TIEPOINT))?
        .map(|v| v.into_f64_vec())
        .transpose()?;

    match (scale, tie) {
        (Some(scale), Some(tie)) if scale.len() >= 2 && tie.len() >= 6 => {
            let (sx, sy) = (scale[0], scale[1]);
            let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            Ok(Affine::new(sx, 0.0, x - i * sx, 0.0, -sy, y + j * sy))
        }
        // Ungeoreferenced: GDAL's default pixel-as-coordinate transform.
        _ => Ok(Affine::identity()),
    }
}

fn read_epsg(decoder: &mut Decoder<BufReader<File>>) -> Result<Option<u32>> {
    let keys = match decoder.find_tag_unsigned_vec::<u16>(Tag::Unknown(GEO_KEY_DIRECTORY))? {
        Some(keys) if keys.len() >= 4 => keys,
        _ => return Ok(None),
    };
    let n_keys = keys[3] as usize;
    let mut geographic = None;
    for entry in keys[4..].chunks_exact(4).take(n_keys) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == USER_DEFINED || value == 0 {
            continue;
        }
        match key {
            PROJECTED_CS_TYPE_GEO_KEY => return Ok(Some(value as u32)),
            GEOGRAPHIC_TYPE_GEO_KEY => geographic = Some(value as u32),
            _ => {}
        }
    }
    Ok(geographic)
}

fn is_geographic(epsg: u32) -> bool {
    (4000..5000).contains(&epsg)
}

/// Strip layout of an uncompressed, pixel-interleaved output file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StripLayout {
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) samples: usize,
    pub(crate) sample_bytes: usize,
    pub(crate) rows_per_strip: usize,
}

impl StripLayout {
    pub(crate) fn new(width: usize, height: usize, samples: usize, data_type: DataType) -> Result<Self> {
        let too_big = || {
            BlockError::Configuration(format!(
                "a {samples} band {width}x{height} raster does not fit in a TIFF"
            ))
        };
        if u32::try_from(width).is_err() || u32::try_from(height).is_err() {
            return Err(too_big());
        }
        if u16::try_from(samples).is_err() {
            return Err(too_big());
        }
        let sample_bytes = data_type.bits() as usize / 8;
        let bytes_per_row = width
            .checked_mul(samples)
            .and_then(|n| n.checked_mul(sample_bytes))
            .ok_or_else(too_big)?;
        Ok(Self {
            width,
            height,
            samples,
            sample_bytes,
            rows_per_strip: (STRIP_BYTES / bytes_per_row.max(1)).clamp(1, height.max(1)),
        })
    }

    pub(crate) fn bytes_per_row(&self) -> usize {
        self.width * self.samples * self.sample_bytes
    }

    pub(crate) fn n_strips(&self) -> usize {
        self.height.div_ceil(self.rows_per_strip)
    }

    pub(crate) fn strip_len(&self, strip: usize) -> usize {
        let rows = self
            .rows_per_strip
            .min(self.height.saturating_sub(strip * self.rows_per_strip));
        rows * self.bytes_per_row()
    }

    pub(crate) fn data_bytes(&self) -> u64 {
        (self.bytes_per_row() as u64).saturating_mul(self.height as u64)
    }

    /// Classic TIFF offsets are 32 bit; past that the file must be BigTIFF.
    pub(crate) fn needs_bigtiff(&self) -> bool {
        // offset and byte count per strip
        let tables = self.n_strips() as u64 * 8;
        self.data_bytes().saturating_add(tables) > CLASSIC_TIFF_LIMIT
    }

    /// Strip holding sample (`band`, `col`, `row`) and the byte position of
    /// the sample inside it.
    fn locate(&self, band: usize, col: usize, row: usize) -> (usize, usize) {
        let local = row % self.rows_per_strip;
        (
            row / self.rows_per_strip,
            ((local * self.width + col) * self.samples + band) * self.sample_bytes,
        )
    }
}

/// Store `v` in `dst`, which is exactly one sample long. Values were already
/// cast, so `as` only changes representation.
fn put_sample(dst: &mut [u8], data_type: DataType, v: f64) {
    match data_type {
        DataType::UInt8 => dst.copy_from_slice(&[v as u8]),
        DataType::UInt16 => dst.copy_from_slice(&(v as u16).to_ne_bytes()),
        DataType::Int16 => dst.copy_from_slice(&(v as i16).to_ne_bytes()),
        DataType::UInt32 => dst.copy_from_slice(&(v as u32).to_ne_bytes()),
        DataType::Int32 => dst.copy_from_slice(&(v as i32).to_ne_bytes()),
        DataType::Float32 => dst.copy_from_slice(&(v as f32).to_ne_bytes()),
        DataType::Float64 => dst.copy_from_slice(&v.to_ne_bytes()),
    }
}

fn get_sample(src: &[u8], data_type: DataType) -> f64 {
    fn ne<const N: usize>(src: &[u8]) -> [u8; N] {
        src.try_into().unwrap_or([0; N])
    }
    match data_type {
        DataType::UInt8 => f64::from(src.first().copied().unwrap_or(0)),
        DataType::UInt16 => f64::from(u16::from_ne_bytes(ne(src))),
        DataType::Int16 => f64::from(i16::from_ne_bytes(ne(src))),
        DataType::UInt32 => f64::from(u32::from_ne_bytes(ne(src))),
        DataType::Int32 => f64::from(i32::from_ne_bytes(ne(src))),
        DataType::Float32 => f64::from(f32::from_ne_bytes(ne(src))),
        DataType::Float64 => f64::from_ne_bytes(ne(src)),
    }
}

fn write_geo_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    grid: &RasterGrid,
    epsg: Option<u16>,
) -> Result<()> {
    let t = &grid.transform;
    if t.is_rectilinear() {
        let scale = [t.a, -t.e, 0.0];
        dir.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), scale.as_slice())?;
        let tie = [0.0, 0.0, 0.0, t.c, t.f, 0.0];
        dir.write_tag(Tag::Unknown(MODEL_TIEPOINT), tie.as_slice())?;
    } else {
        let m = [
            t.a, t.b, 0.0, t.c, t.d, t.e, 0.0, t.f, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        ];
        dir.write_tag(Tag::Unknown(MODEL_TRANSFORMATION), m.as_slice())?;
    }

    if let Some(code) = epsg {
        let (model, cs_key) = if is_geographic(u32::from(code)) {
            (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE_GEO_KEY)
        } else {
            (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE_GEO_KEY)
        };
        #[rustfmt::skip]
        let keys: Vec<u16> = vec![
            1, 1, 0, 3,
            GT_MODEL_TYPE_GEO_KEY, 0, 1, model,
            GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA,
            cs_key, 0, 1, code,
        ];
        dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), keys.as_slice())?;
    }

    if let Some(nd) = grid.no_data {
        dir.write_tag(Tag::Unknown(GDAL_NODATA), format!("{nd}").as_str())?;
    }
    Ok(())
}

/// Write the directory and every strip, each filled with `fill`, and return
/// the file offset of each strip.
fn write_layout<W: Write + Seek, K: TiffKind>(
    mut encoder: TiffEncoder<W, K>,
    grid: &RasterGrid,
    layout: &StripLayout,
    epsg: Option<u16>,
    fill: f64,
) -> Result<Vec<u64>> {
    let mut dir = encoder.image_directory()?;
    let bands = layout.samples;
    dir.write_tag(Tag::ImageWidth, layout.width as u32)?;
    dir.write_tag(Tag::ImageLength, layout.height as u32)?;
    let bits: Vec<u16> = vec![grid.data_type.bits(); bands];
    dir.write_tag(Tag::BitsPerSample, bits.as_slice())?;
    let formats: Vec<u16> = vec![grid.data_type.sample_format(); bands];
    dir.write_tag(Tag::SampleFormat, formats.as_slice())?;
    dir.write_tag(Tag::Compression, 1u16)?;
    dir.write_tag(Tag::PhotometricInterpretation, 1u16)?;
    dir.write_tag(Tag::SamplesPerPixel, bands as u16)?;
    dir.write_tag(Tag::PlanarConfiguration, 1u16)?;
    dir.write_tag(Tag::RowsPerStrip, layout.rows_per_strip as u32)?;
    if bands > 1 {
        let extra: Vec<u16> = vec![0; bands - 1];
        dir.write_tag(Tag::ExtraSamples, extra.as_slice())?;
    }
    write_geo_tags(&mut dir, grid, epsg)?;

    let mut row = vec![0u8; layout.bytes_per_row()];
    for sample in row.chunks_exact_mut(layout.sample_bytes) {
        put_sample(sample, grid.data_type, fill);
    }
    let strip = row.repeat(layout.rows_per_strip);

    let n_strips = layout.n_strips();
    let mut offsets = Vec::with_capacity(n_strips);
    let mut tiff_offsets: Vec<K::OffsetType> = Vec::with_capacity(n_strips);
    let mut counts: Vec<K::OffsetType> = Vec::with_capacity(n_strips);
    for index in 0..n_strips {
        let len = layout.strip_len(index);
        let offset = dir.write_data(&strip[..len])?;
        offsets.push(offset);
        tiff_offsets.push(K::convert_offset(offset)?);
        counts.push(K::convert_offset(len as u64)?);
    }
    dir.write_tag(Tag::StripOffsets, K::convert_slice(&tiff_offsets))?;
    dir.write_tag(Tag::StripByteCounts, K::convert_slice(&counts))?;
    dir.finish()?;
    Ok(offsets)
}

struct Strip {
    bytes: Vec<u8>,
    dirty: bool,
}

/// Write side of a GeoTIFF created for output.
///
/// The whole file is laid out when it is created: uncompressed strips
/// holding the fill value, so every strip has a fixed offset. Windows are
/// written into an LRU of strips; a dirty strip goes back to its place in
/// the file when it is evicted and on [`TiffSink::flush`].
pub(crate) struct TiffSink {
    path: PathBuf,
    file: File,
    data_type: DataType,
    layout: StripLayout,
    offsets: Vec<u64>,
    cache: LruCache<usize, Strip>,
}

impl TiffSink {
    pub(crate) fn create(grid: &RasterGrid, fill: f64) -> Result<Self> {
        let layout = StripLayout::new(grid.width, grid.height, grid.n_bands, grid.data_type)?;
        Self::create_with(grid, fill, layout.needs_bigtiff(), WRITE_CACHE_BYTES)
    }

    pub(crate) fn create_with(
        grid: &RasterGrid,
        fill: f64,
        big: bool,
        cache_bytes: usize,
    ) -> Result<Self> {
        let layout = StripLayout::new(grid.width, grid.height, grid.n_bands, grid.data_type)?;
        let epsg = grid
            .epsg
            .map(|code| {
                u16::try_from(code).map_err(|_| {
                    BlockError::Configuration(format!(
                        "EPSG:{code} does not fit in a GeoTIFF GeoKey"
                    ))
                })
            })
            .transpose()?;

        let path = grid.path.clone();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| BlockError::io_with(format!("cannot create {}", path.display()), e))?;
        let mut writer = BufWriter::new(file);
        let offsets = if big {
            write_layout(TiffEncoder::new_big(&mut writer)?, grid, &layout, epsg, fill)?
        } else {
            write_layout(TiffEncoder::new(&mut writer)?, grid, &layout, epsg, fill)?
        };
        let file = writer.into_inner().map_err(|e| {
            BlockError::io_with(format!("cannot write {}", path.display()), e.into_error())
        })?;

        let capacity = (cache_bytes / layout.strip_len(0).max(1)).max(1);
        debug!(
            path = %path.display(),
            strips = offsets.len(),
            bigtiff = big,
            cached_strips = capacity,
            "laid out output raster"
        );
        Ok(Self {
            path,
            file,
            data_type: grid.data_type,
            layout,
            offsets,
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        })
    }

    fn strip(&mut self, index: usize) -> Result<&mut Strip> {
        if !self.cache.contains(&index) {
            let mut bytes = vec![0u8; self.layout.strip_len(index)];
            self.file
                .seek(SeekFrom::Start(self.offsets[index]))
                .and_then(|_| self.file.read_exact(&mut bytes))
                .map_err(|e| {
                    BlockError::io_with(format!("cannot read strip {index} of {}", self.path.display()), e)
                })?;
            if let Some((evicted, strip)) = self.cache.push(index, Strip { bytes, dirty: false }) {
                if strip.dirty {
                    trace!(strip = evicted, "writing back evicted strip");
                    write_strip(&mut self.file, &self.path, self.offsets[evicted], &strip.bytes)?;
                }
            }
        }
        self.cache
            .get_mut(&index)
            .ok_or_else(|| BlockError::io(format!("strip {index} missing from cache")))
    }

    /// `band` is 0-based here; bounds were checked by the dataset.
    pub(crate) fn read_window(
        &mut self,
        band: usize,
        x_off: usize,
        y_off: usize,
        mut out: ArrayViewMut2<'_, f64>,
    ) -> Result<()> {
        let (rows, cols) = out.dim();
        let (layout, data_type) = (self.layout, self.data_type);
        let step = layout.samples * layout.sample_bytes;
        for r in 0..rows {
            let (index, start) = layout.locate(band, x_off, y_off + r);
            let strip = self.strip(index)?;
            for c in 0..cols {
                let pos = start + c * step;
                let bytes = strip.bytes.get(pos..pos + layout.sample_bytes).ok_or_else(|| {
                    BlockError::io(format!("strip {index} is shorter than expected"))
                })?;
                out[(r, c)] = get_sample(bytes, data_type);
            }
        }
        Ok(())
    }

    /// Cast and store `block` at (`x_off`, `y_off`) of `band` (0-based).
    pub(crate) fn write_window(
        &mut self,
        band: usize,
        x_off: usize,
        y_off: usize,
        block: ArrayView2<'_, f64>,
        fill: f64,
    ) -> Result<()> {
        let (rows, cols) = block.dim();
        let (layout, data_type) = (self.layout, self.data_type);
        let step = layout.samples * layout.sample_bytes;
        for r in 0..rows {
            let (index, start) = layout.locate(band, x_off, y_off + r);
            let strip = self.strip(index)?;
            strip.dirty = true;
            for c in 0..cols {
                let pos = start + c * step;
                let dst = strip.bytes.get_mut(pos..pos + layout.sample_bytes).ok_or_else(|| {
                    BlockError::io(format!("strip {index} is shorter than expected"))
                })?;
                put_sample(dst, data_type, data_type.cast(block[(r, c)], fill));
            }
        }
        Ok(())
    }

    /// Write every dirty strip back to the file.
    pub(crate) fn flush(&mut self) -> Result<()> {
        let mut written = 0;
        for (&index, strip) in self.cache.iter_mut() {
            if strip.dirty {
                write_strip(&mut self.file, &self.path, self.offsets[index], &strip.bytes)?;
                strip.dirty = false;
                written += 1;
            }
        }
        self.file
            .flush()
            .map_err(|e| BlockError::io_with(format!("cannot write {}", self.path.display()), e))?;
        trace!(path = %self.path.display(), strips = written, "flushed strips");
        Ok(())
    }
}

impl Drop for TiffSink {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "failed to flush output raster");
        }
    }
}

fn write_strip(file: &mut File, path: &Path, offset: u64, bytes: &[u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.write_all(bytes))
        .map_err(|e| BlockError::io_with(format!("cannot write {}", path.display()), e))
}
