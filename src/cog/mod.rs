use crate::io::AsyncReadRange;
use crate::tiff::{Ifd, TagId, Tiff};
use std::fmt::Display;
use std::io::{BufReader, Cursor, Read, Seek};
use std::sync::Arc;
use tracing::*;

mod compression;
mod error;
mod georef;
mod level;
mod tiles;

pub use compression::{Compression, Predictor};
pub use error::{CogError, CogResult};
pub use georef::GeoReference;
pub use level::Level;

/// Header bytes requested first when opening a remote COG.
pub const DEFAULT_HEADER_BYTES: usize = 16 * 1024;
const MAX_HEADER_BYTES: usize = 4 * 1024 * 1024;

/// Cloud Optimized GeoTIFF: tiled levels (largest first) plus georeferencing.
#[derive(Clone, Debug)]
pub struct CloudTiff {
    levels: Vec<Level>,
    georef: GeoReference,
    nodata: Option<f64>,
}

impl CloudTiff {
    pub fn open<R: Read + Seek>(source: &mut R) -> CogResult<Self> {
        let stream = &mut BufReader::new(source);
        let tiff = Tiff::open(stream)?;

        let ifd0 = tiff.ifds.first().ok_or(CogError::NoLevels)?;
        let georef = GeoReference::parse(ifd0)?;
        let nodata = parse_nodata(ifd0);

        // Mask IFDs and untiled IFDs are not levels
        let mut levels: Vec<Level> = tiff
            .ifds
            .iter()
            .filter(|ifd| !Level::is_mask(ifd))
            .filter_map(|ifd| match Level::from_ifd(ifd, tiff.endian) {
                Ok(level) => Some(level),
                Err(e) => {
                    debug!("Skipping IFD: {e}");
                    None
                }
            })
            .collect();

        levels.sort_by(|a, b| b.megapixels().total_cmp(&a.megapixels()));
        if levels.is_empty() {
            return Err(CogError::NoLevels);
        }

        Ok(Self {
            levels,
            georef,
            nodata,
        })
    }

    /// Read the header through range requests, growing the request until it parses.
    pub async fn open_from_reader(
        reader: &dyn AsyncReadRange,
        initial_bytes: usize,
    ) -> CogResult<Self> {
        let mut fetch_size = initial_bytes.max(1024);
        loop {
            let mut buffer = vec![0; fetch_size];
            let n = reader.read_range_async(0, &mut buffer).await?;
            buffer.truncate(n);
            debug!("Fetched {n} header bytes");

            match Self::open(&mut Cursor::new(&buffer)) {
                Err(CogError::BadTiff(e)) if e.is_truncated() => {
                    if n < fetch_size || fetch_size >= MAX_HEADER_BYTES {
                        return Err(CogError::BadTiff(e));
                    }
                    fetch_size *= 2;
                }
                result => return result,
            }
        }
    }

    pub fn georef(&self) -> &GeoReference {
        &self.georef
    }

    pub fn epsg(&self) -> u16 {
        self.georef.epsg
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn full_dimensions(&self) -> (u32, u32) {
        self.levels[0].dimensions
    }

    /// `(min_x, min_y, max_x, max_y)` in the native CRS.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.georef.bounds(self.full_dimensions())
    }

    /// Coarsest level that still has at least one pixel per output pixel.
    ///
    /// `downsample` is full resolution pixels per output pixel.
    pub fn level_for_downsample(&self, downsample: f64) -> &Level {
        let full_width = self.full_dimensions().0 as f64;
        self.levels
            .iter()
            .rev()
            .find(|level| full_width / level.width() as f64 <= downsample.max(1.0))
            .unwrap_or(&self.levels[0])
    }

    /// First-band values at fractional full resolution pixel coordinates.
    ///
    /// Positions outside the image or in unreadable tiles are NaN.
    pub async fn sample_pixels(
        &self,
        reader: &Arc<dyn AsyncReadRange>,
        positions: &[(f64, f64)],
        downsample: f64,
    ) -> CogResult<Vec<f32>> {
        let level = self.level_for_downsample(downsample);
        let (full_w, full_h) = self.full_dimensions();
        let sx = level.width() as f64 / full_w as f64;
        let sy = level.height() as f64 / full_h as f64;

        let pixels: Vec<Option<(u32, u32)>> = positions
            .iter()
            .map(|&(u, v)| {
                let (x, y) = ((u * sx).floor(), (v * sy).floor());
                let inside = x >= 0.0
                    && y >= 0.0
                    && x < level.width() as f64
                    && y < level.height() as f64;
                inside.then_some((x as u32, y as u32))
            })
            .collect();

        let mut indices: Vec<usize> = pixels
            .iter()
            .flatten()
            .filter_map(|&(x, y)| level.tile_at_pixel(x, y).map(|(i, _, _)| i))
            .collect();
        indices.sort_unstable();
        indices.dedup();
        debug!("Sampling {} positions from {} tiles of {level}", positions.len(), indices.len());

        let cache = tiles::get_tiles(reader, level, indices).await?;
        Ok(tiles::sample_tiles(&cache, level, &pixels))
    }
}

fn parse_nodata(ifd: &Ifd) -> Option<f64> {
    let tag = ifd.get_tag(TagId::GdalNoData).ok()?;
    let text = tag.ascii()?;
    match text.trim().parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparseable nodata value {text:?}");
            None
        }
    }
}

impl Display for CloudTiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CloudTiff(EPSG:{}, {} Levels)",
            self.georef.epsg,
            self.levels.len()
        )?;
        for level in self.levels.iter() {
            write!(f, "\n  {level}")?;
        }
        Ok(())
    }
}

