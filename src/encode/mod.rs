//! Tiled float32 GeoTIFF writer for exported layers.

use crate::cog::{Compression, GeoReference, Predictor};
use crate::raster::{PhotometricInterpretation, PlanarConfiguration, RasterTile, SampleFormat};
use crate::tiff::{Endian, TagId, TagType};
use proj4rs::proj::Proj;
use rayon::prelude::*;
use std::io::Write;
use std::path::Path;
use tracing::*;

mod error;

pub use error::{EncodeError, EncodeResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TiffVariant {
    Normal,
    Big,
}

impl TiffVariant {
    fn offset_bytesize(&self) -> usize {
        match self {
            TiffVariant::Normal => 4,
            TiffVariant::Big => 8,
        }
    }
}

struct Entry {
    code: u16,
    datatype: TagType,
    count: usize,
    data: Vec<u8>,
}

impl Entry {
    fn short(id: TagId, values: &[u16], endian: Endian) -> Self {
        Self::new(id, TagType::Short, values.len(), endian.encode_all(values))
    }

    fn long(id: TagId, values: &[u32], endian: Endian) -> Self {
        Self::new(id, TagType::Long, values.len(), endian.encode_all(values))
    }

    fn long8(id: TagId, values: &[u64], endian: Endian) -> Self {
        Self::new(id, TagType::Long8, values.len(), endian.encode_all(values))
    }

    fn double(id: TagId, values: &[f64], endian: Endian) -> Self {
        Self::new(id, TagType::Double, values.len(), endian.encode_all(values))
    }

    fn ascii(id: TagId, text: &str) -> Self {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        Self::new(id, TagType::Ascii, data.len(), data)
    }

    fn new(id: TagId, datatype: TagType, count: usize, data: Vec<u8>) -> Self {
        Self {
            code: id.into(),
            datatype,
            count,
            data,
        }
    }
}

/// Writes a [`RasterTile`] as a single level tiled GeoTIFF.
///
/// Samples are float32, pixel interleaved. Georeferencing and nodata are
/// stored as GeoTIFF and GDAL tags so the file reopens with [`crate::cog::CloudTiff`].
#[derive(Debug)]
pub struct Encoder<'a> {
    tile: &'a RasterTile,
    endian: Endian,
    variant: TiffVariant,
    compression: Compression,
    tile_size: u32,
}

impl<'a> Encoder<'a> {
    pub fn new(tile: &'a RasterTile) -> Self {
        Self {
            tile,
            endian: Endian::Little,
            variant: TiffVariant::Normal,
            compression: Compression::DeflateAdobe,
            tile_size: 256,
        }
    }

    /// Tile edge in pixels, rounded up to a multiple of 16.
    pub fn with_tile_size(mut self, pixels: u32) -> Self {
        self.tile_size = pixels.max(16).div_ceil(16) * 16;
        self
    }

    pub fn with_big_endian(mut self, big: bool) -> Self {
        self.endian = if big { Endian::Big } else { Endian::Little };
        self
    }

    pub fn with_big_tiff(mut self, big: bool) -> Self {
        self.variant = if big {
            TiffVariant::Big
        } else {
            TiffVariant::Normal
        };
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> EncodeResult<()> {
        let bytes = self.encode_to_vec()?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    pub async fn write_to_path<P: AsRef<Path>>(&self, path: P) -> EncodeResult<()> {
        let bytes = self.encode_to_vec()?;
        if let Some(parent) = path.as_ref().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path.as_ref(), bytes).await?;
        debug!("Wrote {}", path.as_ref().display());
        Ok(())
    }

    pub fn encode_to_vec(&self) -> EncodeResult<Vec<u8>> {
        if !matches!(
            self.compression,
            Compression::Uncompressed | Compression::DeflateAdobe | Compression::Deflate
        ) {
            return Err(EncodeError::NotSupported(format!(
                "{:?} encoding",
                self.compression
            )));
        }
        let endian = self.endian;
        let variant = self.variant;
        let offset_size = variant.offset_bytesize();

        let chunks = self.encode_tiles()?;
        let header_size: usize = match variant {
            TiffVariant::Normal => 8,
            TiffVariant::Big => 16,
        };
        let mut offsets = Vec::with_capacity(chunks.len());
        let mut position = header_size as u64;
        for chunk in chunks.iter() {
            offsets.push(position);
            position += chunk.len() as u64;
        }
        let byte_counts: Vec<u64> = chunks.iter().map(|c| c.len() as u64).collect();
        let ifd_offset = align(position as usize);

        let mut entries = self.tags(&offsets, &byte_counts)?;
        entries.sort_by_key(|e| e.code);

        let (count_size, entry_size) = match variant {
            TiffVariant::Normal => (2, 12),
            TiffVariant::Big => (8, 20),
        };
        let ifd_size = count_size + entries.len() * entry_size + offset_size;
        if variant == TiffVariant::Normal {
            let estimate = ifd_offset + ifd_size + entries.iter().map(|e| e.data.len() + 1).sum::<usize>();
            if estimate > u32::MAX as usize {
                return Err(EncodeError::NotSupported(
                    "more than 4 GiB in a classic TIFF".to_string(),
                ));
            }
        }

        let mut out = Vec::with_capacity(ifd_offset + ifd_size);
        match endian {
            Endian::Little => out.extend_from_slice(b"II"),
            Endian::Big => out.extend_from_slice(b"MM"),
        }
        match variant {
            TiffVariant::Normal => {
                out.extend(endian.encode(42_u16));
                out.extend(endian.encode(ifd_offset as u32));
            }
            TiffVariant::Big => {
                out.extend(endian.encode(43_u16));
                out.extend(endian.encode(8_u16));
                out.extend(endian.encode(0_u16));
                out.extend(endian.encode(ifd_offset as u64));
            }
        }
        for chunk in chunks.iter() {
            out.extend_from_slice(chunk);
        }
        out.resize(ifd_offset, 0);

        // Values too large to inline follow the directory
        let mut extra: Vec<u8> = vec![];
        let extra_start = ifd_offset + ifd_size;
        match variant {
            TiffVariant::Normal => out.extend(endian.encode(entries.len() as u16)),
            TiffVariant::Big => out.extend(endian.encode(entries.len() as u64)),
        }
        for entry in entries.iter() {
            out.extend(endian.encode(entry.code));
            out.extend(endian.encode(u16::from(entry.datatype)));
            self.push_offset(&mut out, entry.count as u64);
            if entry.data.len() <= offset_size {
                let mut inline = entry.data.clone();
                inline.resize(offset_size, 0);
                out.extend(inline);
            } else {
                extra.resize(align(extra.len()), 0);
                self.push_offset(&mut out, (extra_start + extra.len()) as u64);
                extra.extend_from_slice(&entry.data);
            }
        }
        self.push_offset(&mut out, 0);
        out.extend(extra);
        Ok(out)
    }

    fn push_offset(&self, out: &mut Vec<u8>, value: u64) {
        match self.variant {
            TiffVariant::Normal => out.extend(self.endian.encode(value as u32)),
            TiffVariant::Big => out.extend(self.endian.encode(value)),
        }
    }

    fn encode_tiles(&self) -> EncodeResult<Vec<Vec<u8>>> {
        let raster = self.tile.raster();
        let (width, height) = raster.dimensions;
        let size = self.tile_size;
        let (cols, rows) = (width.div_ceil(size), height.div_ceil(size));
        let bands = raster.band_count();
        let fill = self.tile.nodata().unwrap_or(f32::NAN);

        (0..rows * cols)
            .into_par_iter()
            .map(|index| -> EncodeResult<Vec<u8>> {
                let (tx, ty) = (index % cols, index / cols);
                let mut samples = Vec::with_capacity((size * size) as usize * bands);
                for y in 0..size {
                    for x in 0..size {
                        let (px, py) = (tx * size + x, ty * size + y);
                        for band in 0..bands {
                            samples.push(raster.get(band, px, py).unwrap_or(fill));
                        }
                    }
                }
                let bytes = self.endian.encode_all::<4, f32>(&samples);
                Ok(self.compression.encode(&bytes)?)
            })
            .collect()
    }

    fn tags(&self, offsets: &[u64], byte_counts: &[u64]) -> EncodeResult<Vec<Entry>> {
        let endian = self.endian;
        let tile = self.tile;
        let (width, height) = tile.dimensions();
        let bands = tile.band_count();
        let extent = tile.extent();
        let (px, py) = tile.pixel_size();

        let geographic = Proj::from_epsg_code(extent.epsg)
            .map_err(|e| EncodeError::UnsupportedProjection(extent.epsg, format!("{e:?}")))?
            .is_latlong();
        let georef = GeoReference {
            epsg: extent.epsg,
            origin: (extent.min_x(), extent.max_y()),
            pixel_scale: (px, py),
        };
        let photometric = if bands == 3 {
            PhotometricInterpretation::RGB
        } else {
            PhotometricInterpretation::BlackIsZero
        };

        let mut entries = vec![
            Entry::long(TagId::ImageWidth, &[width], endian),
            Entry::long(TagId::ImageHeight, &[height], endian),
            Entry::short(TagId::BitsPerSample, &vec![32_u16; bands], endian),
            Entry::short(TagId::Compression, &[u16::from(self.compression)], endian),
            Entry::short(TagId::PhotometricInterpretation, &[u16::from(photometric)], endian),
            Entry::short(TagId::SamplesPerPixel, &[bands as u16], endian),
            Entry::short(
                TagId::PlanarConfiguration,
                &[u16::from(PlanarConfiguration::Chunky)],
                endian,
            ),
            Entry::short(TagId::Predictor, &[u16::from(Predictor::No)], endian),
            Entry::long(TagId::TileWidth, &[self.tile_size], endian),
            Entry::long(TagId::TileLength, &[self.tile_size], endian),
            Entry::short(
                TagId::SampleFormat,
                &vec![u16::from(SampleFormat::Float); bands],
                endian,
            ),
            Entry::double(TagId::ModelPixelScale, &[px, py, 0.0], endian),
            Entry::double(
                TagId::ModelTiepoint,
                &[0.0, 0.0, 0.0, georef.origin.0, georef.origin.1, 0.0],
                endian,
            ),
            Entry::short(
                TagId::GeoKeyDirectory,
                &georef.geokey_directory(geographic),
                endian,
            ),
        ];
        match self.variant {
            TiffVariant::Normal => {
                let narrow = |v: &[u64]| v.iter().map(|&o| o as u32).collect::<Vec<u32>>();
                entries.push(Entry::long(TagId::TileOffsets, &narrow(offsets), endian));
                entries.push(Entry::long(TagId::TileByteCounts, &narrow(byte_counts), endian));
            }
            TiffVariant::Big => {
                entries.push(Entry::long8(TagId::TileOffsets, offsets, endian));
                entries.push(Entry::long8(TagId::TileByteCounts, byte_counts, endian));
            }
        }
        if let Some(nodata) = tile.nodata() {
            entries.push(Entry::ascii(TagId::GdalNoData, &nodata.to_string()));
        }
        Ok(entries)
    }
}

// Word alignment for offsets
fn align(position: usize) -> usize {
    position + position % 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cog::CloudTiff;
    use crate::geo::MapExtent;
    use crate::raster::Raster;
    use std::io::Cursor;

    fn tile(bands: usize, nodata: Option<f32>) -> RasterTile {
        let (w, h) = (40, 24);
        let values = (0..bands)
            .map(|b| (0..w * h).map(|i| (i + b as u32 * 1000) as f32).collect())
            .collect();
        let raster = Raster::new((w, h), values).unwrap();
        let extent = MapExtent::new(32618, 500_000.0, 1_000_000.0, 500_400.0, 1_000_240.0).unwrap();
        RasterTile::new(raster, extent, nodata)
    }

    #[test]
    fn reopens_with_georeference() {
        let src = tile(1, Some(-9999.0));
        let bytes = Encoder::new(&src).with_tile_size(16).encode_to_vec().unwrap();
        let cog = CloudTiff::open(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(cog.epsg(), 32618);
        assert_eq!(cog.full_dimensions(), (40, 24));
        assert_eq!(cog.nodata(), Some(-9999.0));
        assert_eq!(cog.bounds(), (500_000.0, 1_000_000.0, 500_400.0, 1_000_240.0));
        let level = &cog.levels()[0];
        assert_eq!((level.col_count(), level.row_count()), (3, 2));
    }

    #[test]
    fn big_endian_bigtiff_reopens() {
        let src = tile(3, None);
        let bytes = Encoder::new(&src)
            .with_big_endian(true)
            .with_big_tiff(true)
            .with_compression(Compression::Uncompressed)
            .encode_to_vec()
            .unwrap();
        assert_eq!(&bytes[..4], b"MM\0+");
        let cog = CloudTiff::open(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(cog.levels()[0].samples_per_pixel, 3);
        assert_eq!(cog.nodata(), None);
    }

    #[test]
    fn tile_size_is_multiple_of_16() {
        let src = tile(1, None);
        assert_eq!(Encoder::new(&src).with_tile_size(100).tile_size, 112);
        assert_eq!(Encoder::new(&src).with_tile_size(1).tile_size, 16);
    }

    #[test]
    fn unsupported_codec_is_rejected() {
        let src = tile(1, None);
        let err = Encoder::new(&src)
            .with_compression(Compression::Jpeg)
            .encode_to_vec()
            .unwrap_err();
        assert!(matches!(err, EncodeError::NotSupported(_)));
    }
}
