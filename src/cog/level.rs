use super::compression::{Compression, Predictor};
use super::{CogError, CogResult};
use crate::raster::{PlanarConfiguration, Raster, SampleFormat};
use crate::tiff::{Endian, Ifd, TagId, TiffError};
use std::fmt::Display;

// NewSubfileType bit marking transparency masks
const MASK_SUBFILE: u32 = 0x4;

/// One resolution of a tiled TIFF: full image or an overview.
#[derive(Clone, Debug)]
pub struct Level {
    pub dimensions: (u32, u32),
    pub tile_width: u32,
    pub tile_height: u32,
    pub compression: Compression,
    pub predictor: Predictor,
    pub bits_per_sample: u16,
    pub samples_per_pixel: usize,
    pub sample_format: SampleFormat,
    pub planar: PlanarConfiguration,
    pub endian: Endian,
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
}

impl Level {
    pub fn from_ifd(ifd: &Ifd, endian: Endian) -> CogResult<Self> {
        let width = ifd.get_tag_value(TagId::ImageWidth)?;
        let height = ifd.get_tag_value(TagId::ImageHeight)?;
        let tile_width: u32 = ifd.get_tag_value(TagId::TileWidth)?;
        let tile_height: u32 = ifd.get_tag_value(TagId::TileLength)?;
        let compression = ifd.tag_value_or::<u16>(TagId::Compression, 1)?.into();
        let predictor = ifd.tag_value_or::<u16>(TagId::Predictor, 1)?.into();
        let samples_per_pixel = ifd.tag_value_or::<usize>(TagId::SamplesPerPixel, 1)?;
        let sample_format = ifd.tag_value_or::<u16>(TagId::SampleFormat, 1)?.into();
        let planar = ifd
            .tag_value_or::<u16>(TagId::PlanarConfiguration, 1)?
            .into();
        let bits: Vec<u16> = ifd.get_tag_values(TagId::BitsPerSample)?;
        let offsets: Vec<u64> = ifd.get_tag_values(TagId::TileOffsets)?;
        let byte_counts: Vec<u64> = ifd.get_tag_values(TagId::TileByteCounts)?;

        if tile_width == 0 || tile_height == 0 {
            return Err(TiffError::BadTag(TagId::TileWidth).into());
        }
        if offsets.len() != byte_counts.len() {
            return Err(TiffError::BadTag(TagId::TileOffsets).into());
        }
        let bits_per_sample = match bits.first() {
            Some(b) if bits.iter().all(|other| other == b) => *b,
            Some(_) => {
                return Err(CogError::NotSupported(format!(
                    "mixed bits per sample {bits:?}"
                )))
            }
            None => return Err(TiffError::BadTag(TagId::BitsPerSample).into()),
        };
        if planar == PlanarConfiguration::Unknown {
            return Err(TiffError::BadTag(TagId::PlanarConfiguration).into());
        }

        let level = Self {
            dimensions: (width, height),
            tile_width,
            tile_height,
            compression,
            predictor,
            bits_per_sample,
            samples_per_pixel: samples_per_pixel.max(1),
            sample_format,
            planar,
            endian,
            offsets,
            byte_counts,
        };
        if level.offsets.len() < level.tiles_per_plane() {
            return Err(TiffError::BadTag(TagId::TileOffsets).into());
        }
        Ok(level)
    }

    /// True for transparency mask IFDs, which are not image levels.
    pub fn is_mask(ifd: &Ifd) -> bool {
        ifd.tag_value_or::<u32>(TagId::NewSubfileType, 0)
            .map(|t| t & MASK_SUBFILE != 0)
            .unwrap_or(false)
    }

    pub fn megapixels(&self) -> f64 {
        (self.dimensions.0 as f64 * self.dimensions.1 as f64) / 1e6
    }

    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    pub fn col_count(&self) -> usize {
        self.width().div_ceil(self.tile_width) as usize
    }

    pub fn row_count(&self) -> usize {
        self.height().div_ceil(self.tile_height) as usize
    }

    pub fn tiles_per_plane(&self) -> usize {
        self.col_count().saturating_mul(self.row_count())
    }

    /// Tile index and position within the tile of a level pixel. Reads use the first plane.
    pub fn tile_at_pixel(&self, x: u32, y: u32) -> Option<(usize, u32, u32)> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let col = (x / self.tile_width) as usize;
        let row = (y / self.tile_height) as usize;
        Some((
            row * self.col_count() + col,
            x % self.tile_width,
            y % self.tile_height,
        ))
    }

    pub fn tile_byte_range(&self, index: usize) -> CogResult<(u64, u64)> {
        let max_valid_index = self.tiles_per_plane().saturating_sub(1);
        if index > max_valid_index {
            return Err(CogError::TileIndexOutOfRange(index, max_valid_index));
        }
        let offset = self.offsets[index];
        let end = offset
            .checked_add(self.byte_counts[index])
            .ok_or(TiffError::BadTag(TagId::TileByteCounts))?;
        Ok((offset, end))
    }

    fn samples_in_tile(&self) -> usize {
        match self.planar {
            PlanarConfiguration::Planar => 1,
            _ => self.samples_per_pixel,
        }
    }

    pub fn extract_tile_from_bytes(&self, bytes: &[u8]) -> CogResult<Raster> {
        let mut buffer = self.compression.decode(bytes)?;

        let samples = self.samples_in_tile();
        let bytes_per_sample = (self.bits_per_sample as usize) / 8;
        if bytes_per_sample == 0 || self.bits_per_sample % 8 != 0 {
            return Err(CogError::NotSupported(format!(
                "{} bits per sample",
                self.bits_per_sample
            )));
        }
        let required = (self.tile_width as usize)
            .checked_mul(self.tile_height as usize)
            .and_then(|n| n.checked_mul(samples))
            .and_then(|n| n.checked_mul(bytes_per_sample))
            .ok_or_else(|| CogError::NotSupported("tile size overflows".to_string()))?;
        if buffer.len() < required {
            return Err(CogError::Decompress(format!(
                "tile decoded to {} bytes, expected {required}",
                buffer.len()
            )));
        }
        buffer.truncate(required);

        self.predictor.predict(
            buffer.as_mut_slice(),
            self.tile_width as usize,
            bytes_per_sample,
            samples,
            self.endian,
        )?;

        let values = self.decode_samples(&buffer)?;
        Ok(Raster::from_interleaved(
            (self.tile_width, self.tile_height),
            &values,
            samples,
        )?)
    }

    fn decode_samples(&self, buffer: &[u8]) -> CogResult<Vec<f32>> {
        let e = self.endian;
        let values = match (self.sample_format, self.bits_per_sample) {
            (SampleFormat::Unsigned, 8) => Some(buffer.iter().map(|&b| b as f32).collect()),
            (SampleFormat::Signed, 8) => Some(buffer.iter().map(|&b| b as i8 as f32).collect()),
            (SampleFormat::Unsigned, 16) => e
                .decode_all::<2, u16>(buffer)
                .map(|v| v.into_iter().map(f32::from).collect()),
            (SampleFormat::Signed, 16) => e
                .decode_all::<2, i16>(buffer)
                .map(|v| v.into_iter().map(f32::from).collect()),
            (SampleFormat::Unsigned, 32) => e
                .decode_all::<4, u32>(buffer)
                .map(|v| v.into_iter().map(|x| x as f32).collect()),
            (SampleFormat::Signed, 32) => e
                .decode_all::<4, i32>(buffer)
                .map(|v| v.into_iter().map(|x| x as f32).collect()),
            (SampleFormat::Float, 32) => e.decode_all::<4, f32>(buffer),
            (SampleFormat::Float, 64) => e
                .decode_all::<8, f64>(buffer)
                .map(|v| v.into_iter().map(|x| x as f32).collect()),
            (format, bits) => {
                return Err(CogError::NotSupported(format!(
                    "{bits}-bit {format:?} samples"
                )))
            }
        };
        values.ok_or_else(|| CogError::Decompress("misaligned sample buffer".to_string()))
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Level({}x{}, {} tiles, {:?} Compression, {:?} Predictor, {}-bit {:?})",
            self.dimensions.0,
            self.dimensions.1,
            self.offsets.len(),
            self.compression,
            self.predictor,
            self.bits_per_sample,
            self.sample_format,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(compression: Compression) -> Level {
        Level {
            dimensions: (5, 3),
            tile_width: 4,
            tile_height: 2,
            compression,
            predictor: Predictor::No,
            bits_per_sample: 16,
            samples_per_pixel: 1,
            sample_format: SampleFormat::Unsigned,
            planar: PlanarConfiguration::Chunky,
            endian: Endian::Big,
            offsets: vec![0, 16, 32, 48],
            byte_counts: vec![16; 4],
        }
    }

    #[test]
    fn tile_grid_covers_partial_tiles() {
        let level = level(Compression::Uncompressed);
        assert_eq!((level.col_count(), level.row_count()), (2, 2));
        assert_eq!(level.tile_at_pixel(4, 2), Some((3, 0, 0)));
        assert_eq!(level.tile_at_pixel(3, 1), Some((0, 3, 1)));
        assert_eq!(level.tile_at_pixel(5, 0), None);
        assert_eq!(level.tile_byte_range(1).unwrap(), (16, 32));
        assert!(matches!(
            level.tile_byte_range(4),
            Err(CogError::TileIndexOutOfRange(4, 3))
        ));
    }

    #[test]
    fn overflowing_tile_range_is_an_error() {
        let mut level = level(Compression::Uncompressed);
        level.offsets[2] = u64::MAX - 4;
        assert!(matches!(
            level.tile_byte_range(2),
            Err(CogError::BadTiff(TiffError::BadTag(TagId::TileByteCounts)))
        ));
    }

    #[test]
    fn extracts_big_endian_u16_tile() {
        let level = level(Compression::Deflate);
        let values: Vec<u16> = (0..8).map(|v| v * 1000).collect();
        let raw = Endian::Big.encode_all(&values);
        let packed = Compression::Deflate.encode(&raw).unwrap();
        let raster = level.extract_tile_from_bytes(&packed).unwrap();
        assert_eq!(raster.dimensions, (4, 2));
        assert_eq!(raster.get(0, 3, 1), Some(7000.0));
    }

    #[test]
    fn short_tile_is_an_error() {
        let level = level(Compression::Uncompressed);
        assert!(level.extract_tile_from_bytes(&[0; 10]).is_err());
    }
}
