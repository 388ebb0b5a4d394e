// https://en.wikipedia.org/wiki/TIFF#TIFF_Compression_Tag
// https://exiftool.org/TagNames/EXIF.html#Compression

use super::{CogError, CogResult};
use crate::tiff::Endian;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use num_enum::{FromPrimitive, IntoPrimitive};
use salzweg::decoder::TiffStyleDecoder;
use std::io::{Read, Write};

#[derive(Debug, PartialEq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum Compression {
    Uncompressed = 1,
    Lzw = 5,
    Jpeg = 7,
    DeflateAdobe = 8,
    PackBits = 32773,
    Deflate = 32946,
    LZMA2 = 34925,
    Zstd = 34926,
    WebP = 34927,

    #[num_enum(default)]
    Unknown = 0x0000,
}

impl Compression {
    pub fn decode(&self, bytes: &[u8]) -> CogResult<Vec<u8>> {
        match self {
            Self::Uncompressed => Ok(bytes.to_vec()),
            Self::Lzw => TiffStyleDecoder::decode_to_vec(bytes)
                .map_err(|e| CogError::Decompress(format!("LZW: {e:?}"))),
            Self::DeflateAdobe | Self::Deflate => {
                let mut buf = vec![];
                ZlibDecoder::new(bytes)
                    .read_to_end(&mut buf)
                    .map_err(|e| CogError::Decompress(format!("deflate: {e}")))?;
                Ok(buf)
            }
            other => Err(CogError::NotSupported(format!("{other:?} compression"))),
        }
    }

    pub fn encode(&self, bytes: &[u8]) -> CogResult<Vec<u8>> {
        match self {
            Self::Uncompressed => Ok(bytes.to_vec()),
            Self::DeflateAdobe | Self::Deflate => {
                let mut encoder = ZlibEncoder::new(vec![], flate2::Compression::default());
                encoder.write_all(bytes)?;
                Ok(encoder.finish()?)
            }
            other => Err(CogError::NotSupported(format!("{other:?} encoding"))),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum Predictor {
    No = 1,
    Horizontal = 2,
    FloatingPoint = 3,

    #[num_enum(default)]
    Unknown = 0x0000,
}

impl Predictor {
    /// Undo the predictor in place on a decompressed tile.
    pub fn predict(
        &self,
        buffer: &mut [u8],
        width: usize,
        bytes_per_sample: usize,
        samples_per_pixel: usize,
        endian: Endian,
    ) -> CogResult<()> {
        match self {
            Self::No => Ok(()),
            Self::Horizontal => {
                let row_bytes = width * samples_per_pixel * bytes_per_sample;
                if row_bytes == 0 {
                    return Ok(());
                }
                for row in buffer.chunks_mut(row_bytes) {
                    match bytes_per_sample {
                        1 => accumulate::<1, u8>(row, samples_per_pixel, endian, u8::wrapping_add),
                        2 => accumulate::<2, u16>(row, samples_per_pixel, endian, u16::wrapping_add),
                        4 => accumulate::<4, u32>(row, samples_per_pixel, endian, u32::wrapping_add),
                        8 => accumulate::<8, u64>(row, samples_per_pixel, endian, u64::wrapping_add),
                        n => {
                            return Err(CogError::NotSupported(format!(
                                "horizontal predictor with {n}-byte samples"
                            )))
                        }
                    }?;
                }
                Ok(())
            }
            other => Err(CogError::NotSupported(format!("{other:?} predictor"))),
        }
    }
}

// Each sample becomes the sum of itself and the same sample of the previous pixel
fn accumulate<const N: usize, T>(
    row: &mut [u8],
    samples_per_pixel: usize,
    endian: Endian,
    add: fn(T, T) -> T,
) -> CogResult<()>
where
    T: eio::FromBytes<N> + eio::ToBytes<N> + Copy,
{
    let stride = N * samples_per_pixel;
    for i in (stride..row.len().saturating_sub(N - 1)).step_by(N) {
        let prev: T = endian.decode(sample_bytes(row, i - stride)?)?;
        let curr: T = endian.decode(sample_bytes(row, i)?)?;
        row[i..i + N].copy_from_slice(&endian.encode(add(curr, prev)));
    }
    Ok(())
}

fn sample_bytes<const N: usize>(row: &[u8], at: usize) -> CogResult<[u8; N]> {
    row[at..at + N]
        .try_into()
        .map_err(|_| CogError::Decompress("short predictor sample".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deflate_round_trip() {
        let data: Vec<u8> = (0..=255).cycle().take(4096).collect();
        let packed = Compression::Deflate.encode(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(Compression::Deflate.decode(&packed).unwrap(), data);
    }

    #[test]
    fn unsupported_compression_is_an_error() {
        assert!(matches!(
            Compression::Jpeg.decode(&[0]),
            Err(CogError::NotSupported(_))
        ));
        assert_eq!(Compression::from(34926u16), Compression::Zstd);
    }

    #[test]
    fn horizontal_predictor_8_bit() {
        let mut row = vec![10, 1, 1, 250, 10];
        Predictor::Horizontal
            .predict(&mut row, 5, 1, 1, Endian::Little)
            .unwrap();
        assert_eq!(row, vec![10, 11, 12, 6, 16]);
    }

    #[test]
    fn horizontal_predictor_16_bit_two_rows() {
        let endian = Endian::Little;
        let mut buf = endian.encode_all(&[1000u16, 5, 5, 2000, 1, 1]);
        Predictor::Horizontal
            .predict(&mut buf, 3, 2, 1, endian)
            .unwrap();
        let values: Vec<u16> = buf
            .chunks_exact(2)
            .map(|c| endian.decode([c[0], c[1]]).unwrap())
            .collect();
        assert_eq!(values, vec![1000, 1005, 1010, 2000, 2001, 2002]);
    }
}
