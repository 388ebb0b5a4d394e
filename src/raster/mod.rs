use crate::geo::MapExtent;
use std::fmt::Display;
use thiserror::Error;

#[cfg(feature = "image")]
mod image;
mod ops;
mod photometrics;
mod tile;

pub use ops::{percentile_range, to_byte, ColorRamp, Stretch};
pub use photometrics::{PhotometricInterpretation, PlanarConfiguration, SampleFormat};
pub use tile::RasterTile;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("band {band} has {actual} values, expected {expected}")]
    BufferSize {
        band: usize,
        expected: usize,
        actual: usize,
    },
    #[error("raster has no bands")]
    NoBands,
    #[error("{0} not supported")]
    NotSupported(String),
    #[error("raster is {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[cfg(feature = "image")]
    #[error("image error: {0}")]
    Image(#[from] ::image::ImageError),
}

/// Row-major pixel block with one `f32` plane per band.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    pub dimensions: (u32, u32),
    pub bands: Vec<Vec<f32>>,
}

impl Raster {
    pub fn new(dimensions: (u32, u32), bands: Vec<Vec<f32>>) -> Result<Self, RasterError> {
        if bands.is_empty() {
            return Err(RasterError::NoBands);
        }
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        for (band, values) in bands.iter().enumerate() {
            if values.len() != expected {
                return Err(RasterError::BufferSize {
                    band,
                    expected,
                    actual: values.len(),
                });
            }
        }
        Ok(Self { dimensions, bands })
    }

    /// Split pixel-interleaved samples into planes.
    pub fn from_interleaved(
        dimensions: (u32, u32),
        samples: &[f32],
        samples_per_pixel: usize,
    ) -> Result<Self, RasterError> {
        let n = dimensions.0 as usize * dimensions.1 as usize;
        if samples_per_pixel == 0 {
            return Err(RasterError::NoBands);
        }
        if samples.len() < n * samples_per_pixel {
            return Err(RasterError::BufferSize {
                band: 0,
                expected: n * samples_per_pixel,
                actual: samples.len(),
            });
        }
        let bands = (0..samples_per_pixel)
            .map(|s| {
                samples
                    .iter()
                    .skip(s)
                    .step_by(samples_per_pixel)
                    .take(n)
                    .copied()
                    .collect()
            })
            .collect();
        Ok(Self { dimensions, bands })
    }

    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn get(&self, band: usize, x: u32, y: u32) -> Option<f32> {
        if x >= self.dimensions.0 || y >= self.dimensions.1 {
            return None;
        }
        let i = y as usize * self.dimensions.0 as usize + x as usize;
        self.bands.get(band).and_then(|b| b.get(i)).copied()
    }

    pub fn into_tile(self, extent: MapExtent, nodata: Option<f32>) -> RasterTile {
        RasterTile::new(self, extent, nodata)
    }
}

impl Display for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Raster({}x{}, {} bands)",
            self.dimensions.0,
            self.dimensions.1,
            self.bands.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_samples_are_split_into_planes() {
        let samples = [1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0];
        let raster = Raster::from_interleaved((2, 2), &samples, 2).unwrap();
        assert_eq!(raster.bands[0], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(raster.bands[1], vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(raster.get(1, 1, 1), Some(40.0));
        assert_eq!(raster.get(0, 2, 0), None);
    }

    #[test]
    fn band_length_is_checked() {
        let err = Raster::new((2, 2), vec![vec![0.0; 3]]).unwrap_err();
        assert!(matches!(err, RasterError::BufferSize { expected: 4, .. }));
        assert!(matches!(
            Raster::new((2, 2), vec![]),
            Err(RasterError::NoBands)
        ));
    }
}
