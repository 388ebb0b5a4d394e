use super::{Raster, RasterError};
use image::{ImageBuffer, Rgb, RgbImage};

impl Raster {
    /// Three bands already stretched to 0..=255 as an 8-bit RGB image.
    pub fn to_rgb8(&self) -> Result<RgbImage, RasterError> {
        let [r, g, b] = self.bands.as_slice() else {
            return Err(RasterError::NotSupported(format!(
                "RGB image from {} bands",
                self.bands.len()
            )));
        };
        let (width, height) = self.dimensions;
        let byte = |v: f32| if v.is_finite() { v.clamp(0.0, 255.0) as u8 } else { 0 };
        Ok(ImageBuffer::from_fn(width, height, |x, y| {
            let i = (y * width + x) as usize;
            Rgb([byte(r[i]), byte(g[i]), byte(b[i])])
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_conversion_keeps_pixels() {
        let raster = Raster::new(
            (2, 1),
            vec![vec![255.0, 0.0], vec![10.0, f32::NAN], vec![300.0, 1.0]],
        )
        .unwrap();
        let img = raster.to_rgb8().unwrap();
        assert_eq!(img.get_pixel(0, 0), &Rgb([255, 10, 255]));
        assert_eq!(img.get_pixel(1, 0), &Rgb([0, 0, 1]));
        assert_eq!(img.dimensions(), (2, 1));
    }

    #[test]
    fn single_band_is_not_rgb() {
        let raster = Raster::new((1, 1), vec![vec![0.0]]).unwrap();
        assert!(raster.to_rgb8().is_err());
    }
}
