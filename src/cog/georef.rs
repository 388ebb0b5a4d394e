// https://docs.ogc.org/is/19-008r4/19-008r4.html#_geotiff_tags_for_coordinate_transformations

use super::{CogError, CogResult};
use crate::tiff::{Ifd, TagId};

pub const GT_MODEL_TYPE: u16 = 1024;
pub const GT_RASTER_TYPE: u16 = 1025;
pub const GEOGRAPHIC_TYPE: u16 = 2048;
pub const PROJECTED_CS_TYPE: u16 = 3072;

pub const MODEL_PROJECTED: u16 = 1;
pub const MODEL_GEOGRAPHIC: u16 = 2;
pub const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Affine north-up georeferencing of the full resolution image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoReference {
    pub epsg: u16,
    /// Map coordinate of the north-west corner of pixel (0, 0).
    pub origin: (f64, f64),
    /// Map units per full resolution pixel, both positive.
    pub pixel_scale: (f64, f64),
}

impl GeoReference {
    pub fn parse(ifd: &Ifd) -> CogResult<Self> {
        let scale: Vec<f64> = ifd
            .get_tag_values(TagId::ModelPixelScale)
            .map_err(|_| CogError::MissingGeoTag(TagId::ModelPixelScale))?;
        let tiepoint: Vec<f64> = ifd
            .get_tag_values(TagId::ModelTiepoint)
            .map_err(|_| CogError::MissingGeoTag(TagId::ModelTiepoint))?;
        let keys: Vec<u16> = ifd
            .get_tag_values(TagId::GeoKeyDirectory)
            .map_err(|_| CogError::MissingGeoTag(TagId::GeoKeyDirectory))?;

        let (&[sx, sy, ..], &[i, j, _, x, y, ..]) = (scale.as_slice(), tiepoint.as_slice()) else {
            return Err(CogError::BadGeoReference(format!(
                "scale {scale:?}, tiepoint {tiepoint:?}"
            )));
        };
        if !sx.is_normal() || !sy.is_normal() || !x.is_finite() || !y.is_finite() {
            return Err(CogError::BadGeoReference(format!(
                "scale ({sx}, {sy}), origin ({x}, {y})"
            )));
        }

        let epsg = epsg_from_geokeys(&keys).ok_or(CogError::MissingEpsg)?;

        Ok(Self {
            epsg,
            origin: (x - i * sx, y + j * sy.abs()),
            pixel_scale: (sx.abs(), sy.abs()),
        })
    }

    /// `(min_x, min_y, max_x, max_y)` of an image with the given dimensions.
    pub fn bounds(&self, dimensions: (u32, u32)) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.origin;
        (
            x0,
            y0 - dimensions.1 as f64 * self.pixel_scale.1,
            x0 + dimensions.0 as f64 * self.pixel_scale.0,
            y0,
        )
    }

    /// Fractional full resolution pixel coordinate of a map coordinate.
    pub fn pixel_from_map(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin.0) / self.pixel_scale.0,
            (self.origin.1 - y) / self.pixel_scale.1,
        )
    }

    /// Key directory values for writing, `geographic` picks the model type.
    pub fn geokey_directory(&self, geographic: bool) -> Vec<u16> {
        let (model, crs_key) = if geographic {
            (MODEL_GEOGRAPHIC, GEOGRAPHIC_TYPE)
        } else {
            (MODEL_PROJECTED, PROJECTED_CS_TYPE)
        };
        vec![
            1, 1, 0, 3, // version, revision, minor, key count
            GT_MODEL_TYPE, 0, 1, model,
            GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
            crs_key, 0, 1, self.epsg,
        ]
    }
}

fn epsg_from_geokeys(keys: &[u16]) -> Option<u16> {
    let count = *keys.get(3)? as usize;
    let entries: Vec<&[u16]> = keys.get(4..)?.chunks_exact(4).take(count).collect();
    // Inline SHORT values only; user-defined 32767 is not an EPSG code
    let find = |id: u16| {
        entries
            .iter()
            .find(|k| k[0] == id && k[1] == 0)
            .map(|k| k[3])
            .filter(|&code| code != 0 && code != 32767)
    };
    find(PROJECTED_CS_TYPE).or_else(|| find(GEOGRAPHIC_TYPE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projected_key_wins() {
        let georef = GeoReference {
            epsg: 32618,
            origin: (0.0, 0.0),
            pixel_scale: (1.0, 1.0),
        };
        let keys = georef.geokey_directory(false);
        assert_eq!(epsg_from_geokeys(&keys), Some(32618));

        let mut both = keys.clone();
        both[3] = 4;
        both.extend_from_slice(&[GEOGRAPHIC_TYPE, 0, 1, 4326]);
        assert_eq!(epsg_from_geokeys(&both), Some(32618));
    }

    #[test]
    fn user_defined_crs_has_no_epsg() {
        let keys = vec![1, 1, 0, 1, PROJECTED_CS_TYPE, 0, 1, 32767];
        assert_eq!(epsg_from_geokeys(&keys), None);
        assert_eq!(epsg_from_geokeys(&[1, 1]), None);
    }

    #[test]
    fn bounds_and_pixels_agree() {
        let georef = GeoReference {
            epsg: 32618,
            origin: (600_000.0, 9_000_000.0),
            pixel_scale: (10.0, 10.0),
        };
        let (min_x, min_y, max_x, max_y) = georef.bounds((100, 50));
        assert_eq!((min_x, min_y, max_x, max_y), (600_000.0, 8_999_500.0, 601_000.0, 9_000_000.0));
        assert_eq!(georef.pixel_from_map(600_015.0, 8_999_975.0), (1.5, 2.5));
    }
}
