use crate::error::{SceneError, SceneResult};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

/// Point transformer between two EPSG codes.
///
/// proj4rs works in radians for geographic systems, callers always use degrees.
#[derive(Clone, Debug)]
pub struct Transformer {
    from: Proj,
    to: Proj,
    identity: bool,
}

impl Transformer {
    pub fn new(from_epsg: u16, to_epsg: u16) -> SceneResult<Self> {
        Ok(Self {
            from: proj_from_epsg(from_epsg)?,
            to: proj_from_epsg(to_epsg)?,
            identity: from_epsg == to_epsg,
        })
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    pub fn transform(&self, x: f64, y: f64) -> SceneResult<(f64, f64)> {
        if self.identity {
            return Ok((x, y));
        }
        let mut point = if self.from.is_latlong() {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        transform(&self.from, &self.to, &mut point)
            .map_err(|e| SceneError::Projection(format!("{e:?}")))?;
        if self.to.is_latlong() {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }
}

fn proj_from_epsg(epsg: u16) -> SceneResult<Proj> {
    Proj::from_epsg_code(epsg).map_err(|e| SceneError::Projection(format!("EPSG:{epsg}: {e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wgs84_to_utm_and_back() {
        let forward = Transformer::new(4326, 32618).unwrap();
        let (x, y) = forward.transform(-75.0, 10.0).unwrap();
        // Central meridian of zone 18
        assert!((x - 500_000.0).abs() < 1.0);
        assert!(y > 1_000_000.0 && y < 1_200_000.0);

        let back = Transformer::new(32618, 4326).unwrap();
        let (lon, lat) = back.transform(x, y).unwrap();
        assert!((lon + 75.0).abs() < 1e-6);
        assert!((lat - 10.0).abs() < 1e-6);
    }

    #[test]
    fn same_crs_is_identity() {
        let t = Transformer::new(32618, 32618).unwrap();
        assert!(t.is_identity());
        assert_eq!(t.transform(1.5, 2.5).unwrap(), (1.5, 2.5));
    }
}
