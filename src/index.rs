use crate::assets::BandResolver;
use crate::bands::{Sensor, SpectralIndexFormula};
use crate::catalog::SceneRecord;
use crate::error::SceneResult;
use crate::geo::MapExtent;
use crate::preview::{read_bands, RenderOptions};
use crate::raster::{Raster, RasterError, RasterTile};
use tracing::*;

/// Normalised difference `(A - B) / (A + B)` of two reflectance bands.
///
/// Zero where either input is invalid, where `A + B` is zero, or where the
/// result is not finite. Clamped to `[-1, 1]`.
pub fn normalized_difference(a: &RasterTile, b: &RasterTile, sensor: Sensor) -> SceneResult<Raster> {
    if a.dimensions() != b.dimensions() {
        return Err(RasterError::DimensionMismatch {
            expected: a.dimensions(),
            actual: b.dimensions(),
        }
        .into());
    }
    let (band_a, band_b) = match (a.band(0), b.band(0)) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(RasterError::NoBands.into()),
    };

    let values = band_a
        .iter()
        .zip(band_b)
        .map(|(&va, &vb)| {
            if !a.is_valid(va) || !b.is_valid(vb) {
                return 0.0;
            }
            let (ra, rb) = (sensor.reflectance(va), sensor.reflectance(vb));
            let sum = ra + rb;
            if sum == 0.0 {
                return 0.0;
            }
            let value = (ra - rb) / sum;
            if value.is_finite() {
                value.clamp(-1.0, 1.0)
            } else {
                0.0
            }
        })
        .collect();
    Ok(Raster::new(a.dimensions(), vec![values])?)
}

/// Single band index tile over `extent`, both inputs on the grid of band A.
pub async fn compute_index(
    resolver: &dyn BandResolver,
    scene: &SceneRecord,
    formula: SpectralIndexFormula,
    extent: &MapExtent,
    options: &RenderOptions,
) -> SceneResult<RasterTile> {
    let (band_a, band_b) = formula.bands();
    info!("Computing {} of {}", formula.label(), scene.id);
    let tiles = read_bands(resolver, scene, &[band_a, band_b], extent, options.budget).await?;
    let [a, b] = tiles.as_slice() else {
        return Err(RasterError::NoBands.into());
    };
    let raster = normalized_difference(a, b, scene.sensor)?;
    Ok(RasterTile::new(raster, *a.extent(), None))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(values: Vec<f32>) -> RasterTile {
        let n = values.len() as u32;
        let raster = Raster::new((n, 1), vec![values]).unwrap();
        let extent = MapExtent::new(32618, 0.0, 0.0, n as f64, 1.0).unwrap();
        RasterTile::new(raster, extent, Some(0.0))
    }

    #[test]
    fn sentinel_ndvi() {
        let nir = tile(vec![4000.0, 1000.0]);
        let red = tile(vec![1000.0, 1000.0]);
        let out = normalized_difference(&nir, &red, Sensor::Sentinel2).unwrap();
        assert!((out.bands[0][0] - 0.6).abs() < 1e-6);
        assert_eq!(out.bands[0][1], 0.0);
    }

    #[test]
    fn zero_sum_is_zero() {
        let a = tile(vec![1000.0]);
        let b = tile(vec![-1000.0]);
        let out = normalized_difference(&a, &b, Sensor::Sentinel2).unwrap();
        assert_eq!(out.bands[0], vec![0.0]);
    }

    #[test]
    fn nodata_inputs_are_zero() {
        let a = tile(vec![0.0, f32::NAN, 3000.0]);
        let b = tile(vec![1000.0, 1000.0, 0.0]);
        let out = normalized_difference(&a, &b, Sensor::Sentinel2).unwrap();
        assert_eq!(out.bands[0], vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn landsat_results_are_clamped() {
        // Negative reflectance in B pushes the ratio past 1
        let a = tile(vec![20_000.0]);
        let b = tile(vec![1.0]);
        let out = normalized_difference(&a, &b, Sensor::Landsat8).unwrap();
        assert_eq!(out.bands[0], vec![1.0]);
    }

    #[test]
    fn mismatched_grids_are_rejected() {
        let a = tile(vec![1.0, 2.0]);
        let b = tile(vec![1.0]);
        assert!(normalized_difference(&a, &b, Sensor::Sentinel2).is_err());
    }
}
