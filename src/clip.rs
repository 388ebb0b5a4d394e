//! Clip raster sources to a map extent on an output grid.

use crate::error::{SceneError, SceneResult};
use crate::geo::{MapExtent, Transformer};
use crate::raster::{Raster, RasterTile};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::*;

// Fraction of a pixel treated as on the grid line when snapping
const SNAP_EPSILON: f64 = 1e-6;

/// Upper bound on the output grid of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelBudget {
    /// Longest side in pixels
    MaxDimension(u32),
    MaxMegapixels(f64),
}

impl PixelBudget {
    /// Rejects budgets that would collapse every clip to a single pixel.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            PixelBudget::MaxDimension(0) => Err("max_dimension must be positive".to_string()),
            PixelBudget::MaxMegapixels(mp) if !mp.is_finite() || mp <= 0.0 => {
                Err(format!("max_megapixels {mp} must be a positive number"))
            }
            _ => Ok(()),
        }
    }

    /// Output dimensions for a window holding `native` source pixels.
    ///
    /// Keeps the aspect ratio, never upsamples and never goes below 1x1.
    pub fn fit(&self, native: (f64, f64)) -> (u32, u32) {
        let (w, h) = (native.0.max(1.0), native.1.max(1.0));
        let (width, height) = match *self {
            PixelBudget::MaxDimension(px) => {
                let scale = (px.max(1) as f64 / w.max(h)).min(1.0);
                (w * scale, h * scale)
            }
            PixelBudget::MaxMegapixels(mp) => {
                let ar = w / h;
                let height = ((mp * 1e6).min(w * h) / ar).sqrt();
                (ar * height, height)
            }
        };
        (
            (width.round() as u32).max(1),
            (height.round() as u32).max(1),
        )
    }
}

/// Anything that can be resampled onto an output grid.
pub trait RasterSource: Send + Sync {
    /// Extent in the source's own CRS.
    fn native_extent(&self) -> MapExtent;

    /// Full resolution pixel dimensions.
    fn native_dimensions(&self) -> (u32, u32);

    /// Nearest-neighbour resample of `window` onto `dimensions` pixels.
    ///
    /// The tile's extent is exactly `window`; pixels outside the source are nodata.
    fn read_window<'a>(
        &'a self,
        window: &'a MapExtent,
        dimensions: (u32, u32),
    ) -> BoxFuture<'a, SceneResult<RasterTile>>;
}

/// Clip `source` to `extent`, returning a tile in the CRS of `extent`.
///
/// Fails with `EmptyExtent` when nothing of the source remains.
pub async fn clip(
    source: &dyn RasterSource,
    extent: &MapExtent,
    budget: PixelBudget,
) -> SceneResult<RasterTile> {
    let native = source.native_extent();
    let (cols, rows) = source.native_dimensions();
    let source_in_request = native.reproject(extent.epsg)?;
    let window = extent
        .intersection(&source_in_request)
        .ok_or(SceneError::EmptyExtent)?;

    let (window, native_pixels) = if native.epsg == extent.epsg {
        let (window, (w, h)) = snap_to_grid(&native, (cols, rows), &window)?;
        (window, (w as f64, h as f64))
    } else {
        let w = cols as f64 * window.width() / source_in_request.width();
        let h = rows as f64 * window.height() / source_in_request.height();
        (window, (w.round(), h.round()))
    };

    let dimensions = budget.fit(native_pixels);
    debug!(
        "Clipping {window} at {}x{} (native {}x{})",
        dimensions.0, dimensions.1, native_pixels.0, native_pixels.1
    );
    source.read_window(&window, dimensions).await
}

/// Shrink `window` to whole source pixels, returning it with its pixel count.
fn snap_to_grid(
    native: &MapExtent,
    dimensions: (u32, u32),
    window: &MapExtent,
) -> SceneResult<(MapExtent, (u32, u32))> {
    let px = native.width() / dimensions.0 as f64;
    let py = native.height() / dimensions.1 as f64;

    let col0 = ((window.min_x() - native.min_x()) / px - SNAP_EPSILON).ceil().max(0.0);
    let col1 = ((window.max_x() - native.min_x()) / px + SNAP_EPSILON)
        .floor()
        .min(dimensions.0 as f64);
    let row0 = ((native.max_y() - window.max_y()) / py - SNAP_EPSILON).ceil().max(0.0);
    let row1 = ((native.max_y() - window.min_y()) / py + SNAP_EPSILON)
        .floor()
        .min(dimensions.1 as f64);
    if col1 <= col0 || row1 <= row0 {
        return Err(SceneError::EmptyExtent);
    }

    let snapped = MapExtent::new(
        native.epsg,
        native.min_x() + col0 * px,
        native.max_y() - row1 * py,
        native.min_x() + col1 * px,
        native.max_y() - row0 * py,
    )?;
    Ok((snapped, ((col1 - col0) as u32, (row1 - row0) as u32)))
}

/// Centre of every output pixel, row-major, transformed into `to_epsg`.
///
/// Points that fail to transform are `None`.
pub(crate) fn grid_positions(
    window: &MapExtent,
    dimensions: (u32, u32),
    to_epsg: u16,
) -> SceneResult<Vec<Option<(f64, f64)>>> {
    let transformer = Transformer::new(window.epsg, to_epsg)?;
    let dx = window.width() / dimensions.0 as f64;
    let dy = window.height() / dimensions.1 as f64;
    let mut positions = Vec::with_capacity(dimensions.0 as usize * dimensions.1 as usize);
    for j in 0..dimensions.1 {
        let y = window.max_y() - dy * (j as f64 + 0.5);
        for i in 0..dimensions.0 {
            let x = window.min_x() + dx * (i as f64 + 0.5);
            positions.push(
                transformer
                    .transform(x, y)
                    .ok()
                    .filter(|(u, v)| u.is_finite() && v.is_finite()),
            );
        }
    }
    Ok(positions)
}

impl RasterSource for RasterTile {
    fn native_extent(&self) -> MapExtent {
        *self.extent()
    }

    fn native_dimensions(&self) -> (u32, u32) {
        self.dimensions()
    }

    fn read_window<'a>(
        &'a self,
        window: &'a MapExtent,
        dimensions: (u32, u32),
    ) -> BoxFuture<'a, SceneResult<RasterTile>> {
        async move {
            let fill = self.nodata().unwrap_or(f32::NAN);
            let positions = grid_positions(window, dimensions, self.extent().epsg)?;
            let bands = (0..self.band_count())
                .map(|band| {
                    positions
                        .iter()
                        .map(|p| {
                            p.and_then(|(x, y)| self.sample(band, x, y))
                                .unwrap_or(fill)
                        })
                        .collect()
                })
                .collect();
            let raster = Raster::new(dimensions, bands)?;
            Ok(RasterTile::new(raster, *window, self.nodata()))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::WGS84;

    const UTM: u16 = 32618;

    // 10x10 pixels of 10 m, value = column + 10 * row
    fn source() -> RasterTile {
        let values = (0..100).map(|v| v as f32).collect();
        let raster = Raster::new((10, 10), vec![values]).unwrap();
        let extent = MapExtent::new(UTM, 500_000.0, 1_000_000.0, 500_100.0, 1_000_100.0).unwrap();
        RasterTile::new(raster, extent, Some(-1.0))
    }

    fn utm(a: f64, b: f64, c: f64, d: f64) -> MapExtent {
        MapExtent::new(UTM, a, b, c, d).unwrap()
    }

    #[test]
    fn megapixel_budget_keeps_aspect() {
        let (w, h) = PixelBudget::MaxMegapixels(1.0).fit((4000.0, 2000.0));
        assert!((w as f64 / h as f64 - 2.0).abs() < 0.01);
        assert!(w * h <= 1_000_100);
        assert_eq!(PixelBudget::MaxMegapixels(1.0).fit((10.0, 5.0)), (10, 5));
    }

    #[test]
    fn dimension_budget_never_goes_below_one_pixel() {
        assert_eq!(PixelBudget::MaxDimension(100).fit((1000.0, 10.0)), (100, 1));
        assert_eq!(PixelBudget::MaxDimension(0).fit((10.0, 10.0)), (1, 1));
    }

    #[tokio::test]
    async fn window_is_snapped_inward() {
        let src = source();
        let request = utm(500_015.0, 1_000_012.0, 500_047.0, 1_000_300.0);
        let tile = clip(&src, &request, PixelBudget::MaxDimension(1000))
            .await
            .unwrap();
        assert_eq!(
            tile.extent().region.as_tuple(),
            (500_020.0, 1_000_020.0, 500_040.0, 1_000_100.0)
        );
        assert_eq!(tile.dimensions(), (2, 8));
        assert!(request.contains(tile.extent()));
        assert!(src.extent().contains(tile.extent()));
        // Top-left output pixel is source column 2, row 0
        assert_eq!(tile.raster().get(0, 0, 0), Some(2.0));
    }

    #[tokio::test]
    async fn clipping_is_idempotent() {
        let src = source();
        let request = utm(500_015.0, 1_000_012.0, 500_083.0, 1_000_077.0);
        let once = clip(&src, &request, PixelBudget::MaxDimension(1000))
            .await
            .unwrap();
        let twice = clip(&src, once.extent(), PixelBudget::MaxDimension(1000))
            .await
            .unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn disjoint_extent_is_empty() {
        let err = clip(&source(), &utm(0.0, 0.0, 10.0, 10.0), PixelBudget::MaxDimension(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SceneError::EmptyExtent));
    }

    #[tokio::test]
    async fn sub_pixel_overlap_is_empty() {
        let sliver = utm(500_011.0, 1_000_011.0, 500_019.0, 1_000_019.0);
        let err = clip(&source(), &sliver, PixelBudget::MaxDimension(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SceneError::EmptyExtent));
    }

    #[tokio::test]
    async fn budget_reduces_output() {
        let src = source();
        let tile = clip(&src, src.extent(), PixelBudget::MaxDimension(5))
            .await
            .unwrap();
        assert_eq!(tile.dimensions(), (5, 5));
        assert_eq!(tile.extent(), src.extent());
    }

    #[tokio::test]
    async fn reprojected_request_stays_inside_both() {
        let src = source();
        let request = src.extent().reproject(WGS84).unwrap();
        let tile = clip(&src, &request, PixelBudget::MaxDimension(50))
            .await
            .unwrap();
        assert_eq!(tile.extent().epsg, WGS84);
        assert!(request.contains(tile.extent()));
        let valid = tile.band(0).unwrap().iter().filter(|v| tile.is_valid(**v)).count();
        assert!(valid > 0);
    }
}
