use super::Raster;
use crate::geo::MapExtent;
use std::fmt::Display;

/// Georeferenced raster: pixel grid, extent in a CRS, optional nodata value.
///
/// Pixel `(0, 0)` is the north-west corner of `extent`.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterTile {
    raster: Raster,
    extent: MapExtent,
    nodata: Option<f32>,
}

impl RasterTile {
    pub fn new(raster: Raster, extent: MapExtent, nodata: Option<f32>) -> Self {
        Self {
            raster,
            extent,
            nodata,
        }
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn extent(&self) -> &MapExtent {
        &self.extent
    }

    pub fn nodata(&self) -> Option<f32> {
        self.nodata
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn band_count(&self) -> usize {
        self.raster.band_count()
    }

    pub fn band(&self, index: usize) -> Option<&[f32]> {
        self.raster.bands.get(index).map(|b| b.as_slice())
    }

    /// Map units per pixel along x and y.
    pub fn pixel_size(&self) -> (f64, f64) {
        (
            self.extent.width() / self.width() as f64,
            self.extent.height() / self.height() as f64,
        )
    }

    pub fn is_valid(&self, value: f32) -> bool {
        value.is_finite() && Some(value) != self.nodata
    }

    /// Pixel column and row containing a map coordinate.
    pub fn pixel_at(&self, x: f64, y: f64) -> Option<(u32, u32)> {
        let (px, py) = self.pixel_size();
        let col = ((x - self.extent.min_x()) / px).floor();
        let row = ((self.extent.max_y() - y) / py).floor();
        let in_range = col >= 0.0
            && row >= 0.0
            && col < self.width() as f64
            && row < self.height() as f64;
        in_range.then_some((col as u32, row as u32))
    }

    /// Nearest-neighbour value of `band` at a map coordinate in the tile's CRS.
    pub fn sample(&self, band: usize, x: f64, y: f64) -> Option<f32> {
        let (col, row) = self.pixel_at(x, y)?;
        self.raster.get(band, col, row)
    }
}

impl Display for RasterTile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} over {}", self.raster, self.extent)
    }
}
