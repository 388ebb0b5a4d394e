//! Band combination previews and cached thumbnails.

use crate::assets::BandResolver;
use crate::bands::{Band, BandCombinationPreset, Sensor};
use crate::catalog::SceneRecord;
use crate::clip::{clip, PixelBudget};
use crate::config::RenderConfig;
use crate::error::SceneResult;
use crate::geo::MapExtent;
use crate::raster::{to_byte, Raster, RasterError, RasterTile, Stretch};
use tracing::*;

#[cfg(feature = "image")]
pub use thumbnail::{cached_thumbnail, render_thumbnail, thumbnail_file_name, ThumbnailOptions};

/// Stretch and output grid limit of a render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub stretch: Stretch,
    pub budget: PixelBudget,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::preview(&RenderConfig::default())
    }
}

impl RenderOptions {
    pub fn preview(config: &RenderConfig) -> Self {
        Self {
            stretch: config.stretch,
            budget: config.preview_budget,
        }
    }

    /// Same stretch, larger budget for layers added to the map.
    pub fn load(config: &RenderConfig) -> Self {
        Self {
            stretch: config.stretch,
            budget: config.load_budget,
        }
    }
}

/// Clip `bands` of a scene onto one shared output grid.
///
/// The first band is clipped to `extent`, the others are resampled onto its
/// window. Every band must have an asset before anything is read.
pub async fn read_bands(
    resolver: &dyn BandResolver,
    scene: &SceneRecord,
    bands: &[Band],
    extent: &MapExtent,
    budget: PixelBudget,
) -> SceneResult<Vec<RasterTile>> {
    for band in bands {
        scene.band_href(*band)?;
    }

    let mut tiles: Vec<RasterTile> = Vec::with_capacity(bands.len());
    for band in bands {
        let source = resolver.open_band(scene, *band).await?;
        let tile = match tiles.first() {
            None => clip(source.as_ref(), extent, budget).await?,
            Some(first) => source.read_window(first.extent(), first.dimensions()).await?,
        };
        debug!("Read {band} of {}: {tile}", scene.id);
        tiles.push(tile);
    }
    Ok(tiles)
}

/// Three channel 0..=255 render of `preset` over `extent`.
///
/// Nodata pixels are 0 in every channel.
pub async fn render_preview(
    resolver: &dyn BandResolver,
    scene: &SceneRecord,
    preset: BandCombinationPreset,
    extent: &MapExtent,
    options: &RenderOptions,
) -> SceneResult<RasterTile> {
    info!("Rendering {} preview of {}", preset.label(), scene.id);
    let tiles = read_bands(resolver, scene, &preset.bands(), extent, options.budget).await?;
    let Some(first) = tiles.first() else {
        return Err(RasterError::NoBands.into());
    };
    let (dimensions, window) = (first.dimensions(), *first.extent());

    let channels = tiles
        .iter()
        .map(|tile| stretch_channel(tile, scene.sensor, options.stretch))
        .collect::<Result<Vec<_>, _>>()?;
    let raster = Raster::new(dimensions, channels)?;
    Ok(RasterTile::new(raster, window, None))
}

/// Stretch the first band of `tile` onto 0..=255 using only valid pixels.
pub fn stretch_channel(
    tile: &RasterTile,
    sensor: Sensor,
    stretch: Stretch,
) -> Result<Vec<f32>, RasterError> {
    let band = tile.band(0).ok_or(RasterError::NoBands)?;
    let values: Vec<Option<f32>> = band
        .iter()
        .map(|&v| {
            tile.is_valid(v).then(|| {
                if stretch.needs_reflectance() {
                    sensor.reflectance(v)
                } else {
                    v
                }
            })
        })
        .collect();
    let valid: Vec<f32> = values.iter().flatten().copied().collect();
    let range = stretch.range(&valid);
    trace!("Stretch range {range:?} from {} valid pixels", valid.len());
    Ok(values
        .iter()
        .map(|v| v.map_or(0.0, |v| to_byte(v, range) as f32))
        .collect())
}

#[cfg(feature = "image")]
mod thumbnail {
    use super::{render_preview, RenderOptions};
    use crate::assets::BandResolver;
    use crate::bands::{BandCombinationPreset, SensorFamily};
    use crate::catalog::SceneRecord;
    use crate::clip::PixelBudget;
    use crate::config::SceneBrowserConfig;
    use crate::error::SceneResult;
    use crate::geo::{MapExtent, Transformer, WEB_MERCATOR, WGS84};
    use crate::raster::{RasterError, Stretch};
    use image::{ImageFormat, Rgb, RgbImage};
    use imageproc::drawing::draw_filled_circle_mut;
    use std::io::Cursor;
    use std::path::{Path, PathBuf};
    use tracing::*;

    const MARKER_RADIUS: i32 = 6;
    const MARKER_OUTLINE: i32 = 2;
    const MARKER_FILL: Rgb<u8> = Rgb([255, 255, 0]);
    const MARKER_EDGE: Rgb<u8> = Rgb([0, 0, 0]);

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct ThumbnailOptions {
        pub size_px: u32,
        pub buffer_meters: f64,
        pub stretch: Stretch,
    }

    impl Default for ThumbnailOptions {
        fn default() -> Self {
            Self::from_config(&SceneBrowserConfig::default())
        }
    }

    impl ThumbnailOptions {
        pub fn from_config(config: &SceneBrowserConfig) -> Self {
            Self {
                size_px: config.render.thumbnail_px,
                buffer_meters: config.aoi.thumbnail_buffer_m,
                stretch: config.render.stretch,
            }
        }
    }

    /// Cache key of a thumbnail, stable across runs.
    ///
    /// `thumb_{s2|ls}_{preset}_{lon}_{lat}_{id}.png` with coordinates rounded to
    /// five decimals, `-` written as `m` and `.` as `p`.
    pub fn thumbnail_file_name(
        scene: &SceneRecord,
        preset: BandCombinationPreset,
        point: (f64, f64),
    ) -> String {
        let kind = match scene.sensor.family() {
            SensorFamily::Sentinel2 => "s2",
            SensorFamily::Landsat => "ls",
        };
        let coord = |v: f64| format!("{v:.5}").replace('-', "m").replace('.', "p");
        let id: String = scene
            .id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!(
            "thumb_{kind}_{}_{}_{}_{id}.png",
            preset.key(),
            coord(point.0),
            coord(point.1)
        )
    }

    /// Preview over the thumbnail buffer around `point` with a location marker.
    pub async fn render_thumbnail(
        resolver: &dyn BandResolver,
        scene: &SceneRecord,
        preset: BandCombinationPreset,
        point: (f64, f64),
        options: &ThumbnailOptions,
    ) -> SceneResult<RgbImage> {
        let (lon, lat) = point;
        let aoi = MapExtent::around_point(lon, lat, options.buffer_meters)?.reproject(WEB_MERCATOR)?;
        let render = RenderOptions {
            stretch: options.stretch,
            budget: PixelBudget::MaxDimension(options.size_px),
        };
        let tile = render_preview(resolver, scene, preset, &aoi, &render).await?;
        let mut img = tile.raster().to_rgb8()?;

        let (x, y) = Transformer::new(WGS84, WEB_MERCATOR)?.transform(lon, lat)?;
        let extent = tile.extent();
        let col = (x - extent.min_x()) / extent.width() * img.width() as f64;
        let row = (extent.max_y() - y) / extent.height() * img.height() as f64;
        draw_marker(&mut img, (col.round() as i32, row.round() as i32));
        Ok(img)
    }

    pub fn draw_marker(img: &mut RgbImage, center: (i32, i32)) {
        draw_filled_circle_mut(img, center, MARKER_RADIUS + MARKER_OUTLINE, MARKER_EDGE);
        draw_filled_circle_mut(img, center, MARKER_RADIUS, MARKER_FILL);
    }

    /// Path of the thumbnail PNG in `cache_dir`, rendering it only when missing.
    pub async fn cached_thumbnail(
        resolver: &dyn BandResolver,
        cache_dir: &Path,
        scene: &SceneRecord,
        preset: BandCombinationPreset,
        point: (f64, f64),
        options: &ThumbnailOptions,
    ) -> SceneResult<PathBuf> {
        let path = cache_dir.join(thumbnail_file_name(scene, preset, point));
        if tokio::fs::try_exists(&path).await? {
            debug!("Reusing thumbnail {}", path.display());
            return Ok(path);
        }

        let img = render_thumbnail(resolver, scene, preset, point, options).await?;
        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, ImageFormat::Png)
            .map_err(RasterError::from)?;
        tokio::fs::create_dir_all(cache_dir).await?;
        tokio::fs::write(&path, png.into_inner()).await?;
        info!("Wrote thumbnail {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(values: Vec<f32>, nodata: Option<f32>) -> RasterTile {
        let n = values.len() as u32;
        let raster = Raster::new((n, 1), vec![values]).unwrap();
        let extent = MapExtent::new(32618, 0.0, 0.0, n as f64, 1.0).unwrap();
        RasterTile::new(raster, extent, nodata)
    }

    #[test]
    fn nodata_renders_black() {
        let t = tile(vec![0.0, 100.0, 200.0, f32::NAN], Some(0.0));
        let out = stretch_channel(&t, Sensor::Sentinel2, Stretch::default()).unwrap();
        // Fewer than 100 valid pixels: min/max of the valid ones
        assert_eq!(out, vec![0.0, 0.0, 255.0, 0.0]);
    }

    #[test]
    fn reflectance_ceiling_scales_digital_numbers() {
        let t = tile(vec![0.0, 1000.0, 3000.0, 6000.0], None);
        let out = stretch_channel(&t, Sensor::Sentinel2, Stretch::reflectance_ceiling()).unwrap();
        assert_eq!(out, vec![0.0, 85.0, 255.0, 255.0]);
    }

    #[test]
    fn flat_channel_does_not_divide_by_zero() {
        let t = tile(vec![7.0; 4], None);
        let out = stretch_channel(&t, Sensor::Landsat8, Stretch::default()).unwrap();
        assert!(out.iter().all(|v| *v == 0.0));
    }

    #[cfg(feature = "image")]
    #[test]
    fn thumbnail_names_are_stable() {
        use chrono::{TimeZone, Utc};
        use std::collections::BTreeMap;

        let scene = SceneRecord {
            id: "LC09_L2SP_007066_20240110_02_T1".to_string(),
            sensor: Sensor::Landsat9,
            acquired: Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap(),
            footprint: vec![],
            cloud_cover: None,
            collection: "landsat-c2-l2".to_string(),
            assets: BTreeMap::new(),
        };
        let name = thumbnail_file_name(&scene, BandCombinationPreset::Infrared, (-74.56, -9.08));
        assert_eq!(
            name,
            "thumb_ls_infrared_m74p56000_m9p08000_LC09_L2SP_007066_20240110_02_T1.png"
        );
    }

    #[cfg(feature = "image")]
    #[test]
    fn marker_is_yellow_with_black_edge() {
        let mut img = image::RgbImage::new(32, 32);
        thumbnail::draw_marker(&mut img, (16, 16));
        assert_eq!(img.get_pixel(16, 16), &image::Rgb([255, 255, 0]));
        assert_eq!(img.get_pixel(16 + 7, 16), &image::Rgb([0, 0, 0]));
        assert_eq!(img.get_pixel(16, 16 - 5), &image::Rgb([255, 255, 0]));
    }
}
