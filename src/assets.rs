//! Band asset resolution: scene band to an opened COG.

use crate::bands::Band;
use crate::catalog::SceneRecord;
use crate::clip::{grid_positions, RasterSource};
use crate::cog::{CloudTiff, DEFAULT_HEADER_BYTES};
use crate::error::{SceneError, SceneResult};
use crate::geo::MapExtent;
use crate::io::{AsyncReadRange, HttpReader};
use crate::raster::{Raster, RasterTile};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::*;

#[cfg(feature = "s3")]
use crate::io::S3Reader;

/// Opens the raster behind one band of a scene.
pub trait BandResolver: Send + Sync {
    fn open_band<'a>(
        &'a self,
        scene: &'a SceneRecord,
        band: Band,
    ) -> BoxFuture<'a, SceneResult<Box<dyn RasterSource>>>;
}

/// Resolves hrefs over HTTP(S), `s3://` or the local filesystem.
#[derive(Debug)]
pub struct AssetResolver {
    http: reqwest::Client,
    header_bytes: usize,
    #[cfg(feature = "s3")]
    s3: tokio::sync::OnceCell<aws_sdk_s3::Client>,
}

impl Default for AssetResolver {
    fn default() -> Self {
        Self::new(reqwest::Client::new(), DEFAULT_HEADER_BYTES)
    }
}

impl AssetResolver {
    pub fn new(http: reqwest::Client, header_bytes: usize) -> Self {
        Self {
            http,
            header_bytes,
            #[cfg(feature = "s3")]
            s3: tokio::sync::OnceCell::new(),
        }
    }

    pub async fn open_href(&self, href: &str) -> SceneResult<CogBand> {
        let reader = self.reader(href).await?;
        CogBand::open(reader, href, self.header_bytes).await
    }

    async fn reader(&self, href: &str) -> SceneResult<Arc<dyn AsyncReadRange>> {
        if href.starts_with("http://") || href.starts_with("https://") {
            let reader =
                HttpReader::new(self.http.clone(), href).map_err(|e| SceneError::asset(href, e))?;
            return Ok(Arc::new(reader));
        }
        if href.starts_with("s3://") {
            return self.s3_reader(href).await;
        }
        let path = href.strip_prefix("file://").unwrap_or(href);
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| SceneError::asset(href, e))?;
        Ok(Arc::new(TokioMutex::new(file)))
    }

    #[cfg(feature = "s3")]
    async fn s3_reader(&self, href: &str) -> SceneResult<Arc<dyn AsyncReadRange>> {
        let (bucket, key) =
            S3Reader::parse_uri(href).ok_or_else(|| SceneError::asset(href, "malformed S3 URI"))?;
        let client = self
            .s3
            .get_or_init(|| async {
                let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(aws_config::Region::from_static("us-west-2"))
                    .load()
                    .await;
                aws_sdk_s3::Client::new(&sdk_config)
            })
            .await;
        Ok(Arc::new(S3Reader::requester_pays(client, bucket, key)))
    }

    #[cfg(not(feature = "s3"))]
    async fn s3_reader(&self, href: &str) -> SceneResult<Arc<dyn AsyncReadRange>> {
        Err(SceneError::asset(href, "built without S3 support"))
    }
}

impl BandResolver for AssetResolver {
    fn open_band<'a>(
        &'a self,
        scene: &'a SceneRecord,
        band: Band,
    ) -> BoxFuture<'a, SceneResult<Box<dyn RasterSource>>> {
        async move {
            let href = scene.band_href(band)?;
            debug!("Opening {band} of {} from {}", scene.id, redact(href));
            let cog = self.open_href(href).await?;
            Ok(Box::new(cog) as Box<dyn RasterSource>)
        }
        .boxed()
    }
}

/// Single band COG as a clip source.
pub struct CogBand {
    cog: CloudTiff,
    reader: Arc<dyn AsyncReadRange>,
    href: String,
    extent: MapExtent,
}

impl CogBand {
    pub async fn open(
        reader: Arc<dyn AsyncReadRange>,
        href: &str,
        header_bytes: usize,
    ) -> SceneResult<Self> {
        let cog = CloudTiff::open_from_reader(reader.as_ref(), header_bytes)
            .await
            .map_err(|e| SceneError::asset(redact(href), e))?;
        let (min_x, min_y, max_x, max_y) = cog.bounds();
        let extent = MapExtent::new(cog.epsg(), min_x, min_y, max_x, max_y)?;
        debug!("{cog}");
        Ok(Self {
            cog,
            reader,
            href: redact(href).to_string(),
            extent,
        })
    }

    pub fn cog(&self) -> &CloudTiff {
        &self.cog
    }
}

impl RasterSource for CogBand {
    fn native_extent(&self) -> MapExtent {
        self.extent
    }

    fn native_dimensions(&self) -> (u32, u32) {
        self.cog.full_dimensions()
    }

    fn read_window<'a>(
        &'a self,
        window: &'a MapExtent,
        dimensions: (u32, u32),
    ) -> BoxFuture<'a, SceneResult<RasterTile>> {
        async move {
            let georef = self.cog.georef();
            let positions: Vec<(f64, f64)> = grid_positions(window, dimensions, self.extent.epsg)?
                .into_iter()
                .map(|p| match p {
                    Some((x, y)) => georef.pixel_from_map(x, y),
                    None => (-1.0, -1.0),
                })
                .collect();

            let native_window = window.reproject(self.extent.epsg)?;
            let downsample = (native_window.width() / georef.pixel_scale.0 / dimensions.0 as f64)
                .min(native_window.height() / georef.pixel_scale.1 / dimensions.1 as f64);

            let mut values = self
                .cog
                .sample_pixels(&self.reader, &positions, downsample)
                .await
                .map_err(|e| SceneError::asset(&self.href, e))?;
            let nodata = self.cog.nodata().map(|v| v as f32);
            if let Some(nodata) = nodata {
                values
                    .iter_mut()
                    .filter(|v| v.is_nan())
                    .for_each(|v| *v = nodata);
            }

            let raster = Raster::new(dimensions, vec![values])?;
            Ok(RasterTile::new(raster, *window, nodata))
        }
        .boxed()
    }
}

// Signed hrefs carry credentials in the query string
fn redact(href: &str) -> &str {
    href.split('?').next().unwrap_or(href)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_drops_query() {
        assert_eq!(redact("https://x/y.tif?sig=secret"), "https://x/y.tif");
        assert_eq!(redact("/data/y.tif"), "/data/y.tif");
    }

    #[tokio::test]
    async fn missing_local_file_is_asset_error() {
        let resolver = AssetResolver::default();
        let err = resolver
            .open_href("/nonexistent/scene/B04.tif")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SceneError::AssetRead { .. }));
    }
}
