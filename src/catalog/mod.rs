//! Scene search against STAC catalogs.

use crate::bands::{Band, Sensor, SensorFamily};
use crate::error::{SceneError, SceneResult};
use crate::geo::{Location, MapExtent};
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use tracing::*;

mod client;
mod stac;

pub use client::{sign_href, StacClient};
pub use stac::{StacAsset, StacItem, StacItemCollection, StacItemProperties, StacSearchParams};

pub const MAX_LIMIT: u32 = 200;

/// One acquisition returned by a search. Band assets are only references.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRecord {
    pub id: String,
    pub sensor: Sensor,
    pub acquired: DateTime<Utc>,
    /// Lon/lat ring
    pub footprint: Vec<(f64, f64)>,
    pub cloud_cover: Option<f64>,
    pub collection: String,
    /// Asset key to href: URL, `s3://` URI or local path
    pub assets: BTreeMap<String, String>,
}

impl SceneRecord {
    /// Href of the first asset key the sensor uses for `band`.
    pub fn band_href(&self, band: Band) -> SceneResult<&str> {
        self.sensor
            .asset_keys(band)
            .iter()
            .find_map(|key| self.assets.get(*key))
            .map(|href| href.as_str())
            .ok_or_else(|| SceneError::BandUnavailable {
                scene: self.id.clone(),
                band: band.to_string(),
            })
    }

    pub fn footprint_extent(&self) -> SceneResult<MapExtent> {
        let (mut w, mut s, mut e, mut n) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for (lon, lat) in &self.footprint {
            w = w.min(*lon);
            s = s.min(*lat);
            e = e.max(*lon);
            n = n.max(*lat);
        }
        MapExtent::lat_lon_deg(w, s, e, n)
    }

    /// `YYYY-MM-DD`
    pub fn date_label(&self) -> String {
        self.acquired.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for SceneRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.date_label(), self.id, self.sensor)
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// STAC datetime interval covering both days completely.
    pub fn stac_interval(&self) -> String {
        format!(
            "{}T00:00:00Z/{}T23:59:59Z",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneQuery {
    pub family: SensorFamily,
    pub location: Location,
    pub dates: DateRange,
    /// Maximum cloud cover percent
    pub max_cloud_cover: Option<f64>,
    pub limit: u32,
}

impl SceneQuery {
    pub fn validate(&self) -> SceneResult<()> {
        if self.dates.start > self.dates.end {
            return Err(SceneError::InvalidQuery(format!(
                "start date {} is after end date {}",
                self.dates.start, self.dates.end
            )));
        }
        self.location.validate()?;
        if let Some(cloud) = self.max_cloud_cover {
            if !(0.0..=100.0).contains(&cloud) {
                return Err(SceneError::InvalidQuery(format!(
                    "cloud cover {cloud} outside 0..=100"
                )));
            }
        }
        if !(1..=MAX_LIMIT).contains(&self.limit) {
            return Err(SceneError::InvalidQuery(format!(
                "limit {} outside 1..={MAX_LIMIT}",
                self.limit
            )));
        }
        Ok(())
    }

    pub fn to_stac(&self, buffer_meters: f64) -> SceneResult<StacSearchParams> {
        let aoi = self.location.search_extent(buffer_meters)?;
        let (w, s, e, n) = aoi.region.as_tuple();
        Ok(StacSearchParams {
            collections: vec![self.family.collection().to_string()],
            bbox: [w, s, e, n],
            datetime: self.dates.stac_interval(),
            limit: self.limit,
            query: self
                .max_cloud_cover
                .map(|max| json!({"eo:cloud_cover": {"lt": max}})),
        })
    }
}

/// Source of STAC items, one request per search.
pub trait SceneCatalog: Send + Sync {
    fn fetch<'a>(
        &'a self,
        family: SensorFamily,
        params: &'a StacSearchParams,
    ) -> BoxFuture<'a, SceneResult<Vec<StacItem>>>;
}

/// Search a catalog, newest acquisition first.
///
/// The query is validated before any request is made.
pub async fn search(
    catalog: &dyn SceneCatalog,
    query: &SceneQuery,
    buffer_meters: f64,
) -> SceneResult<Vec<SceneRecord>> {
    query.validate()?;
    let params = query.to_stac(buffer_meters)?;
    info!(
        "Searching {} from {} bbox {:?}",
        query.family, params.datetime, params.bbox
    );

    let items = catalog.fetch(query.family, &params).await?;
    let total = items.len();
    let mut scenes: Vec<SceneRecord> = items
        .into_iter()
        .filter_map(|item| match scene_from_item(item, query.family) {
            Ok(scene) => Some(scene),
            Err(reason) => {
                warn!("Skipping STAC item: {reason}");
                None
            }
        })
        .collect();
    sort_scenes(&mut scenes);
    debug!("Kept {}/{total} items", scenes.len());
    Ok(scenes)
}

/// Acquisition descending, id ascending on ties.
pub fn sort_scenes(scenes: &mut [SceneRecord]) {
    scenes.sort_by(|a, b| b.acquired.cmp(&a.acquired).then_with(|| a.id.cmp(&b.id)));
}

pub fn scene_from_item(item: StacItem, family: SensorFamily) -> Result<SceneRecord, String> {
    let time = item
        .acquisition_time()
        .ok_or_else(|| format!("{} has no datetime", item.id))?;
    let acquired = DateTime::parse_from_rfc3339(time)
        .map_err(|e| format!("{} has bad datetime {time:?}: {e}", item.id))?
        .with_timezone(&Utc);
    let footprint = item
        .footprint()
        .ok_or_else(|| format!("{} has no geometry or bbox", item.id))?;
    let collection = item
        .collection
        .clone()
        .unwrap_or_else(|| family.collection().to_string());
    let sensor = item
        .properties
        .platform
        .as_deref()
        .and_then(Sensor::from_platform)
        .or_else(|| Sensor::from_collection(&collection))
        .unwrap_or(match family {
            SensorFamily::Sentinel2 => Sensor::Sentinel2,
            SensorFamily::Landsat => Sensor::Landsat8,
        });

    Ok(SceneRecord {
        sensor,
        acquired,
        footprint,
        cloud_cover: item.properties.cloud_cover,
        collection,
        assets: item
            .assets
            .into_iter()
            .map(|(key, asset)| (key, asset.href))
            .collect(),
        id: item.id,
    })
}
