//! Serde models for STAC Item Search (`POST /search`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StacSearchParams {
    pub collections: Vec<String>,
    /// `[west, south, east, north]`
    pub bbox: [f64; 4],
    pub datetime: String,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(default)]
    pub features: Vec<StacItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    pub id: String,
    #[serde(default)]
    pub geometry: Option<Value>,
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    #[serde(default)]
    pub properties: StacItemProperties,
    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,
    #[serde(default)]
    pub collection: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StacItemProperties {
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub start_datetime: Option<String>,
    #[serde(rename = "eo:cloud_cover", default)]
    pub cloud_cover: Option<f64>,
    #[serde(default)]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    pub href: String,
    #[serde(rename = "type", default)]
    pub media_type: Option<String>,
}

impl StacItem {
    /// Acquisition time string: `datetime`, else `start_datetime`.
    pub fn acquisition_time(&self) -> Option<&str> {
        self.properties
            .datetime
            .as_deref()
            .or(self.properties.start_datetime.as_deref())
    }

    /// Outer ring of the GeoJSON geometry, else the bbox as a rectangle.
    pub fn footprint(&self) -> Option<Vec<(f64, f64)>> {
        self.geometry
            .as_ref()
            .and_then(outer_ring)
            .or_else(|| match self.bbox.as_deref() {
                Some(&[w, s, e, n]) | Some(&[w, s, _, e, n, _]) => {
                    Some(vec![(w, s), (e, s), (e, n), (w, n), (w, s)])
                }
                _ => None,
            })
    }
}

fn outer_ring(geometry: &Value) -> Option<Vec<(f64, f64)>> {
    let coordinates = geometry.get("coordinates")?;
    let ring = match geometry.get("type")?.as_str()? {
        "Polygon" => coordinates.get(0)?,
        "MultiPolygon" => coordinates.get(0)?.get(0)?,
        _ => return None,
    };
    let points: Option<Vec<(f64, f64)>> = ring
        .as_array()?
        .iter()
        .map(|p| Some((p.get(0)?.as_f64()?, p.get(1)?.as_f64()?)))
        .collect();
    points.filter(|p| p.len() >= 3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_earth_search_item() {
        let item: StacItem = serde_json::from_value(json!({
            "type": "Feature",
            "id": "S2B_18LUQ_20240110_0_L2A",
            "collection": "sentinel-2-l2a",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[-75.0, -9.0], [-74.0, -9.0], [-74.0, -8.0], [-75.0, -9.0]]]
            },
            "properties": {
                "datetime": "2024-01-10T15:24:11.123Z",
                "eo:cloud_cover": 12.5,
                "platform": "sentinel-2b"
            },
            "assets": {
                "red": {"href": "https://example.com/B04.tif", "type": "image/tiff; application=geotiff"}
            }
        }))
        .unwrap();
        assert_eq!(item.acquisition_time(), Some("2024-01-10T15:24:11.123Z"));
        assert_eq!(item.properties.cloud_cover, Some(12.5));
        assert_eq!(item.footprint().unwrap().len(), 4);
        assert_eq!(item.assets["red"].href, "https://example.com/B04.tif");
    }

    #[test]
    fn footprint_falls_back_to_bbox() {
        let item: StacItem = serde_json::from_value(json!({
            "id": "a",
            "bbox": [1.0, 2.0, 3.0, 4.0],
            "properties": {"start_datetime": "2024-01-01T00:00:00Z"}
        }))
        .unwrap();
        assert_eq!(item.acquisition_time(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(item.footprint().unwrap()[2], (3.0, 4.0));
    }

    #[test]
    fn search_body_omits_empty_query() {
        let params = StacSearchParams {
            collections: vec!["landsat-c2-l2".to_string()],
            bbox: [0.0, 0.0, 1.0, 1.0],
            datetime: "2024-01-01T00:00:00Z/2024-01-31T23:59:59Z".to_string(),
            limit: 5,
            query: None,
        };
        let body = serde_json::to_value(&params).unwrap();
        assert!(body.get("query").is_none());
        assert_eq!(body["collections"][0], "landsat-c2-l2");
    }
}
