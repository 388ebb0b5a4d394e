//! Scene browser configuration.
//!
//! Every field has a default, so an empty YAML document is a valid config.
//! Environment variables prefixed `SCENE_BROWSER_` override file values.

use crate::clip::PixelBudget;
use crate::error::{SceneError, SceneResult};
use crate::raster::Stretch;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const EARTH_SEARCH_URL: &str = "https://earth-search.aws.element84.com/v1";
pub const PLANETARY_COMPUTER_URL: &str = "https://planetarycomputer.microsoft.com/api/stac/v1";
pub const PLANETARY_COMPUTER_SAS_URL: &str =
    "https://planetarycomputer.microsoft.com/api/sas/v1/token";

const ENV_PREFIX: &str = "SCENE_BROWSER_";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneBrowserConfig {
    pub catalog: CatalogConfig,
    pub search: SearchDefaults,
    pub aoi: AoiConfig,
    pub render: RenderConfig,
    /// Directory for thumbnails and exported layers, none disables both.
    pub cache_dir: Option<PathBuf>,
}

/// A STAC API root and, for Planetary Computer, its SAS token endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default)]
    pub sas_token_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub sentinel2: EndpointConfig,
    pub landsat: EndpointConfig,
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            sentinel2: EndpointConfig {
                url: EARTH_SEARCH_URL.to_string(),
                sas_token_url: None,
            },
            landsat: EndpointConfig {
                url: PLANETARY_COMPUTER_URL.to_string(),
                sas_token_url: Some(PLANETARY_COMPUTER_SAS_URL.to_string()),
            },
            timeout_secs: 60,
        }
    }
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchDefaults {
    /// Maximum cloud cover percent
    pub cloud_cover: f64,
    pub limit: u32,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            cloud_cover: 20.0,
            limit: 5,
        }
    }
}

/// Buffers around the searched point, in web mercator meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AoiConfig {
    pub preview_buffer_m: f64,
    pub thumbnail_buffer_m: f64,
}

impl Default for AoiConfig {
    fn default() -> Self {
        Self {
            preview_buffer_m: 5000.0,
            thumbnail_buffer_m: 3000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub preview_budget: PixelBudget,
    pub load_budget: PixelBudget,
    pub thumbnail_px: u32,
    pub stretch: Stretch,
    pub header_bytes: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            preview_budget: PixelBudget::MaxDimension(1024),
            load_budget: PixelBudget::MaxMegapixels(16.0),
            thumbnail_px: 512,
            stretch: Stretch::default(),
            header_bytes: crate::cog::DEFAULT_HEADER_BYTES,
        }
    }
}

impl SceneBrowserConfig {
    pub fn from_yaml_str(yaml: &str) -> SceneResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| SceneError::Config(format!("invalid YAML: {e}")))
    }

    /// Load a YAML file, then apply environment overrides.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> SceneResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SceneError::Config(format!("reading {}: {e}", path.display())))?;
        let mut config = Self::from_yaml_str(&text)?;
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides.
    pub fn from_env() -> SceneResult<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) -> SceneResult<()> {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(url) = get("SENTINEL2_URL") {
            self.catalog.sentinel2.url = url;
        }
        if let Some(url) = get("LANDSAT_URL") {
            self.catalog.landsat.url = url;
        }
        if let Some(v) = get("TIMEOUT_SECS") {
            self.catalog.timeout_secs = parse_var("TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("CLOUD_COVER") {
            self.search.cloud_cover = parse_var("CLOUD_COVER", &v)?;
        }
        if let Some(v) = get("LIMIT") {
            self.search.limit = parse_var("LIMIT", &v)?;
        }
        if let Some(v) = get("THUMBNAIL_PX") {
            self.render.thumbnail_px = parse_var("THUMBNAIL_PX", &v)?;
        }
        if let Some(dir) = get("CACHE_DIR") {
            self.cache_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn validate(&self) -> SceneResult<()> {
        if !(0.0..=100.0).contains(&self.search.cloud_cover) {
            return Err(SceneError::Config(format!(
                "cloud_cover {} outside 0..=100",
                self.search.cloud_cover
            )));
        }
        if !(1..=200).contains(&self.search.limit) {
            return Err(SceneError::Config(format!(
                "limit {} outside 1..=200",
                self.search.limit
            )));
        }
        if self.aoi.preview_buffer_m <= 0.0 || self.aoi.thumbnail_buffer_m <= 0.0 {
            return Err(SceneError::Config("AOI buffers must be positive".to_string()));
        }
        if self.render.thumbnail_px == 0 {
            return Err(SceneError::Config("thumbnail_px must be positive".to_string()));
        }
        self.render.preview_budget.validate().map_err(SceneError::Config)?;
        self.render.load_budget.validate().map_err(SceneError::Config)?;
        self.render.stretch.validate().map_err(SceneError::Config)?;
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> SceneResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SceneError::Config(format!("{ENV_PREFIX}{name}={value:?} is not valid")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_yaml_is_default() {
        let config = SceneBrowserConfig::from_yaml_str("").unwrap();
        assert_eq!(config, SceneBrowserConfig::default());
        assert_eq!(config.search.limit, 5);
        assert_eq!(config.render.thumbnail_px, 512);
        assert_eq!(config.catalog.landsat.url, PLANETARY_COMPUTER_URL);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = r#"
search:
  limit: 25
render:
  stretch:
    mode: reflectance_ceiling
    ceiling: 0.25
  load_budget:
    max_dimension: 2048
cache_dir: /tmp/scenes
"#;
        let config = SceneBrowserConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.search.limit, 25);
        assert_eq!(config.search.cloud_cover, 20.0);
        assert_eq!(
            config.render.stretch,
            Stretch::ReflectanceCeiling { ceiling: 0.25 }
        );
        assert_eq!(config.render.load_budget, PixelBudget::MaxDimension(2048));
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/scenes")));
    }

    #[test]
    fn environment_overrides() {
        let vars: HashMap<String, String> = [
            ("SCENE_BROWSER_LIMIT", "50"),
            ("SCENE_BROWSER_SENTINEL2_URL", "http://localhost:8080"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let mut config = SceneBrowserConfig::default();
        config.apply_overrides(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.search.limit, 50);
        assert_eq!(config.catalog.sentinel2.url, "http://localhost:8080");
    }

    #[test]
    fn bad_values_are_config_errors() {
        let mut config = SceneBrowserConfig::default();
        let err = config
            .apply_overrides(|k| (k == "SCENE_BROWSER_LIMIT").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, SceneError::Config(_)));

        config.search.limit = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn degenerate_render_settings_are_rejected() {
        let mut config = SceneBrowserConfig::default();
        config.render.stretch = Stretch::ReflectanceCeiling { ceiling: 0.0 };
        assert!(matches!(config.validate(), Err(SceneError::Config(_))));

        config.render.stretch = Stretch::Percentile { low: 98.0, high: 2.0 };
        assert!(config.validate().is_err());

        config.render.stretch = Stretch::default();
        config.render.load_budget = PixelBudget::MaxMegapixels(f64::NAN);
        assert!(config.validate().is_err());
        config.render.load_budget = PixelBudget::MaxMegapixels(-1.0);
        assert!(config.validate().is_err());
        config.render.load_budget = PixelBudget::MaxMegapixels(4.0);
        config.render.preview_budget = PixelBudget::MaxDimension(0);
        assert!(config.validate().is_err());

        config.render.preview_budget = PixelBudget::MaxDimension(256);
        assert!(config.validate().is_ok());
    }
}
