//! Plugin lifecycle and the actions behind the panel's buttons.

use crate::assets::{AssetResolver, BandResolver};
use crate::bands::{BandCombinationPreset, SensorFamily, SpectralIndexFormula};
use crate::catalog::{self, DateRange, SceneCatalog, SceneQuery, SceneRecord, StacClient};
use crate::config::SceneBrowserConfig;
use crate::error::{SceneError, SceneResult};
use crate::geo::Location;
use crate::index::compute_index;
use crate::layer::{load_layer, LayerHandle, MapHost, MessageLevel, PluginAction, RasterLayer};
use crate::preview::{render_preview, RenderOptions};
use crate::raster::RasterTile;
use std::fmt;
use tracing::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    Unregistered,
    Registered,
    Active,
}

impl fmt::Display for ShellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShellState::Unregistered => "unregistered",
            ShellState::Registered => "registered",
            ShellState::Active => "active",
        };
        f.write_str(name)
    }
}

/// Search form contents. Unset fields take the configured defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub family: SensorFamily,
    pub location: Location,
    pub dates: DateRange,
    pub max_cloud_cover: Option<f64>,
    pub limit: Option<u32>,
}

/// The scene browser plugin, driven one action at a time by the host.
pub struct SceneBrowser<H: MapHost> {
    host: H,
    config: SceneBrowserConfig,
    catalog: Box<dyn SceneCatalog>,
    resolver: Box<dyn BandResolver>,
    action: PluginAction,
    state: ShellState,
    scenes: Vec<SceneRecord>,
    selected: Option<usize>,
    preset: BandCombinationPreset,
    location: Option<Location>,
}

impl<H: MapHost> SceneBrowser<H> {
    pub fn new(
        host: H,
        config: SceneBrowserConfig,
        catalog: Box<dyn SceneCatalog>,
        resolver: Box<dyn BandResolver>,
    ) -> Self {
        Self {
            host,
            config,
            catalog,
            resolver,
            action: PluginAction::default(),
            state: ShellState::Unregistered,
            scenes: vec![],
            selected: None,
            preset: BandCombinationPreset::default(),
            location: None,
        }
    }

    /// STAC catalogs and asset reads sharing one HTTP client.
    pub fn with_config(host: H, config: SceneBrowserConfig) -> SceneResult<Self> {
        config.validate()?;
        let client = StacClient::new(&config.catalog)?;
        let resolver = AssetResolver::new(client.http().clone(), config.render.header_bytes);
        Ok(Self::new(host, config, Box::new(client), Box::new(resolver)))
    }

    pub fn state(&self) -> ShellState {
        self.state
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn scenes(&self) -> &[SceneRecord] {
        &self.scenes
    }

    pub fn selected(&self) -> Option<&SceneRecord> {
        self.selected.and_then(|i| self.scenes.get(i))
    }

    pub fn preset(&self) -> BandCombinationPreset {
        self.preset
    }

    // Lifecycle

    pub fn register(&mut self) -> SceneResult<()> {
        let result = self.transition("register", &[ShellState::Unregistered]).and_then(|_| {
            self.host
                .register_action(&self.action)
                .map_err(|e| SceneError::HostRegistrationFailed {
                    name: self.action.text.clone(),
                    reason: e.to_string(),
                })
        });
        if result.is_ok() {
            self.state = ShellState::Registered;
        }
        self.report(result)
    }

    pub fn activate(&mut self) -> SceneResult<()> {
        let result = self.transition("activate", &[ShellState::Registered]);
        if result.is_ok() {
            self.state = ShellState::Active;
        }
        self.report(result)
    }

    pub fn deactivate(&mut self) -> SceneResult<()> {
        let result = self.transition("deactivate", &[ShellState::Active]);
        if result.is_ok() {
            self.state = ShellState::Registered;
        }
        self.report(result)
    }

    pub fn unregister(&mut self) -> SceneResult<()> {
        let result =
            self.transition("unregister", &[ShellState::Registered, ShellState::Active]);
        if result.is_ok() {
            self.host.unregister_action(&self.action);
            self.scenes.clear();
            self.selected = None;
            self.location = None;
            self.state = ShellState::Unregistered;
        }
        self.report(result)
    }

    fn transition(&self, action: &str, from: &[ShellState]) -> SceneResult<()> {
        if from.contains(&self.state) {
            debug!("{action} from {}", self.state);
            Ok(())
        } else {
            Err(SceneError::InvalidTransition {
                action: action.to_string(),
                state: self.state.to_string(),
            })
        }
    }

    fn require_active(&self, action: &str) -> SceneResult<()> {
        self.transition(action, &[ShellState::Active])
    }

    /// Show failures to the user; the shell stays usable either way.
    fn report<T>(&mut self, result: SceneResult<T>) -> SceneResult<T> {
        if let Err(e) = &result {
            warn!("{e}");
            let level = match e {
                SceneError::InvalidQuery(_)
                | SceneError::NoSelection
                | SceneError::EmptyExtent
                | SceneError::BandUnavailable { .. } => MessageLevel::Warning,
                _ => MessageLevel::Critical,
            };
            self.host.show_message(level, &e.user_message());
        }
        result
    }

    // Actions

    /// Replace the scene list with a new search, returning the scene count.
    pub async fn search(&mut self, request: SearchRequest) -> SceneResult<usize> {
        let result = self.run_search(request).await;
        self.report(result)
    }

    async fn run_search(&mut self, request: SearchRequest) -> SceneResult<usize> {
        self.require_active("search")?;
        self.scenes.clear();
        self.selected = None;

        let query = SceneQuery {
            family: request.family,
            location: request.location,
            dates: request.dates,
            max_cloud_cover: request
                .max_cloud_cover
                .or(Some(self.config.search.cloud_cover)),
            limit: request.limit.unwrap_or(self.config.search.limit),
        };
        let buffer = self.config.aoi.preview_buffer_m;
        self.scenes = catalog::search(self.catalog.as_ref(), &query, buffer).await?;
        self.location = Some(query.location.clone());

        // Results stand even when the map cannot follow
        if let Err(e) = self.zoom_to_location(&query.location, buffer) {
            warn!("Not zooming to search area: {e}");
        }

        let count = self.scenes.len();
        self.host.show_message(
            MessageLevel::Info,
            &format!("{count} {} scenes found", query.family),
        );
        Ok(count)
    }

    fn zoom_to_location(&mut self, location: &Location, buffer_meters: f64) -> SceneResult<()> {
        let map_epsg = self.host.map_extent()?.epsg;
        let aoi = location.search_extent(buffer_meters)?.reproject(map_epsg)?;
        self.host.zoom_to(&aoi);
        Ok(())
    }

    pub fn select_scene(&mut self, index: usize) -> SceneResult<()> {
        let result = self.require_active("select a scene").and_then(|_| {
            if index < self.scenes.len() {
                Ok(())
            } else {
                Err(SceneError::InvalidQuery(format!(
                    "no scene at position {index} of {}",
                    self.scenes.len()
                )))
            }
        });
        if result.is_ok() {
            self.selected = Some(index);
        }
        self.report(result)
    }

    pub fn set_preset(&mut self, preset: BandCombinationPreset) -> SceneResult<()> {
        let result = self.require_active("change preset");
        if result.is_ok() {
            self.preset = preset;
        }
        self.report(result)
    }

    fn selected_scene(&self) -> SceneResult<SceneRecord> {
        self.selected().cloned().ok_or(SceneError::NoSelection)
    }

    /// Preview of the selected scene over the current map extent.
    pub async fn preview_selected(&mut self) -> SceneResult<RasterTile> {
        let options = RenderOptions::preview(&self.config.render);
        let result = self.render_selected("preview", options).await;
        self.report(result)
    }

    async fn render_selected(
        &mut self,
        action: &str,
        options: RenderOptions,
    ) -> SceneResult<RasterTile> {
        self.require_active(action)?;
        let scene = self.selected_scene()?;
        let extent = self.host.map_extent()?;
        render_preview(self.resolver.as_ref(), &scene, self.preset, &extent, &options).await
    }

    /// Render the selected scene at load resolution and add it to the map.
    pub async fn load_selected(&mut self) -> SceneResult<LayerHandle> {
        let result = self.run_load().await;
        self.report(result)
    }

    async fn run_load(&mut self) -> SceneResult<LayerHandle> {
        let options = RenderOptions::load(&self.config.render);
        let tile = self.render_selected("load", options).await?;
        let scene = self.selected_scene()?;
        let layer = RasterLayer::preview(&scene, self.preset, tile);
        load_layer(&mut self.host, layer, self.config.cache_dir.as_deref()).await
    }

    pub async fn index_selected(&mut self, formula: SpectralIndexFormula) -> SceneResult<LayerHandle> {
        let result = self.run_index(formula).await;
        self.report(result)
    }

    async fn run_index(&mut self, formula: SpectralIndexFormula) -> SceneResult<LayerHandle> {
        self.require_active(formula.label())?;
        let scene = self.selected_scene()?;
        let extent = self.host.map_extent()?;
        let options = RenderOptions::load(&self.config.render);
        let tile = compute_index(self.resolver.as_ref(), &scene, formula, &extent, &options).await?;
        let layer = RasterLayer::index(&scene, formula, tile);
        load_layer(&mut self.host, layer, self.config.cache_dir.as_deref()).await
    }

    /// Cached thumbnail of a listed scene around the last searched location.
    #[cfg(feature = "image")]
    pub async fn thumbnail(&mut self, index: usize) -> SceneResult<std::path::PathBuf> {
        let result = self.run_thumbnail(index).await;
        self.report(result)
    }

    #[cfg(feature = "image")]
    async fn run_thumbnail(&mut self, index: usize) -> SceneResult<std::path::PathBuf> {
        use crate::preview::{cached_thumbnail, ThumbnailOptions};

        self.require_active("thumbnail")?;
        let scene = self
            .scenes
            .get(index)
            .ok_or_else(|| SceneError::InvalidQuery(format!("no scene at position {index}")))?;
        let point = self.location.as_ref().ok_or(SceneError::NoSelection)?.anchor();
        let cache_dir = self
            .config
            .cache_dir
            .as_deref()
            .ok_or_else(|| SceneError::Config("no cache directory for thumbnails".to_string()))?;
        let options = ThumbnailOptions::from_config(&self.config);
        cached_thumbnail(self.resolver.as_ref(), cache_dir, scene, self.preset, point, &options)
            .await
    }
}
