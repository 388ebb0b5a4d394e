//! Search, preview and load Sentinel-2 and Landsat scenes from STAC catalogs.
//!
//! Band assets are read as Cloud Optimized GeoTIFFs through range requests,
//! clipped to the host's map extent and handed to the host as layers.

pub mod assets;
pub mod bands;
pub mod catalog;
pub mod clip;
pub mod cog;
pub mod config;
pub mod encode;
pub mod error;
pub mod geo;
pub mod index;
pub mod io;
pub mod layer;
pub mod preview;
pub mod raster;
pub mod shell;
pub mod tiff;

pub use assets::{AssetResolver, BandResolver, CogBand};
pub use bands::{Band, BandCombinationPreset, Sensor, SensorFamily, SpectralIndexFormula};
pub use catalog::{search, DateRange, SceneCatalog, SceneQuery, SceneRecord, StacClient};
pub use clip::{clip, PixelBudget, RasterSource};
pub use cog::CloudTiff;
pub use config::SceneBrowserConfig;
pub use error::{SceneError, SceneResult};
pub use geo::{Location, MapExtent};
pub use index::compute_index;
pub use io::AsyncReadRange;
pub use layer::{
    load_layer, unload_layer, HostError, LayerGroup, LayerHandle, LayerStyle, MapHost,
    MessageLevel, PluginAction, RasterLayer,
};
pub use preview::{render_preview, RenderOptions};
pub use raster::{Raster, RasterTile, Stretch};
pub use shell::{SceneBrowser, SearchRequest, ShellState};
