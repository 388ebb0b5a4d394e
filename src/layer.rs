//! Host map seam: layers, groups, actions and messages.

use crate::bands::{BandCombinationPreset, SensorFamily, SpectralIndexFormula};
use crate::catalog::SceneRecord;
use crate::encode::Encoder;
use crate::error::{SceneError, SceneResult};
use crate::geo::MapExtent;
use crate::raster::{ColorRamp, RasterTile};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::*;

/// Host-assigned layer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerHandle(pub u64);

impl fmt::Display for LayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer #{}", self.0)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct HostError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Warning,
    Critical,
}

/// Toolbar/menu entry the plugin contributes to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginAction {
    pub id: String,
    pub text: String,
    pub menu: String,
}

impl Default for PluginAction {
    fn default() -> Self {
        Self {
            id: "scene_browser.open".to_string(),
            text: "Scene Browser".to_string(),
            menu: "&Scene Browser".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerGroup {
    Previews(SensorFamily),
    Indices(SensorFamily),
}

impl LayerGroup {
    pub fn name(&self) -> &'static str {
        match self {
            LayerGroup::Previews(SensorFamily::Sentinel2) => "Previews Sentinel-2",
            LayerGroup::Previews(SensorFamily::Landsat) => "Previews Landsat",
            LayerGroup::Indices(SensorFamily::Sentinel2) => "Indices (Sentinel-2)",
            LayerGroup::Indices(SensorFamily::Landsat) => "Indices (Landsat)",
        }
    }
}

impl fmt::Display for LayerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerStyle {
    /// RGB composite with a min/max stretch per channel
    MultiBand { ranges: [(f32, f32); 3] },
    /// Single band through a colour ramp
    PseudoColor(ColorRamp),
}

impl LayerStyle {
    /// Per channel min/max of the valid pixels of a three band tile.
    pub fn min_max(tile: &RasterTile) -> Self {
        let mut ranges = [(0.0, 255.0); 3];
        for (channel, range) in ranges.iter_mut().enumerate() {
            let valid = tile
                .band(channel)
                .into_iter()
                .flatten()
                .copied()
                .filter(|v| tile.is_valid(*v));
            if let Some((lo, hi)) = valid.fold(None, |acc: Option<(f32, f32)>, v| {
                Some(acc.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v))))
            }) {
                *range = (lo, hi);
            }
        }
        LayerStyle::MultiBand { ranges }
    }

    pub fn for_index(formula: SpectralIndexFormula) -> Self {
        match formula {
            SpectralIndexFormula::Ndvi => LayerStyle::PseudoColor(ColorRamp::vegetation()),
            SpectralIndexFormula::Nbr => LayerStyle::PseudoColor(ColorRamp::burn()),
        }
    }
}

/// Everything the host needs to display one raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    pub name: String,
    pub group: LayerGroup,
    pub tile: RasterTile,
    pub style: LayerStyle,
    /// GeoTIFF copy of `tile`, when exported
    pub path: Option<PathBuf>,
}

impl RasterLayer {
    pub fn new(name: impl Into<String>, group: LayerGroup, tile: RasterTile, style: LayerStyle) -> Self {
        Self {
            name: name.into(),
            group,
            tile,
            style,
            path: None,
        }
    }

    pub fn preview(scene: &SceneRecord, preset: BandCombinationPreset, tile: RasterTile) -> Self {
        let family = scene.sensor.family();
        let style = LayerStyle::min_max(&tile);
        let name = format!("{} {} | {}", family.label(), preset.label(), scene.id);
        Self::new(name, LayerGroup::Previews(family), tile, style)
    }

    pub fn index(scene: &SceneRecord, formula: SpectralIndexFormula, tile: RasterTile) -> Self {
        let family = scene.sensor.family();
        let name = format!("{} | {}", formula.label(), scene.id);
        Self::new(name, LayerGroup::Indices(family), tile, LayerStyle::for_index(formula))
    }

    /// File name for the GeoTIFF export.
    pub fn file_name(&self) -> String {
        let stem: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{stem}.tif")
    }
}

/// The desktop GIS the plugin runs in.
pub trait MapHost {
    /// Current map canvas extent.
    fn map_extent(&self) -> SceneResult<MapExtent>;

    fn add_layer(&mut self, layer: RasterLayer) -> Result<LayerHandle, HostError>;

    fn remove_layer(&mut self, handle: LayerHandle) -> Result<(), HostError>;

    fn zoom_to(&mut self, extent: &MapExtent);

    fn register_action(&mut self, action: &PluginAction) -> Result<(), HostError>;

    fn unregister_action(&mut self, action: &PluginAction);

    fn show_message(&mut self, level: MessageLevel, text: &str);
}

/// Add a layer to the host, exporting it to `export_dir` first when given.
pub async fn load_layer(
    host: &mut dyn MapHost,
    mut layer: RasterLayer,
    export_dir: Option<&Path>,
) -> SceneResult<LayerHandle> {
    if let Some(dir) = export_dir {
        let path = dir.join(layer.file_name());
        Encoder::new(&layer.tile).write_to_path(&path).await?;
        layer.path = Some(path);
    }
    let name = layer.name.clone();
    let group = layer.group;
    let handle = host
        .add_layer(layer)
        .map_err(|e| SceneError::HostRegistrationFailed {
            name: name.clone(),
            reason: e.to_string(),
        })?;
    info!("Added {handle} \"{name}\" to {group}");
    Ok(handle)
}

pub fn unload_layer(host: &mut dyn MapHost, handle: LayerHandle) -> SceneResult<()> {
    host.remove_layer(handle)
        .map_err(|e| SceneError::HostRegistrationFailed {
            name: handle.to_string(),
            reason: e.to_string(),
        })?;
    debug!("Removed {handle}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Raster;

    #[derive(Default)]
    struct Canvas {
        layers: Vec<(LayerHandle, RasterLayer)>,
        next: u64,
        refuse: bool,
    }

    impl MapHost for Canvas {
        fn map_extent(&self) -> SceneResult<MapExtent> {
            MapExtent::new(32618, 0.0, 0.0, 10.0, 10.0)
        }

        fn add_layer(&mut self, layer: RasterLayer) -> Result<LayerHandle, HostError> {
            if self.refuse {
                return Err(HostError("read-only project".to_string()));
            }
            self.next += 1;
            let handle = LayerHandle(self.next);
            self.layers.push((handle, layer));
            Ok(handle)
        }

        fn remove_layer(&mut self, handle: LayerHandle) -> Result<(), HostError> {
            let before = self.layers.len();
            self.layers.retain(|(h, _)| *h != handle);
            if self.layers.len() == before {
                return Err(HostError(format!("no {handle}")));
            }
            Ok(())
        }

        fn zoom_to(&mut self, _extent: &MapExtent) {}

        fn register_action(&mut self, _action: &PluginAction) -> Result<(), HostError> {
            Ok(())
        }

        fn unregister_action(&mut self, _action: &PluginAction) {}

        fn show_message(&mut self, _level: MessageLevel, _text: &str) {}
    }

    fn tile() -> RasterTile {
        let raster = Raster::new(
            (2, 1),
            vec![vec![10.0, 20.0], vec![0.0, 5.0], vec![f32::NAN, 7.0]],
        )
        .unwrap();
        let extent = MapExtent::new(32618, 0.0, 0.0, 20.0, 10.0).unwrap();
        RasterTile::new(raster, extent, None)
    }

    #[test]
    fn min_max_ignores_invalid_pixels() {
        let LayerStyle::MultiBand { ranges } = LayerStyle::min_max(&tile()) else {
            panic!("expected multiband style");
        };
        assert_eq!(ranges, [(10.0, 20.0), (0.0, 5.0), (7.0, 7.0)]);
    }

    #[test]
    fn group_names() {
        assert_eq!(
            LayerGroup::Previews(SensorFamily::Sentinel2).name(),
            "Previews Sentinel-2"
        );
        assert_eq!(
            LayerGroup::Indices(SensorFamily::Landsat).name(),
            "Indices (Landsat)"
        );
    }

    #[tokio::test]
    async fn load_exports_and_unload_removes() {
        let dir = tempfile::tempdir().unwrap();
        let mut canvas = Canvas::default();
        let layer = RasterLayer::new(
            "S2 Natural | A/B",
            LayerGroup::Previews(SensorFamily::Sentinel2),
            tile(),
            LayerStyle::min_max(&tile()),
        );
        let handle = load_layer(&mut canvas, layer, Some(dir.path())).await.unwrap();
        let path = canvas.layers[0].1.path.clone().unwrap();
        assert_eq!(path, dir.path().join("S2_Natural___A_B.tif"));
        assert!(path.exists());

        unload_layer(&mut canvas, handle).unwrap();
        assert!(canvas.layers.is_empty());
        assert!(unload_layer(&mut canvas, handle).is_err());
    }

    #[tokio::test]
    async fn host_refusal_is_registration_failure() {
        let mut canvas = Canvas {
            refuse: true,
            ..Default::default()
        };
        let layer = RasterLayer::new(
            "NDVI | x",
            LayerGroup::Indices(SensorFamily::Landsat),
            tile(),
            LayerStyle::for_index(SpectralIndexFormula::Ndvi),
        );
        let err = load_layer(&mut canvas, layer, None).await.unwrap_err();
        assert!(matches!(err, SceneError::HostRegistrationFailed { name, .. } if name == "NDVI | x"));
    }
}
