use crate::cog::CogError;
use crate::encode::EncodeError;
use crate::raster::RasterError;
use std::io;
use thiserror::Error;

pub type SceneResult<T> = Result<T, SceneError>;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),
    #[error("band {band} unavailable in scene {scene}")]
    BandUnavailable { scene: String, band: String },
    #[error("requested extent does not intersect the raster")]
    EmptyExtent,
    #[error("host could not register layer {name}: {reason}")]
    HostRegistrationFailed { name: String, reason: String },
    #[error("failed to read asset {href}: {reason}")]
    AssetRead { href: String, reason: String },
    #[error("projection error: {0}")]
    Projection(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("cannot {action} while plugin is {state}")]
    InvalidTransition { action: String, state: String },
    #[error("no scene selected")]
    NoSelection,
    #[error(transparent)]
    Cog(#[from] CogError),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error("export failed: {0}")]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SceneError {
    pub(crate) fn asset<E: std::fmt::Display>(href: &str, e: E) -> Self {
        SceneError::AssetRead {
            href: href.to_string(),
            reason: e.to_string(),
        }
    }

    /// Text shown to the user in the host's status area or message box.
    pub fn user_message(&self) -> String {
        match self {
            SceneError::InvalidQuery(reason) => format!("Check the search parameters: {reason}"),
            SceneError::CatalogUnavailable(_) => {
                "The scene catalog could not be reached. Try again later.".to_string()
            }
            SceneError::BandUnavailable { band, .. } => {
                format!("The selected scene has no {band} band.")
            }
            SceneError::EmptyExtent => {
                "The scene does not cover the current map extent.".to_string()
            }
            SceneError::HostRegistrationFailed { name, .. } => {
                format!("Layer \"{name}\" could not be added to the map.")
            }
            SceneError::NoSelection => "Select a scene first.".to_string(),
            other => other.to_string(),
        }
    }
}
