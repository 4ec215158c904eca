//! Error types for the dashboard composition root

use scene_diff::DetectorError;
use scene_graph::SceneError;

/// Dashboard scene error
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// Scene graph operation failed
    #[error("scene error: {0}")]
    Scene(#[from] SceneError),

    /// Change detection failed
    #[error("change detection error: {0}")]
    Detector(#[from] DetectorError),

    /// Dashboard JSON does not match the expected shape
    #[error("invalid dashboard model: {0}")]
    InvalidModel(#[from] serde_json::Error),

    /// No panel with the given key
    #[error("panel not found: {0}")]
    PanelNotFound(String),

    /// No variable with the given name
    #[error("variable not found: {0}")]
    VariableNotFound(String),

    /// Options could not be parsed
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl DashboardError {
    /// Check if error is a failed lookup
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PanelNotFound(_) | Self::VariableNotFound(_))
    }

    /// Check if error comes from misusing the node lifecycle
    #[must_use]
    pub fn is_lifecycle_misuse(&self) -> bool {
        matches!(self, Self::Scene(err) if err.is_lifecycle_misuse())
    }
}
