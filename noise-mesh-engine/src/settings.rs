use crate::error::SettingsError;
use bevy::prelude::*;
use constants::render_settings::DEFAULT_LINE_COLOUR;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How source UVs are carried into the uploaded vertex records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UvMode {
    /// Every vertex gets a zero UV regardless of the mesh data.
    #[default]
    Zeroed,
    /// Copy the mesh's first UV channel; vertices without a UV get zero.
    FromMesh,
}

/// What the `_Time` uniform carries each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSource {
    /// Seconds accumulated since the driver was initialized.
    #[default]
    Elapsed,
    /// The delta of the current frame only.
    Delta,
}

/// Primitive topology used when drawing the generated vertices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawTopology {
    #[default]
    Lines,
    Points,
    Triangles,
}

/// Runtime configuration for the procedural noise mesh pipeline.
///
/// Loaded from `*.noise.json` assets through `bevy_common_assets`, or parsed
/// directly with [`PipelineSettings::from_json_str`]. Missing fields take
/// their defaults.
#[derive(Resource, Asset, TypePath, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub uv_mode: UvMode,
    pub time_source: TimeSource,
    pub topology: DrawTopology,
    pub cast_shadows: bool,
    pub line_colour: [f32; 4],
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            uv_mode: UvMode::default(),
            time_source: TimeSource::default(),
            topology: DrawTopology::default(),
            cast_shadows: true,
            line_colour: DEFAULT_LINE_COLOUR.to_array(),
        }
    }
}

impl PipelineSettings {
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let settings = PipelineSettings::from_json_str("{}").unwrap();
        assert_eq!(settings, PipelineSettings::default());
        assert_eq!(settings.uv_mode, UvMode::Zeroed);
        assert!(settings.cast_shadows);
    }

    #[test]
    fn partial_settings_override_only_named_fields() {
        let settings = PipelineSettings::from_json_str(
            r#"{ "uv_mode": "from_mesh", "time_source": "delta", "topology": "points" }"#,
        )
        .unwrap();
        assert_eq!(settings.uv_mode, UvMode::FromMesh);
        assert_eq!(settings.time_source, TimeSource::Delta);
        assert_eq!(settings.topology, DrawTopology::Points);
        assert_eq!(settings.line_colour, DEFAULT_LINE_COLOUR.to_array());
    }

    #[test]
    fn malformed_settings_are_rejected() {
        let result = PipelineSettings::from_json_str(r#"{ "uv_mode": "sideways" }"#);
        assert!(matches!(result, Err(SettingsError::Parse(_))));
    }

    #[test]
    fn shipped_settings_file_loads() {
        let path =
            Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/settings/noise_mesh.noise.json");
        let settings = PipelineSettings::from_file(path).unwrap();
        assert!(settings.cast_shadows);
        assert_eq!(settings.topology, DrawTopology::Lines);
    }

    #[test]
    fn missing_settings_file_is_an_io_error() {
        let path = std::env::temp_dir().join("noise_mesh_settings_that_does_not_exist.noise.json");
        let result = PipelineSettings::from_file(path);
        assert!(matches!(result, Err(SettingsError::Io(_))));
    }
}
