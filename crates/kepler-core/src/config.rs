use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::error::ConfigError;
use super::merger::MergeMode;

/// Startup configuration for a composed core.
///
/// Every section falls back to its default, so an empty TOML document is a
/// valid configuration.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CoreConfig {
    pub map: MapConfig,
    pub style: StyleConfig,
    pub ui: UiConfig,
    pub vis: VisConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MapConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
    pub width: f64,
    pub height: f64,
    pub drag_rotate: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            latitude: 37.75043,
            longitude: -122.34679,
            zoom: 9.0,
            pitch: 0.0,
            bearing: 0.0,
            width: 800.0,
            height: 800.0,
            drag_rotate: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StyleConfig {
    pub default_style: String,
    pub three_d_building_color: [u8; 3],
    pub background_color: [u8; 3],
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            default_style: "dark".to_string(),
            three_d_building_color: [209, 206, 199],
            background_color: [0, 0, 0],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    pub read_only: bool,
    pub locale: String,
    pub notification_cap: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            locale: "en".to_string(),
            notification_cap: 50,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct VisConfig {
    pub auto_create_layers: bool,
    pub merge_mode: MergeMode,
}

impl Default for VisConfig {
    fn default() -> Self {
        Self {
            auto_create_layers: true,
            merge_mode: MergeMode::Merge,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub history_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
        }
    }
}

impl CoreConfig {
    /// Loads configuration from `path`.
    ///
    /// A missing file yields `CoreConfig::default()`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config = Self::from_toml_str(&content).map_err(|err| match err {
            ConfigError::ParseError { source, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-90.0..=90.0).contains(&self.map.latitude) {
            return Err(ConfigError::ValidationError {
                message: format!("map.latitude {} is outside [-90, 90]", self.map.latitude),
            });
        }
        if !(-180.0..=180.0).contains(&self.map.longitude) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "map.longitude {} is outside [-180, 180]",
                    self.map.longitude
                ),
            });
        }
        if self.map.width <= 0.0 || self.map.height <= 0.0 {
            return Err(ConfigError::ValidationError {
                message: "map.width and map.height must be positive".to_string(),
            });
        }
        if self.style.default_style.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "style.default_style must not be empty".to_string(),
            });
        }
        if self.store.history_capacity == 0 {
            return Err(ConfigError::ValidationError {
                message: "store.history_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = CoreConfig::from_toml_str("").expect("parse");
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = CoreConfig::from_toml_str(
            r#"
            [map]
            zoom = 3.5

            [vis]
            merge_mode = "replace"
            "#,
        )
        .expect("parse");
        assert_eq!(config.map.zoom, 3.5);
        assert_eq!(config.map.latitude, MapConfig::default().latitude);
        assert_eq!(config.vis.merge_mode, MergeMode::Replace);
        assert!(config.vis.auto_create_layers);
    }

    #[test]
    fn out_of_range_latitude_is_rejected() {
        let err = CoreConfig::from_toml_str("[map]\nlatitude = 120.0\n").expect_err("invalid");
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let dir = tempdir().expect("tmpdir");
        let config = CoreConfig::load(dir.path().join("absent.toml")).expect("load");
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn parse_error_names_the_file() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("core.toml");
        fs::write(&path, "[map\n").expect("write");
        let err = CoreConfig::load(&path).expect_err("bad toml");
        match err {
            ConfigError::ParseError { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }
}
