//! Inference settings
//!
//! Settings can be loaded from a TOML file:
//!
//! ```toml
//! search_paths = ["templates", "shared"]
//! descend_blocks = true
//!
//! [markers]
//! undefined = "{{ not defined }}"
//! error = "Error!"
//! list = "{{ more elements in the list }}"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse settings TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

pub const DEFAULT_UNDEFINED_MARKER: &str = "{{ not defined }}";
pub const DEFAULT_ERROR_MARKER: &str = "Error!";
pub const DEFAULT_LIST_MARKER: &str = "{{ more elements in the list }}";

/// Placeholder strings used for schema leaves when rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    /// A variable read with no known value
    pub undefined: String,
    /// A structurally invalid finding
    pub error: String,
    /// "the list has more elements like this one"
    pub list: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            undefined: DEFAULT_UNDEFINED_MARKER.to_string(),
            error: DEFAULT_ERROR_MARKER.to_string(),
            list: DEFAULT_LIST_MARKER.to_string(),
        }
    }
}

/// Configuration for the inference pipeline
#[derive(Debug, Clone, Default)]
pub struct InferConfig {
    pub markers: Markers,
    /// Walk `{% block %}` bodies as plain containers instead of reporting them
    pub descend_blocks: bool,
}

impl InferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_markers(mut self, markers: Markers) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_descend_blocks(mut self, descend_blocks: bool) -> Self {
        self.descend_blocks = descend_blocks;
        self
    }
}

/// Settings file contents
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Directories searched for templates, in order
    pub search_paths: Vec<PathBuf>,
    pub config: InferConfig,
}

/// TOML structure for deserializing settings
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlSettings {
    #[serde(default)]
    search_paths: Vec<PathBuf>,
    #[serde(default)]
    descend_blocks: bool,
    markers: Option<TomlMarkers>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlMarkers {
    undefined: Option<String>,
    error: Option<String>,
    list: Option<String>,
}

impl Settings {
    /// Load settings from a TOML file
    ///
    /// Relative search paths are taken relative to the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut settings = Self::from_str(&content)?;
        if let Some(base) = path.parent() {
            settings.search_paths = settings
                .search_paths
                .into_iter()
                .map(|p| if p.is_relative() { base.join(p) } else { p })
                .collect();
        }
        Ok(settings)
    }

    /// Load settings from a TOML string
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let parsed: TomlSettings = toml::from_str(content)?;

        let defaults = Markers::default();
        let markers = match parsed.markers {
            Some(m) => Markers {
                undefined: m.undefined.unwrap_or(defaults.undefined),
                error: m.error.unwrap_or(defaults.error),
                list: m.list.unwrap_or(defaults.list),
            },
            None => defaults,
        };

        Ok(Settings {
            search_paths: parsed.search_paths,
            config: InferConfig::new()
                .with_markers(markers)
                .with_descend_blocks(parsed.descend_blocks),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_markers() {
        let markers = Markers::default();
        assert_eq!(markers.undefined, "{{ not defined }}");
        assert_eq!(markers.error, "Error!");
        assert_eq!(markers.list, "{{ more elements in the list }}");
    }

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings = Settings::from_str("").expect("Should parse");
        assert!(settings.search_paths.is_empty());
        assert_eq!(settings.config.markers, Markers::default());
        assert!(!settings.config.descend_blocks);
    }

    #[test]
    fn test_parse_full_settings() {
        let settings = Settings::from_str(
            r#"
search_paths = ["templates", "/opt/shared"]
descend_blocks = true

[markers]
undefined = "FILL ME"
list = "..."
"#,
        )
        .expect("Should parse");

        assert_eq!(
            settings.search_paths,
            vec![PathBuf::from("templates"), PathBuf::from("/opt/shared")]
        );
        assert!(settings.config.descend_blocks);
        assert_eq!(settings.config.markers.undefined, "FILL ME");
        assert_eq!(settings.config.markers.error, "Error!");
        assert_eq!(settings.config.markers.list, "...");
    }

    #[test]
    fn test_unknown_field_error() {
        let result = Settings::from_str("colour = 'blue'");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_invalid_toml_error() {
        let result = Settings::from_str("search_paths = [");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file_resolves_relative_paths() {
        let dir = std::env::temp_dir().join(format!("jinja-schema-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("settings.toml");
        std::fs::write(&file, "search_paths = [\"templates\"]\n").unwrap();

        let settings = Settings::from_file(&file).expect("Should load");
        assert_eq!(settings.search_paths, vec![dir.join("templates")]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_builder_methods() {
        let markers = Markers {
            undefined: "?".to_string(),
            ..Markers::default()
        };
        let config = InferConfig::new()
            .with_markers(markers.clone())
            .with_descend_blocks(true);
        assert_eq!(config.markers, markers);
        assert!(config.descend_blocks);
    }
}
