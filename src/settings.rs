//! File-backed settings with built-in defaults.
//!
//! Settings are the lowest-precedence configuration layer: values here are
//! overridden by environment variables when the runtime config is resolved
//! (see [`crate::config`]).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub templates: TemplateSettings,
    pub labels: LabelSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: String,
    pub workbook_file: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            workbook_file: "QE-02-01.xlsx".to_string(),
        }
    }
}

/// Template locations. `dir` is relative to the data directory unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    pub dir: String,
    pub qe0204: String,
    pub outer_box: String,
    pub label: String,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            dir: "templates".to_string(),
            qe0204: "QE-02-04 樣品入庫歸還單(Rev01).html".to_string(),
            outer_box: "外箱標誌.html".to_string(),
            label: "樣品小標籤.html".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSettings {
    pub columns_per_row: usize,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self { columns_per_row: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub client_origin: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            client_origin: "http://localhost:5173".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::SettingsFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&raw).map_err(|reason| ConfigError::SettingsFile {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| format!("invalid settings TOML: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;

    #[test]
    fn partial_toml_keeps_defaults_for_missing_sections() {
        let settings = Settings::from_toml(
            "[storage]\ndata_dir = \"/srv/samples\"\n\n[labels]\ncolumns_per_row = 4\n",
        )
        .expect("settings should parse");

        assert_eq!(settings.storage.data_dir, "/srv/samples");
        assert_eq!(settings.storage.workbook_file, "QE-02-01.xlsx");
        assert_eq!(settings.labels.columns_per_row, 4);
        assert_eq!(settings.server.port, 3000);
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let err = Settings::from_toml("[storage\n").expect_err("must reject");
        assert!(err.contains("invalid settings TOML"), "unexpected: {err}");
    }

    #[test]
    fn load_without_path_returns_defaults() {
        let settings = Settings::load(None).expect("defaults");
        assert_eq!(settings.templates.dir, "templates");
        assert_eq!(settings.server.client_origin, "http://localhost:5173");
    }
}
