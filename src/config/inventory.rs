use std::path::{Component, Path, PathBuf};

use crate::config::helpers::{optional_env, parse_string_env, parse_u16_env, parse_usize_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Widest label sheet layout accepted for `LABEL_COLUMNS_PER_ROW`.
const MAX_LABEL_COLUMNS: usize = 12;

/// Resolved locations of the three document templates.
#[derive(Debug, Clone)]
pub struct TemplatePaths {
    pub qe0204: PathBuf,
    pub outer_box: PathBuf,
    pub label: PathBuf,
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub client_origin: String,
}

/// Storage, template, and label layout configuration.
#[derive(Debug, Clone)]
pub struct InventoryConfig {
    pub data_dir: PathBuf,
    pub workbook_path: PathBuf,
    pub templates: TemplatePaths,
    pub label_columns_per_row: usize,
    pub server: ServerConfig,
}

fn validate_file_name(key: &str, raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "file name must not be empty".to_string(),
        });
    }

    let mut components = Path::new(trimmed).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => name
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                message: "file name contains non-UTF-8 characters".to_string(),
            }),
        (Some(Component::ParentDir), _) | (_, Some(Component::ParentDir)) => {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "file name must not contain '..' components".to_string(),
            })
        }
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "file name must be a plain basename".to_string(),
        }),
    }
}

fn validate_data_dir(raw: &str) -> Result<PathBuf, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "DATA_DIR".to_string(),
            message: "data directory must not be empty".to_string(),
        });
    }
    Ok(PathBuf::from(trimmed))
}

fn validate_label_columns(columns: usize) -> Result<usize, ConfigError> {
    if columns == 0 || columns > MAX_LABEL_COLUMNS {
        return Err(ConfigError::InvalidValue {
            key: "LABEL_COLUMNS_PER_ROW".to_string(),
            message: format!("must be between 1 and {MAX_LABEL_COLUMNS}, got {columns}"),
        });
    }
    Ok(columns)
}

fn resolve_template_dir(data_dir: &Path, raw: &str) -> PathBuf {
    let raw_path = PathBuf::from(raw.trim());
    if raw_path.is_absolute() {
        raw_path
    } else {
        data_dir.join(raw_path)
    }
}

impl InventoryConfig {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let data_dir = validate_data_dir(&parse_string_env(
            "DATA_DIR",
            settings.storage.data_dir.clone(),
        )?)?;
        let workbook_file = validate_file_name(
            "WORKBOOK_FILE",
            &parse_string_env("WORKBOOK_FILE", settings.storage.workbook_file.clone())?,
        )?;
        let template_dir = resolve_template_dir(
            &data_dir,
            &optional_env("TEMPLATE_DIR")?.unwrap_or_else(|| settings.templates.dir.clone()),
        );

        let template = |key: &str, default: &String| -> Result<PathBuf, ConfigError> {
            let name = validate_file_name(key, &parse_string_env(key, default.clone())?)?;
            Ok(template_dir.join(name))
        };
        let templates = TemplatePaths {
            qe0204: template("TEMPLATE_QE0204", &settings.templates.qe0204)?,
            outer_box: template("TEMPLATE_OUTER_BOX", &settings.templates.outer_box)?,
            label: template("TEMPLATE_LABEL", &settings.templates.label)?,
        };

        Ok(Self {
            workbook_path: data_dir.join(workbook_file),
            data_dir,
            templates,
            label_columns_per_row: validate_label_columns(parse_usize_env(
                "LABEL_COLUMNS_PER_ROW",
                settings.labels.columns_per_row,
            )?)?,
            server: ServerConfig {
                host: parse_string_env("HOST", settings.server.host.clone())?,
                port: parse_u16_env("PORT", settings.server.port)?,
                client_origin: parse_string_env(
                    "CLIENT_ORIGIN",
                    settings.server.client_origin.clone(),
                )?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::error::ConfigError;
    use crate::settings::Settings;

    #[test]
    fn resolve_joins_workbook_and_templates_under_data_dir() {
        let mut settings = Settings::default();
        settings.storage.data_dir = "/srv/samples".to_string();

        let config = super::InventoryConfig::resolve(&settings).expect("config");
        assert_eq!(config.workbook_path, PathBuf::from("/srv/samples/QE-02-01.xlsx"));
        assert_eq!(
            config.templates.label,
            PathBuf::from("/srv/samples/templates/樣品小標籤.html")
        );
        assert_eq!(config.label_columns_per_row, 3);
    }

    #[test]
    fn absolute_template_dir_is_used_verbatim() {
        let mut settings = Settings::default();
        settings.storage.data_dir = "/srv/samples".to_string();
        settings.templates.dir = "/opt/templates".to_string();

        let config = super::InventoryConfig::resolve(&settings).expect("config");
        assert_eq!(
            config.templates.outer_box,
            PathBuf::from("/opt/templates/外箱標誌.html")
        );
    }

    #[test]
    fn validate_file_name_accepts_plain_basename() {
        assert_eq!(
            super::validate_file_name("WORKBOOK_FILE", "  ledger.xlsx ").expect("valid"),
            "ledger.xlsx"
        );
    }

    #[test]
    fn validate_file_name_rejects_parent_dir_traversal() {
        let err = super::validate_file_name("WORKBOOK_FILE", "../ledger.xlsx")
            .expect_err("must reject '..'");
        let ConfigError::InvalidValue { key, message } = err else {
            panic!("expected InvalidValue");
        };
        assert_eq!(key, "WORKBOOK_FILE");
        assert!(message.contains(".."), "unexpected message: {message}");
    }

    #[test]
    fn validate_file_name_rejects_nested_paths() {
        let err = super::validate_file_name("TEMPLATE_LABEL", "labels/small.html")
            .expect_err("must reject nested path");
        let ConfigError::InvalidValue { message, .. } = err else {
            panic!("expected InvalidValue");
        };
        assert!(message.contains("basename"), "unexpected message: {message}");
    }

    #[test]
    fn validate_file_name_rejects_empty() {
        let err = super::validate_file_name("WORKBOOK_FILE", "   ").expect_err("empty");
        let ConfigError::InvalidValue { message, .. } = err else {
            panic!("expected InvalidValue");
        };
        assert!(message.contains("empty"), "unexpected message: {message}");
    }

    #[test]
    fn label_columns_must_be_in_range() {
        assert!(super::validate_label_columns(0).is_err());
        assert!(super::validate_label_columns(13).is_err());
        assert_eq!(super::validate_label_columns(5).expect("valid"), 5);
    }

    #[test]
    fn resolve_rejects_zero_label_columns_from_settings() {
        let mut settings = Settings::default();
        settings.labels.columns_per_row = 0;

        let err = super::InventoryConfig::resolve(&settings).expect_err("must reject");
        let ConfigError::InvalidValue { key, .. } = err else {
            panic!("expected InvalidValue");
        };
        assert_eq!(key, "LABEL_COLUMNS_PER_ROW");
    }
}
