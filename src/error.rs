//! Error types for the sample inventory service.

use std::path::PathBuf;

/// Configuration resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to read settings file {path:?}: {reason}")]
    SettingsFile { path: PathBuf, reason: String },
}

/// Failures at the whole-workbook persistence boundary.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read workbook {path:?}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to write workbook {path:?}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("cell ({row}, {col}) is outside the worksheet limits")]
    OutOfBounds { row: usize, col: usize },

    #[error("storage task failed: {0}")]
    Task(String),
}

/// Row store operation failures.
#[derive(Debug, thiserror::Error)]
pub enum RowStoreError {
    #[error("缺少欄位: {}", missing_fields.join(", "))]
    Validation { missing_fields: Vec<String> },

    #[error("Row not found for caseNo '{case_no}' and customerName '{customer_name}'")]
    NotFound {
        case_no: String,
        customer_name: String,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RowStoreError {
    /// Missing-field identifiers when this is a validation failure.
    pub fn missing_fields(&self) -> Option<&[String]> {
        match self {
            Self::Validation { missing_fields } => Some(missing_fields),
            _ => None,
        }
    }
}

/// Document rendering failures.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Template not found: {path:?}")]
    TemplateNotFound { path: PathBuf },

    #[error("failed to read template {path:?}: {reason}")]
    TemplateRead { path: PathBuf, reason: String },

    #[error("failed to render template: {0}")]
    Render(String),

    #[error("標籤數量 {requested} 超過上限 {limit}")]
    TooManyLabels { requested: u64, limit: u32 },
}

/// HTTP server startup failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to start server on {addr}: {reason}")]
    StartupFailed { addr: String, reason: String },
}
