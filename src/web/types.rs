//! Request and response DTOs for the HTTP API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::{DocumentError, RowStoreError, StorageError};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowQuery {
    pub case_no: Option<String>,
    pub customer_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An error answered with a JSON body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                message: message.into(),
                missing_fields: None,
                error: None,
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 500 carrying the underlying failure in `error`.
    pub fn internal(message: impl Into<String>, err: impl std::fmt::Display) -> Self {
        let mut api = Self::new(StatusCode::INTERNAL_SERVER_ERROR, message);
        api.body.error = Some(err.to_string());
        api
    }

    /// Map a row store failure; `failure` is the message used for storage errors.
    pub fn from_row_store(err: RowStoreError, failure: &str) -> Self {
        match err {
            RowStoreError::Validation { .. } => {
                let message = err.to_string();
                let mut api = Self::bad_request(message);
                api.body.missing_fields = err.missing_fields().map(<[String]>::to_vec);
                api
            }
            RowStoreError::NotFound { .. } => Self::not_found("找不到要覆蓋的列"),
            RowStoreError::Storage(e) => Self::from_storage(e, failure),
        }
    }

    pub fn from_storage(err: StorageError, failure: &str) -> Self {
        tracing::error!("{}: {}", failure, err);
        Self::internal(failure, err)
    }

    pub fn from_document(err: DocumentError) -> Self {
        if let DocumentError::TooManyLabels { .. } = err {
            return Self::bad_request(err.to_string());
        }
        tracing::error!("Document generation failed: {}", err);
        Self::internal("產生文件失敗", err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
