//! Axum HTTP server for the ledger API.
//!
//! Routes: health, ledger rows (read/add/overwrite), workbook download and
//! upload, and the three rendered documents.

use std::net::SocketAddr;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{HeaderValue, Method, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use tokio::sync::oneshot;
use tower_http::cors::{AllowHeaders, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::InventoryConfig;
use crate::db::validate_xlsx_bytes;
use crate::error::ServerError;
use crate::inventory::backup::replace_workbook;
use crate::inventory::docgen::{DocumentKind, render_document};
use crate::inventory::record::FormRecord;
use crate::inventory::store::{RowStore, StoredRow};
use crate::web::types::{ApiError, HealthResponse, MessageResponse, RowQuery};

/// Request and upload body limit.
const BODY_LIMIT: usize = 10 * 1024 * 1024;

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const KEY_REQUIRED: &str = "caseNo 和 customerName 必填";

/// Shared state for all handlers.
pub struct AppState {
    pub store: RowStore,
    pub config: InventoryConfig,
    pub shutdown_tx: tokio::sync::RwLock<Option<oneshot::Sender<()>>>,
}

impl AppState {
    pub fn new(store: RowStore, config: InventoryConfig) -> Self {
        Self {
            store,
            config,
            shutdown_tx: tokio::sync::RwLock::new(None),
        }
    }

    /// Ask a running server to stop accepting connections.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
        }
    }
}

/// Build the router with CORS, body limit, and tracing layers applied.
pub fn build_router(state: Arc<AppState>) -> Result<Router, ServerError> {
    let origin = HeaderValue::from_str(&state.config.server.client_origin).map_err(|e| {
        ServerError::StartupFailed {
            addr: state.config.server.client_origin.clone(),
            reason: format!("invalid CLIENT_ORIGIN: {e}"),
        }
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(AllowHeaders::list([header::CONTENT_TYPE]))
        .allow_credentials(true);

    let excel = Router::new()
        .route("/row", get(row_handler))
        .route("/add", post(add_handler))
        .route("/overwrite", post(overwrite_handler))
        .route("/download", get(download_handler))
        .route("/upload", post(upload_handler));

    let docs = Router::new()
        .route("/qe0204", post(qe0204_handler))
        .route("/outer-box", post(outer_box_handler))
        .route("/labels", post(labels_handler));

    Ok(Router::new()
        .route("/health", get(health_handler))
        .nest("/api/excel", excel)
        .nest("/api/docs", docs)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Start the HTTP server.
///
/// Returns the actual bound `SocketAddr` (useful when binding to port 0).
pub async fn start_server(
    addr: SocketAddr,
    state: Arc<AppState>,
) -> Result<SocketAddr, ServerError> {
    let startup_err = |reason: String| ServerError::StartupFailed {
        addr: addr.to_string(),
        reason,
    };
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| startup_err(format!("failed to bind: {e}")))?;
    let bound_addr = listener
        .local_addr()
        .map_err(|e| startup_err(format!("failed to get local addr: {e}")))?;

    let app = build_router(state.clone())?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    *state.shutdown_tx.write().await = Some(shutdown_tx);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("HTTP server shutting down");
            })
            .await
        {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tracing::info!("Listening on http://{}", bound_addr);
    Ok(bound_addr)
}

/// `attachment; filename="<enc>"; filename*=UTF-8''<enc>`
fn attachment(filename: &str) -> Result<HeaderValue, ApiError> {
    let encoded = urlencoding::encode(filename);
    HeaderValue::from_str(&format!(
        "attachment; filename=\"{encoded}\"; filename*=UTF-8''{encoded}"
    ))
    .map_err(|e| ApiError::internal("無法產生下載檔名", e))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// --- Ledger rows ---

async fn row_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RowQuery>,
) -> Result<Json<StoredRow>, ApiError> {
    let case_no = query.case_no.as_deref().unwrap_or_default().trim();
    let customer_name = query.customer_name.as_deref().unwrap_or_default().trim();
    if case_no.is_empty() || customer_name.is_empty() {
        return Err(ApiError::bad_request(KEY_REQUIRED));
    }

    match state.store.read_row(case_no, customer_name).await {
        Ok(Some(stored)) => Ok(Json(stored)),
        Ok(None) => Err(ApiError::not_found("查無此樣品總編號 + 客戶名稱的資料")),
        Err(e) => Err(ApiError::from_row_store(e, "讀取失敗")),
    }
}

async fn add_handler(
    State(state): State<Arc<AppState>>,
    Json(form): Json<FormRecord>,
) -> Result<Json<StoredRow>, ApiError> {
    state
        .store
        .add_row(&form)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_row_store(e, "新增失敗"))
}

async fn overwrite_handler(
    State(state): State<Arc<AppState>>,
    Json(form): Json<FormRecord>,
) -> Result<Json<StoredRow>, ApiError> {
    if form.case_no.trim().is_empty() || form.customer_name.trim().is_empty() {
        return Err(ApiError::bad_request(KEY_REQUIRED));
    }
    state
        .store
        .overwrite_row(&form)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_row_store(e, "覆蓋失敗"))
}

// --- Workbook file ---

async fn download_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let path = &state.config.workbook_path;
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("Excel 檔案不存在"));
        }
        Err(e) => return Err(ApiError::internal("讀取失敗", e)),
    };

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook.xlsx".to_string());
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(XLSX_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, attachment(&filename)?),
        ],
        bytes,
    )
        .into_response())
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut upload: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Multipart read error: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if !FsPath::new(&file_name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"))
        {
            return Err(ApiError::bad_request("Only .xlsx files are allowed"));
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload body: {e}")))?;
        upload = Some(data.to_vec());
        break;
    }

    let Some(bytes) = upload else {
        return Err(ApiError::bad_request("請提供 .xlsx 檔案"));
    };
    validate_xlsx_bytes(&bytes).map_err(|e| {
        let mut api = ApiError::bad_request("上傳的檔案不是有效的 .xlsx 活頁簿");
        api.body.error = Some(e.to_string());
        api
    })?;

    let path = state.config.workbook_path.clone();
    let backup = tokio::task::spawn_blocking(move || replace_workbook(&path, &bytes, Utc::now()))
        .await
        .map_err(|e| ApiError::internal("上傳失敗", e))?
        .map_err(|e| ApiError::from_storage(e, "上傳失敗"))?;

    Ok(Json(MessageResponse {
        message: "已覆蓋伺服器 Excel 檔".to_string(),
        backup: backup.map(|path| path.display().to_string()),
    }))
}

// --- Documents ---

async fn render(
    state: &AppState,
    kind: DocumentKind,
    form: &FormRecord,
) -> Result<Response, ApiError> {
    let templates = &state.config.templates;
    let template = match kind {
        DocumentKind::Qe0204 => &templates.qe0204,
        DocumentKind::OuterBox => &templates.outer_box,
        DocumentKind::Labels => &templates.label,
    };
    let doc = render_document(kind, template, form, state.config.label_columns_per_row)
        .await
        .map_err(ApiError::from_document)?;

    let content_type = HeaderValue::from_str(&doc.content_type)
        .map_err(|e| ApiError::internal("產生文件失敗", e))?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, attachment(&doc.filename)?),
        ],
        doc.body,
    )
        .into_response())
}

async fn qe0204_handler(
    State(state): State<Arc<AppState>>,
    Json(form): Json<FormRecord>,
) -> Result<Response, ApiError> {
    render(&state, DocumentKind::Qe0204, &form).await
}

async fn outer_box_handler(
    State(state): State<Arc<AppState>>,
    Json(form): Json<FormRecord>,
) -> Result<Response, ApiError> {
    render(&state, DocumentKind::OuterBox, &form).await
}

async fn labels_handler(
    State(state): State<Arc<AppState>>,
    Json(form): Json<FormRecord>,
) -> Result<Response, ApiError> {
    render(&state, DocumentKind::Labels, &form).await
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use super::{AppState, attachment, build_router};
    use crate::config::{InventoryConfig, ServerConfig, TemplatePaths};
    use crate::db::MemoryBackend;
    use crate::inventory::RowStore;

    fn memory_state() -> Arc<AppState> {
        let config = InventoryConfig {
            data_dir: PathBuf::from("data"),
            workbook_path: PathBuf::from("data/QE-02-01.xlsx"),
            templates: TemplatePaths {
                qe0204: PathBuf::from("data/templates/qe0204.html"),
                outer_box: PathBuf::from("data/templates/box.html"),
                label: PathBuf::from("data/templates/labels.html"),
            },
            label_columns_per_row: 3,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                client_origin: "http://localhost:5173".to_string(),
            },
        };
        Arc::new(AppState::new(
            RowStore::new(Arc::new(MemoryBackend::new())),
            config,
        ))
    }

    #[test]
    fn attachment_header_percent_encodes_unicode_names() {
        let value = attachment("外箱標誌_C100_date.html").expect("header");
        let text = value.to_str().expect("ascii header");
        assert!(text.starts_with("attachment; filename=\"%E5%A4%96"));
        assert!(text.ends_with("filename*=UTF-8''%E5%A4%96%E7%AE%B1%E6%A8%99%E8%AA%8C_C100_date.html"));
    }

    #[tokio::test]
    async fn add_then_read_through_router() {
        let app = build_router(memory_state()).expect("router");
        let form = serde_json::json!({
            "caseNo": "C1", "quoteNo": "Q", "customerName": "ACME", "productName": "P",
            "model": "M", "sales": "S", "inOperator": "I", "inDate": "2025-01-01",
            "totalInQty": 1,
            "sampleItems": [{"sampleNo": "A1", "sampleName": "Alpha"}]
        });

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/excel/add")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(form.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get("/api/excel/row?caseNo=C1&customerName=ACME")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["rowIndex"], 2);
        assert_eq!(body["data"]["sampleItems"][0]["sampleName"], "Alpha");
    }

    #[tokio::test]
    async fn oversized_label_quantity_is_rejected() {
        let app = build_router(memory_state()).expect("router");
        let form = serde_json::json!({
            "caseNo": "C1",
            "customerName": "ACME",
            "sampleItems": [{"sampleNo": "S-001", "sampleName": "W", "qty": u32::MAX}]
        });

        let response = app
            .oneshot(
                Request::post("/api/docs/labels")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(form.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["message"], "標籤數量 4294967295 超過上限 1000");
    }

    #[tokio::test]
    async fn cors_allows_configured_origin_only() {
        let app = build_router(memory_state()).expect("router");
        let response = app
            .oneshot(
                Request::get("/health")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:5173")
        );
        assert_eq!(
            response
                .headers()
                .get(header::X_CONTENT_TYPE_OPTIONS)
                .and_then(|v| v.to_str().ok()),
            Some("nosniff")
        );
    }

    #[test]
    fn invalid_client_origin_fails_router_build() {
        let state = memory_state();
        let mut config = state.config.clone();
        config.server.client_origin = "bad\norigin".to_string();
        let state = Arc::new(AppState::new(
            RowStore::new(Arc::new(MemoryBackend::new())),
            config,
        ));
        assert!(build_router(state).is_err());
    }
}
