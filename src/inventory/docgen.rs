use std::path::Path;

use chrono::Utc;
use tera::Context;

use crate::error::DocumentError;
use crate::inventory::labels::{build_label_rows, build_labels_from_form};
use crate::inventory::record::FormRecord;

/// The three printable documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Intake/return form QE-02-04.
    Qe0204,
    OuterBox,
    Labels,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qe0204 => "qe0204",
            Self::OuterBox => "outer-box",
            Self::Labels => "labels",
        }
    }

    /// Leading part of the download file name.
    pub fn file_prefix(self) -> &'static str {
        match self {
            Self::Qe0204 => "QE-02-04",
            Self::OuterBox => "外箱標誌",
            Self::Labels => "樣品小標籤",
        }
    }
}

/// A rendered document ready to be sent as an attachment.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub filename: String,
    pub content_type: String,
    pub body: String,
}

pub fn qe0204_context(form: &FormRecord) -> serde_json::Value {
    let samples: Vec<serde_json::Value> = form
        .sample_items
        .iter()
        .map(|item| {
            serde_json::json!({
                "sampleNo": item.sample_no,
                "sampleName": item.sample_name,
                "remark": item.remark,
                "qty": item.effective_qty(),
            })
        })
        .collect();
    serde_json::json!({
        "inOperator": form.in_operator,
        "inDate": form.in_date,
        "returnOperator": form.return_operator,
        "returnDate": form.return_date,
        "customerName": form.customer_name,
        "caseNo": form.case_no,
        "totalInQty": form.total_in_qty,
        "samples": samples,
    })
}

pub fn outer_box_context(form: &FormRecord) -> serde_json::Value {
    serde_json::json!({
        "caseNo": form.case_no,
        "quoteNo": form.quote_no,
        "customerName": form.customer_name,
        "model": form.model,
        "totalInQty": form.total_in_qty,
        "inDate": form.in_date,
    })
}

/// Label sheet context: the flat label list plus the same labels laid out
/// `columns_per_row` to a row (absent slots render as null).
pub fn label_context(
    form: &FormRecord,
    columns_per_row: usize,
) -> Result<serde_json::Value, DocumentError> {
    let labels = build_labels_from_form(form)?;
    let rows = build_label_rows(&labels, columns_per_row);
    Ok(serde_json::json!({
        "labelCaseNo": form.case_no,
        "customerName": form.customer_name,
        "model": form.model,
        "inDate": form.in_date,
        "labels": labels,
        "rows": rows,
    }))
}

pub fn build_context(
    kind: DocumentKind,
    form: &FormRecord,
    columns_per_row: usize,
) -> Result<serde_json::Value, DocumentError> {
    let mut context = match kind {
        DocumentKind::Qe0204 => qe0204_context(form),
        DocumentKind::OuterBox => outer_box_context(form),
        DocumentKind::Labels => label_context(form, columns_per_row)?,
    };
    if let Some(map) = context.as_object_mut() {
        map.insert(
            "generatedAt".to_string(),
            serde_json::Value::String(Utc::now().to_rfc3339()),
        );
    }
    Ok(context)
}

pub fn render_template(
    body: &str,
    context: &serde_json::Value,
    autoescape: bool,
) -> Result<String, DocumentError> {
    let map = context.as_object().ok_or_else(|| {
        DocumentError::Render("template context must be a JSON object at the root".to_string())
    })?;
    let mut tera_context = Context::new();
    for (key, value) in map {
        tera_context.insert(key, value);
    }

    tera::Tera::one_off(body, &tera_context, autoescape)
        .map_err(|err| DocumentError::Render(err.to_string()))
}

/// `<prefix>_<caseNo or unknown>_<inDate or date>.<template extension>`
pub fn document_filename(kind: DocumentKind, form: &FormRecord, template: &Path) -> String {
    let or_default = |value: &str, default: &'static str| -> String {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            default.to_string()
        } else {
            trimmed.to_string()
        }
    };
    let ext = template
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("txt");
    format!(
        "{}_{}_{}.{}",
        kind.file_prefix(),
        or_default(&form.case_no, "unknown"),
        or_default(&form.in_date, "date"),
        ext
    )
}

fn is_html(template: &Path) -> bool {
    template
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
}

/// Read `template`, fill it from `form`, and name the result.
///
/// The payload is built before the template is read, so an oversized label
/// request fails without touching the filesystem.
pub async fn render_document(
    kind: DocumentKind,
    template: &Path,
    form: &FormRecord,
    columns_per_row: usize,
) -> Result<RenderedDocument, DocumentError> {
    let context = build_context(kind, form, columns_per_row)?;
    let body = match tokio::fs::read_to_string(template).await {
        Ok(body) => body,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(DocumentError::TemplateNotFound {
                path: template.to_path_buf(),
            });
        }
        Err(err) => {
            return Err(DocumentError::TemplateRead {
                path: template.to_path_buf(),
                reason: err.to_string(),
            });
        }
    };

    let rendered = render_template(&body, &context, is_html(template))?;

    let mime = mime_guess::from_path(template).first_or_octet_stream();
    let content_type = if mime.type_() == mime_guess::mime::TEXT {
        format!("{mime}; charset=utf-8")
    } else {
        mime.to_string()
    };

    tracing::debug!(
        kind = kind.as_str(),
        template = %template.display(),
        "Rendered document"
    );
    Ok(RenderedDocument {
        filename: document_filename(kind, form, template),
        content_type,
        body: rendered,
    })
}
