//! Sample inventory ledger: form records, the workbook row store, label
//! expansion, and document payloads.

pub mod backup;
pub mod docgen;
pub mod headers;
pub mod labels;
pub mod record;
pub mod remark;
pub mod store;

pub use docgen::{DocumentKind, RenderedDocument, render_document};
pub use headers::{HeaderKey, ensure_header_row, resolve_column};
pub use labels::{Label, MAX_LABELS, build_label_codes, build_label_rows, build_labels_from_form};
pub use record::{FormRecord, MAX_SAMPLE_ITEMS, SampleItem, missing_fields, normalize_sample_items};
pub use remark::{EXTRA_SAMPLES_MARKER, ParsedRemark, build_remark, parse_remark};
pub use store::{RowStore, StoredRow, find_row};
