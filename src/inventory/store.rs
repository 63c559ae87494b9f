//! Row store over the first worksheet of the ledger workbook.
//!
//! Each operation loads the whole workbook, mutates it in memory, and (for
//! writes) saves it back. Nothing is cached between calls and nothing is
//! locked: concurrent writers race and the last save wins.

use std::sync::Arc;

use serde::Serialize;

use crate::db::{Cell, Sheet, TableBackend, Workbook};
use crate::error::{RowStoreError, StorageError};
use crate::inventory::headers::{HeaderKey, ensure_header_row, resolve_column};
use crate::inventory::record::{
    FormRecord, MAX_SAMPLE_ITEMS, SampleItem, count_from_f64, integer_from_f64, missing_fields,
    normalize_sample_items,
};
use crate::inventory::remark::{build_remark, parse_remark};

/// A record together with the physical row it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRow {
    pub row_index: usize,
    pub data: FormRecord,
}

/// First data row whose case number and customer name match, after trimming.
pub fn find_row(sheet: &Sheet, case_no: &str, customer_name: &str) -> Option<usize> {
    let case_col = resolve_column(sheet, HeaderKey::CaseNo.label())?;
    let customer_col = resolve_column(sheet, HeaderKey::CustomerName.label())?;
    let (case_no, customer_name) = (case_no.trim(), customer_name.trim());

    (2..=sheet.row_count()).find(|&row| {
        sheet.cell(row, case_col).as_text().trim() == case_no
            && sheet.cell(row, customer_col).as_text().trim() == customer_name
    })
}

fn set_field(sheet: &mut Sheet, row: usize, key: HeaderKey, value: Cell) {
    // Columns are resolved per write; a header missing here was never repaired.
    if let Some(col) = resolve_column(sheet, key.label()) {
        sheet.set_cell(row, col, value);
    }
}

fn text_cell(value: &str) -> Cell {
    if value.is_empty() {
        Cell::Empty
    } else {
        Cell::from(value)
    }
}

fn number_cell<N: Into<f64>>(value: Option<N>) -> Cell {
    value.map_or(Cell::Empty, |n| Cell::Number(n.into()))
}

/// Write every field of `form` into `row`, packing extra samples into the remark cell.
pub fn write_record(sheet: &mut Sheet, row: usize, form: &FormRecord) {
    let samples = normalize_sample_items(&form.sample_items);
    let (primary, extras) = match samples.split_first() {
        Some((primary, extras)) => (primary.clone(), extras),
        None => (SampleItem::default(), &[][..]),
    };
    let remark = build_remark(&primary.remark, extras);

    let text_fields = [
        (HeaderKey::CaseNo, form.case_no.as_str()),
        (HeaderKey::QuoteNo, form.quote_no.as_str()),
        (HeaderKey::CustomerName, form.customer_name.as_str()),
        (HeaderKey::ProductName, form.product_name.as_str()),
        (HeaderKey::Model, form.model.as_str()),
        (HeaderKey::Sales, form.sales.as_str()),
        (HeaderKey::InOperator, form.in_operator.as_str()),
        (HeaderKey::InDate, form.in_date.as_str()),
        (HeaderKey::SampleNo, primary.sample_no.as_str()),
        (HeaderKey::SampleName, primary.sample_name.as_str()),
        (HeaderKey::Remark, remark.as_str()),
        (HeaderKey::BorrowDate, form.borrow_date.as_str()),
        (HeaderKey::Borrower, form.borrower.as_str()),
        (HeaderKey::ReturnDate, form.return_date.as_str()),
        (HeaderKey::ReturnOperator, form.return_operator.as_str()),
        (HeaderKey::OutDate, form.out_date.as_str()),
    ];
    for (key, value) in text_fields {
        set_field(sheet, row, key, text_cell(value));
    }

    set_field(sheet, row, HeaderKey::TotalInQty, number_cell(form.total_in_qty));
    set_field(
        sheet,
        row,
        HeaderKey::OutQty,
        number_cell(form.out_qty.map(|n| n as f64)),
    );
}

fn field(sheet: &Sheet, row: usize, key: HeaderKey) -> &Cell {
    static EMPTY: Cell = Cell::Empty;
    resolve_column(sheet, key.label()).map_or(&EMPTY, |col| sheet.cell(row, col))
}

/// Rebuild a record from `row`, decoding packed extra samples.
pub fn read_record(sheet: &Sheet, row: usize) -> FormRecord {
    let cell = |key: HeaderKey| field(sheet, row, key);
    let text = |key: HeaderKey| field(sheet, row, key).as_text();

    let parsed = parse_remark(&text(HeaderKey::Remark));
    let primary = SampleItem {
        sample_no: text(HeaderKey::SampleNo),
        sample_name: text(HeaderKey::SampleName),
        qty: None,
        remark: parsed.remark,
    };
    let sample_items: Vec<SampleItem> = std::iter::once(primary)
        .chain(parsed.extra_samples)
        .take(MAX_SAMPLE_ITEMS)
        .collect();

    FormRecord {
        case_no: text(HeaderKey::CaseNo),
        quote_no: text(HeaderKey::QuoteNo),
        customer_name: text(HeaderKey::CustomerName),
        product_name: text(HeaderKey::ProductName),
        model: text(HeaderKey::Model),
        sales: text(HeaderKey::Sales),
        in_operator: text(HeaderKey::InOperator),
        in_date: text(HeaderKey::InDate),
        total_in_qty: Some(
            cell(HeaderKey::TotalInQty)
                .as_number()
                .and_then(count_from_f64)
                .unwrap_or(0),
        ),
        sample_items,
        borrow_date: text(HeaderKey::BorrowDate),
        borrower: text(HeaderKey::Borrower),
        return_date: text(HeaderKey::ReturnDate),
        return_operator: text(HeaderKey::ReturnOperator),
        out_date: text(HeaderKey::OutDate),
        out_qty: cell(HeaderKey::OutQty)
            .as_number()
            .and_then(integer_from_f64),
    }
}

/// Find-or-append storage of form records in a single workbook.
#[derive(Clone)]
pub struct RowStore {
    backend: Arc<dyn TableBackend>,
}

impl std::fmt::Debug for RowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStore")
            .field("location", &self.backend.location())
            .finish()
    }
}

impl RowStore {
    pub fn new(backend: Arc<dyn TableBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn TableBackend> {
        &self.backend
    }

    /// Load the workbook, creating it with the canonical header row if absent.
    ///
    /// A fresh workbook is saved immediately. Header repairs on an existing
    /// workbook stay in memory until the next write.
    pub async fn ensure_workbook(&self) -> Result<Workbook, StorageError> {
        let Some(mut workbook) = self.backend.load().await? else {
            let mut workbook = Workbook::with_default_sheet();
            ensure_header_row(workbook.first_sheet_mut());
            self.backend.save(&workbook).await?;
            tracing::info!("Created ledger workbook at {}", self.backend.location());
            return Ok(workbook);
        };

        let added = ensure_header_row(workbook.first_sheet_mut());
        if !added.is_empty() {
            tracing::warn!(
                location = %self.backend.location(),
                added = ?added,
                "Ledger header row was missing columns; appended them"
            );
        }
        Ok(workbook)
    }

    /// Record stored under the composite key, or `None`.
    pub async fn read_row(
        &self,
        case_no: &str,
        customer_name: &str,
    ) -> Result<Option<StoredRow>, RowStoreError> {
        let mut workbook = self.ensure_workbook().await?;
        let sheet = workbook.first_sheet_mut();
        let found = find_row(sheet, case_no, customer_name).map(|row_index| StoredRow {
            row_index,
            data: read_record(sheet, row_index),
        });
        tracing::debug!(
            case_no,
            customer_name,
            row = ?found.as_ref().map(|stored| stored.row_index),
            "Ledger lookup"
        );
        Ok(found)
    }

    /// Validate and append `form` as a new row. Duplicate keys are not checked.
    pub async fn add_row(&self, form: &FormRecord) -> Result<StoredRow, RowStoreError> {
        let missing = missing_fields(form);
        if !missing.is_empty() {
            return Err(RowStoreError::Validation {
                missing_fields: missing,
            });
        }

        let mut workbook = self.ensure_workbook().await?;
        let sheet = workbook.first_sheet_mut();
        let row_index = sheet.row_count() + 1;
        let data = form.normalized();
        write_record(sheet, row_index, &data);
        self.backend.save(&workbook).await?;

        tracing::info!(
            row = row_index,
            case_no = %data.case_no,
            customer_name = %data.customer_name,
            "Appended ledger row"
        );
        Ok(StoredRow { row_index, data })
    }

    /// Merge `form` onto the stored row with the same key and write it back in place.
    pub async fn overwrite_row(&self, form: &FormRecord) -> Result<StoredRow, RowStoreError> {
        let mut workbook = self.ensure_workbook().await?;
        let sheet = workbook.first_sheet_mut();
        let Some(row_index) = find_row(sheet, &form.case_no, &form.customer_name) else {
            return Err(RowStoreError::NotFound {
                case_no: form.case_no.clone(),
                customer_name: form.customer_name.clone(),
            });
        };

        let data = read_record(sheet, row_index).merged_with(form);
        let missing = missing_fields(&data);
        if !missing.is_empty() {
            return Err(RowStoreError::Validation {
                missing_fields: missing,
            });
        }

        write_record(sheet, row_index, &data);
        self.backend.save(&workbook).await?;

        tracing::info!(
            row = row_index,
            case_no = %data.case_no,
            customer_name = %data.customer_name,
            "Overwrote ledger row"
        );
        Ok(StoredRow { row_index, data })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::{RowStore, find_row, read_record, write_record};
    use crate::db::{Cell, MemoryBackend, Sheet, TableBackend, Workbook, XlsxBackend};
    use crate::error::RowStoreError;
    use crate::inventory::headers::{HeaderKey, ensure_header_row, resolve_column};
    use crate::inventory::record::tests::complete_form;
    use crate::inventory::record::{FormRecord, SampleItem};
    use crate::inventory::remark::EXTRA_SAMPLES_MARKER;

    fn memory_store() -> (Arc<MemoryBackend>, RowStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = RowStore::new(backend.clone());
        (backend, store)
    }

    fn header_row(backend: &MemoryBackend) -> Vec<String> {
        backend
            .snapshot()
            .expect("workbook")
            .sheets[0]
            .row_cells(1)
            .iter()
            .map(Cell::as_text)
            .collect()
    }

    #[tokio::test]
    async fn ensure_workbook_creates_canonical_header_once() {
        let (backend, store) = memory_store();

        store.ensure_workbook().await.expect("first ensure");
        let first = header_row(&backend);
        store.ensure_workbook().await.expect("second ensure");

        let canonical: Vec<String> = HeaderKey::ALL
            .iter()
            .map(|key| key.label().to_string())
            .collect();
        assert_eq!(first, canonical);
        assert_eq!(header_row(&backend), canonical);
        assert_eq!(backend.snapshot().expect("workbook").sheets[0].row_count(), 1);
    }

    #[tokio::test]
    async fn legacy_layout_is_repaired_and_used_for_writes() {
        let mut legacy = Sheet::new("Ledger");
        legacy.append_row(vec![
            Cell::from("Legacy Notes"),
            Cell::from("客戶名稱"),
            Cell::from("樣品總編號"),
        ]);
        legacy.append_row(vec![Cell::from("keep"), Cell::from("Old Co"), Cell::from("C001")]);
        let backend = Arc::new(MemoryBackend::with_workbook(Workbook {
            sheets: vec![legacy],
        }));
        let store = RowStore::new(backend.clone());

        let stored = store.add_row(&complete_form()).await.expect("add");
        assert_eq!(stored.row_index, 3);

        let saved = backend.snapshot().expect("workbook");
        let sheet = &saved.sheets[0];
        assert_eq!(sheet.name, "Ledger");
        assert_eq!(sheet.cell(1, 1).as_text(), "Legacy Notes");
        assert_eq!(sheet.cell(2, 1).as_text(), "keep");
        assert_eq!(sheet.cell(3, 2).as_text(), "ACME");
        assert_eq!(sheet.cell(3, 3).as_text(), "C100");
        assert_eq!(sheet.cell(3, 1), &Cell::Empty);

        let quote_col = resolve_column(sheet, "報價單編號").expect("quote column appended");
        assert_eq!(quote_col, 4);
        assert_eq!(sheet.cell(3, quote_col).as_text(), "Q-7");

        let old = store.read_row("C001", "Old Co").await.expect("read");
        assert_eq!(old.expect("legacy row").data.total_in_qty, Some(0));
    }

    #[tokio::test]
    async fn add_rejects_incomplete_form_without_writing() {
        let (backend, store) = memory_store();
        let mut form = complete_form();
        form.model.clear();
        form.sample_items[0].sample_name.clear();

        let err = store.add_row(&form).await.expect_err("validation");
        assert_eq!(
            err.missing_fields().expect("validation error"),
            ["model".to_string(), "sampleItems[0].sampleName".to_string()]
        );
        assert!(backend.snapshot().is_none());
    }

    #[tokio::test]
    async fn duplicate_adds_create_rows_and_read_returns_the_first() {
        let (_backend, store) = memory_store();
        let first = complete_form();
        let mut second = complete_form();
        second.model = "G-2".to_string();

        assert_eq!(store.add_row(&first).await.expect("add").row_index, 2);
        assert_eq!(store.add_row(&second).await.expect("add").row_index, 3);

        let found = store
            .read_row(" C100 ", "ACME")
            .await
            .expect("read")
            .expect("row");
        assert_eq!(found.row_index, 2);
        assert_eq!(found.data.model, "G-1");
    }

    #[tokio::test]
    async fn read_missing_key_returns_none() {
        let (_backend, store) = memory_store();
        store.add_row(&complete_form()).await.expect("add");
        assert!(store.read_row("C100", "Other").await.expect("read").is_none());
    }

    #[tokio::test]
    async fn extra_samples_survive_a_round_trip() {
        let (backend, store) = memory_store();
        let mut form = complete_form();
        form.sample_items = vec![
            SampleItem::new("S-001", "Widget").with_remark("top"),
            SampleItem::new("S-002", "Gadget").with_qty(2),
            SampleItem::new("S-003", "Gizmo").with_remark("cracked"),
        ];

        store.add_row(&form).await.expect("add");

        let saved = backend.snapshot().expect("workbook");
        let sheet = &saved.sheets[0];
        let remark_col = resolve_column(sheet, "備註").expect("remark column");
        let raw = sheet.cell(2, remark_col).as_text();
        assert!(raw.starts_with(&format!("top\n{EXTRA_SAMPLES_MARKER}[")));

        let data = store
            .read_row("C100", "ACME")
            .await
            .expect("read")
            .expect("row")
            .data;
        assert_eq!(data.sample_items, form.sample_items);
        assert_eq!(data.total_in_qty, Some(3));
        assert_eq!(data.out_qty, None);
    }

    #[tokio::test]
    async fn overwrite_with_empty_samples_keeps_stored_samples() {
        let (_backend, store) = memory_store();
        let mut form = complete_form();
        form.sample_items = vec![SampleItem::new("A", "Alpha"), SampleItem::new("B", "Beta")];
        store.add_row(&form).await.expect("add");

        let incoming = FormRecord {
            case_no: "C100".to_string(),
            customer_name: "ACME".to_string(),
            borrower: "Chen".to_string(),
            out_qty: Some(1),
            ..FormRecord::default()
        };
        let stored = store.overwrite_row(&incoming).await.expect("overwrite");

        assert_eq!(stored.row_index, 2);
        assert_eq!(stored.data.sample_items, form.sample_items);
        assert_eq!(stored.data.borrower, "Chen");
        assert_eq!(stored.data.model, "G-1");

        let reread = store
            .read_row("C100", "ACME")
            .await
            .expect("read")
            .expect("row");
        assert_eq!(reread, stored);
    }

    #[tokio::test]
    async fn overwrite_unknown_key_is_not_found() {
        let (_backend, store) = memory_store();
        store.add_row(&complete_form()).await.expect("add");

        let incoming = FormRecord {
            case_no: "C999".to_string(),
            customer_name: "ACME".to_string(),
            ..FormRecord::default()
        };
        let err = store.overwrite_row(&incoming).await.expect_err("missing row");
        assert!(matches!(err, RowStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn overwrite_revalidates_merged_record() {
        let mut legacy = Sheet::new("Sheet1");
        ensure_header_row(&mut legacy);
        let mut partial = complete_form();
        partial.model.clear();
        write_record(&mut legacy, 2, &partial);
        let store = RowStore::new(Arc::new(MemoryBackend::with_workbook(Workbook {
            sheets: vec![legacy],
        })));

        let incoming = FormRecord {
            case_no: "C100".to_string(),
            customer_name: "ACME".to_string(),
            ..FormRecord::default()
        };
        let err = store.overwrite_row(&incoming).await.expect_err("still invalid");
        assert_eq!(err.missing_fields().expect("validation"), ["model".to_string()]);
    }

    #[test]
    fn find_row_without_key_columns_finds_nothing() {
        let mut sheet = Sheet::new("Sheet1");
        sheet.append_row(vec![Cell::from("unrelated")]);
        sheet.append_row(vec![Cell::from("C100")]);
        assert_eq!(find_row(&sheet, "C100", "ACME"), None);
    }

    #[test]
    fn numeric_cells_read_back_as_text_and_counts() {
        let mut sheet = Sheet::new("Sheet1");
        ensure_header_row(&mut sheet);
        let case_col = resolve_column(&sheet, "樣品總編號").expect("case column");
        let total_col = resolve_column(&sheet, "入庫總數量").expect("total column");
        let out_col = resolve_column(&sheet, "樣品出庫數").expect("out column");
        sheet.set_cell(2, case_col, Cell::Number(100.0));
        sheet.set_cell(2, total_col, Cell::from(" 7 "));
        sheet.set_cell(2, out_col, Cell::from("n/a"));

        let record = read_record(&sheet, 2);
        assert_eq!(record.case_no, "100");
        assert_eq!(record.total_in_qty, Some(7));
        assert_eq!(record.out_qty, None);
        assert_eq!(record.sample_items, vec![SampleItem::default()]);
    }

    #[tokio::test]
    async fn rows_persist_through_the_xlsx_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend: Arc<dyn TableBackend> =
            Arc::new(XlsxBackend::new(dir.path().join("QE-02-01.xlsx")));
        let store = RowStore::new(backend);

        let mut form = complete_form();
        form.out_qty = Some(2);
        form.sample_items.push(SampleItem::new("S-010", "Spare").with_qty(4));
        store.add_row(&form).await.expect("add");

        let reopened = RowStore::new(Arc::new(XlsxBackend::new(dir.path().join("QE-02-01.xlsx"))));
        let data = reopened
            .read_row("C100", "ACME")
            .await
            .expect("read")
            .expect("row")
            .data;
        assert_eq!(data.out_qty, Some(2));
        assert_eq!(data.total_in_qty, Some(3));
        assert_eq!(data.sample_items[0], SampleItem::new("S-001", "Widget"));
        assert_eq!(data.sample_items[1], SampleItem::new("S-010", "Spare").with_qty(4));
    }
}
