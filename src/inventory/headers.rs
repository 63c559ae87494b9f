//! Canonical header set and header-row resolution.
//!
//! Column positions are never assumed. Every read and write looks the label up
//! in row 1 again, so a legacy file with reordered or extra columns keeps
//! working once missing headers have been appended.

use std::collections::HashSet;

use crate::db::{Cell, Sheet};

/// Logical columns of the ledger, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKey {
    CaseNo,
    QuoteNo,
    CustomerName,
    ProductName,
    Model,
    Sales,
    InOperator,
    InDate,
    TotalInQty,
    SampleNo,
    SampleName,
    Remark,
    BorrowDate,
    Borrower,
    ReturnDate,
    ReturnOperator,
    OutDate,
    OutQty,
}

impl HeaderKey {
    pub const ALL: [HeaderKey; 18] = [
        Self::CaseNo,
        Self::QuoteNo,
        Self::CustomerName,
        Self::ProductName,
        Self::Model,
        Self::Sales,
        Self::InOperator,
        Self::InDate,
        Self::TotalInQty,
        Self::SampleNo,
        Self::SampleName,
        Self::Remark,
        Self::BorrowDate,
        Self::Borrower,
        Self::ReturnDate,
        Self::ReturnOperator,
        Self::OutDate,
        Self::OutQty,
    ];

    /// Field identifier used in payloads and missing-field lists.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CaseNo => "caseNo",
            Self::QuoteNo => "quoteNo",
            Self::CustomerName => "customerName",
            Self::ProductName => "productName",
            Self::Model => "model",
            Self::Sales => "sales",
            Self::InOperator => "inOperator",
            Self::InDate => "inDate",
            Self::TotalInQty => "totalInQty",
            Self::SampleNo => "sampleNo",
            Self::SampleName => "sampleName",
            Self::Remark => "remark",
            Self::BorrowDate => "borrowDate",
            Self::Borrower => "borrower",
            Self::ReturnDate => "returnDate",
            Self::ReturnOperator => "returnOperator",
            Self::OutDate => "outDate",
            Self::OutQty => "outQty",
        }
    }

    /// Localized header text as it appears in row 1. Must not change.
    pub fn label(self) -> &'static str {
        match self {
            Self::CaseNo => "樣品總編號",
            Self::QuoteNo => "報價單編號",
            Self::CustomerName => "客戶名稱",
            Self::ProductName => "品名",
            Self::Model => "型號",
            Self::Sales => "負責業務",
            Self::InOperator => "樣品入庫人",
            Self::InDate => "入庫日期",
            Self::TotalInQty => "入庫總數量",
            Self::SampleNo => "樣品編號",
            Self::SampleName => "樣品名稱",
            Self::Remark => "備註",
            Self::BorrowDate => "樣品借出日期",
            Self::Borrower => "借出人",
            Self::ReturnDate => "樣品歸還日期",
            Self::ReturnOperator => "歸還人",
            Self::OutDate => "出庫日期",
            Self::OutQty => "樣品出庫數",
        }
    }
}

/// 1-based column whose header text, trimmed, equals `label`.
pub fn resolve_column(sheet: &Sheet, label: &str) -> Option<usize> {
    sheet
        .row_cells(1)
        .iter()
        .position(|cell| matches!(cell, Cell::Text(text) if text.trim() == label))
        .map(|idx| idx + 1)
}

/// Make sure row 1 carries every canonical header.
///
/// An empty sheet gets the canonical row in canonical order. Otherwise
/// existing headers stay where they are and missing ones are appended after
/// the last used header cell. Returns the labels that were added.
pub fn ensure_header_row(sheet: &mut Sheet) -> Vec<&'static str> {
    if sheet.row_count() == 0 {
        let labels: Vec<&'static str> = HeaderKey::ALL.iter().map(|key| key.label()).collect();
        sheet.append_row(labels.iter().map(|label| Cell::from(*label)).collect());
        return labels;
    }

    let existing: HashSet<String> = sheet
        .row_cells(1)
        .iter()
        .filter_map(|cell| match cell {
            Cell::Text(text) => Some(text.trim().to_string()),
            _ => None,
        })
        .collect();

    let mut next_col = sheet.cell_count(1);
    let mut added = Vec::new();
    for key in HeaderKey::ALL {
        let label = key.label();
        if !existing.contains(label) {
            next_col += 1;
            sheet.set_cell(1, next_col, Cell::from(label));
            added.push(label);
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{HeaderKey, ensure_header_row, resolve_column};
    use crate::db::{Cell, Sheet};

    fn header_texts(sheet: &Sheet) -> Vec<String> {
        sheet.row_cells(1).iter().map(Cell::as_text).collect()
    }

    #[test]
    fn empty_sheet_gets_canonical_header_row() {
        let mut sheet = Sheet::new("Sheet1");
        let added = ensure_header_row(&mut sheet);

        assert_eq!(added.len(), HeaderKey::ALL.len());
        assert_eq!(sheet.row_count(), 1);
        assert_eq!(resolve_column(&sheet, "樣品總編號"), Some(1));
        assert_eq!(resolve_column(&sheet, "樣品出庫數"), Some(18));
    }

    #[test]
    fn legacy_headers_keep_position_and_missing_ones_are_appended() {
        let mut sheet = Sheet::new("Sheet1");
        sheet.append_row(vec![
            Cell::from("Internal ID"),
            Cell::from(" 客戶名稱 "),
            Cell::from("樣品總編號"),
        ]);

        let added = ensure_header_row(&mut sheet);

        assert_eq!(added.len(), HeaderKey::ALL.len() - 2);
        assert_eq!(resolve_column(&sheet, "客戶名稱"), Some(2));
        assert_eq!(resolve_column(&sheet, "樣品總編號"), Some(3));
        assert_eq!(resolve_column(&sheet, "報價單編號"), Some(4));
        assert_eq!(header_texts(&sheet)[0], "Internal ID");
    }

    #[test]
    fn ensure_header_row_is_idempotent() {
        let mut sheet = Sheet::new("Sheet1");
        sheet.append_row(vec![Cell::from("型號"), Cell::from("Extra")]);

        ensure_header_row(&mut sheet);
        let after_first = header_texts(&sheet);
        let added = ensure_header_row(&mut sheet);

        assert!(added.is_empty());
        assert_eq!(header_texts(&sheet), after_first);
    }

    #[test]
    fn resolve_column_ignores_non_text_cells() {
        let mut sheet = Sheet::new("Sheet1");
        sheet.append_row(vec![Cell::Number(1.0), Cell::from("型號")]);

        assert_eq!(resolve_column(&sheet, "1"), None);
        assert_eq!(resolve_column(&sheet, "型號"), Some(2));
        assert_eq!(resolve_column(&sheet, "品名"), None);
    }
}
