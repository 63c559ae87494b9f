//! Workbook persistence boundary.
//!
//! The row store works against an in-memory [`Workbook`] grid and hands the
//! whole thing to a [`TableBackend`] to load or save. Two backends exist:
//!
//! - [`xlsx::XlsxBackend`]: a single `.xlsx` file on disk (read with
//!   `calamine`, written with `rust_xlsxwriter` via temp-file-then-rename)
//! - [`memory::MemoryBackend`]: an in-process workbook for tests and embedders
//!
//! Rows and columns are 1-based throughout this module; row 1 is the header row.

pub mod memory;
pub mod xlsx;

use async_trait::async_trait;

use crate::error::StorageError;

pub use memory::MemoryBackend;
pub use xlsx::{XlsxBackend, validate_xlsx_bytes};

/// Name given to the worksheet of a freshly created workbook.
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// Load-whole / write-whole storage for a workbook.
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Load the stored workbook, or `None` when nothing has been stored yet.
    async fn load(&self) -> Result<Option<Workbook>, StorageError>;

    /// Replace the stored workbook with `workbook`.
    async fn save(&self, workbook: &Workbook) -> Result<(), StorageError>;

    /// Human-readable location used in log lines.
    fn location(&self) -> String;
}

/// A single cell value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::Number(_) | Self::Bool(_) => false,
        }
    }

    /// Render the cell as text. Whole numbers print without a fraction.
    pub fn as_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::Bool(b) => b.to_string(),
        }
    }

    /// Numeric view of the cell; numeric text is accepted.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// One worksheet as a ragged grid of cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    /// Index of the last row holding any non-empty cell; 0 when the sheet is empty.
    pub fn row_count(&self) -> usize {
        self.rows
            .iter()
            .rposition(|row| row.iter().any(|cell| !cell.is_empty()))
            .map_or(0, |idx| idx + 1)
    }

    /// Index of the last non-empty cell in `row`; 0 when the row is empty.
    pub fn cell_count(&self, row: usize) -> usize {
        self.row_cells(row)
            .iter()
            .rposition(|cell| !cell.is_empty())
            .map_or(0, |idx| idx + 1)
    }

    /// Cells of a 1-based row, empty when the row does not exist.
    pub fn row_cells(&self, row: usize) -> &[Cell] {
        row.checked_sub(1)
            .and_then(|idx| self.rows.get(idx))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        static EMPTY: Cell = Cell::Empty;
        col.checked_sub(1)
            .and_then(|idx| self.row_cells(row).get(idx))
            .unwrap_or(&EMPTY)
    }

    /// Set a 1-based cell, growing the grid as needed. Index 0 is ignored.
    pub fn set_cell(&mut self, row: usize, col: usize, value: Cell) {
        let (Some(row_idx), Some(col_idx)) = (row.checked_sub(1), col.checked_sub(1)) else {
            return;
        };
        if self.rows.len() <= row_idx {
            self.rows.resize_with(row_idx + 1, Vec::new);
        }
        let cells = &mut self.rows[row_idx];
        if cells.len() <= col_idx {
            cells.resize(col_idx + 1, Cell::Empty);
        }
        cells[col_idx] = value;
    }

    /// Append `values` as a new row after the last non-empty row.
    pub fn append_row(&mut self, values: Vec<Cell>) -> usize {
        let row = self.row_count() + 1;
        for (idx, value) in values.into_iter().enumerate() {
            self.set_cell(row, idx + 1, value);
        }
        row
    }

    /// Iterate non-empty cells as `(row, col, cell)` with 1-based indices.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, &Cell)> {
        self.rows.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, cell)| !cell.is_empty())
                .map(move |(c, cell)| (r + 1, c + 1, cell))
        })
    }
}

/// All worksheets of a stored workbook, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// A workbook with a single empty sheet named [`DEFAULT_SHEET_NAME`].
    pub fn with_default_sheet() -> Self {
        Self {
            sheets: vec![Sheet::new(DEFAULT_SHEET_NAME)],
        }
    }

    /// The first worksheet, created when the workbook has none.
    pub fn first_sheet_mut(&mut self) -> &mut Sheet {
        if self.sheets.is_empty() {
            self.sheets.push(Sheet::new(DEFAULT_SHEET_NAME));
        }
        &mut self.sheets[0]
    }
}
