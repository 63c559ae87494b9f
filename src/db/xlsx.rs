//! `.xlsx` file backend.

use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use calamine::{Data, Range, Reader, Xlsx, XlsxError, open_workbook};

use crate::db::{Cell, Sheet, TableBackend, Workbook};
use crate::error::StorageError;

/// Workbook stored as a single `.xlsx` file.
///
/// Every load re-reads the file and every save rewrites it whole. Only cell
/// values survive a round trip; styles and formulas written by other tools
/// are not carried over.
#[derive(Debug, Clone)]
pub struct XlsxBackend {
    path: PathBuf,
}

impl XlsxBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TableBackend for XlsxBackend {
    async fn load(&self) -> Result<Option<Workbook>, StorageError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            if !path.exists() {
                return Ok(None);
            }
            read_workbook(&path).map(Some)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }

    async fn save(&self, workbook: &Workbook) -> Result<(), StorageError> {
        let path = self.path.clone();
        let workbook = workbook.clone();
        tokio::task::spawn_blocking(move || {
            let bytes = encode_workbook(&workbook, &path)?;
            write_atomically(&path, &bytes)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Check that `bytes` parse as an `.xlsx` workbook with at least one sheet.
pub fn validate_xlsx_bytes(bytes: &[u8]) -> Result<(), StorageError> {
    let upload = PathBuf::from("<upload>");
    let mut xlsx: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).map_err(|e| StorageError::Read {
        path: upload.clone(),
        reason: e.to_string(),
    })?;
    let sheets = read_sheets(&mut xlsx).map_err(|e| StorageError::Read {
        path: upload.clone(),
        reason: e.to_string(),
    })?;
    if sheets.is_empty() {
        return Err(StorageError::Read {
            path: upload,
            reason: "workbook has no worksheets".to_string(),
        });
    }
    Ok(())
}

fn read_workbook(path: &Path) -> Result<Workbook, StorageError> {
    let read_err = |e: XlsxError| StorageError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let mut xlsx: Xlsx<_> = open_workbook(path).map_err(read_err)?;
    let sheets = read_sheets(&mut xlsx).map_err(read_err)?;
    Ok(Workbook { sheets })
}

fn read_sheets<R: Read + Seek>(xlsx: &mut Xlsx<R>) -> Result<Vec<Sheet>, XlsxError> {
    let mut sheets = Vec::new();
    for name in xlsx.sheet_names() {
        let range = xlsx.worksheet_range(&name)?;
        sheets.push(sheet_from_range(name, &range));
    }
    Ok(sheets)
}

/// calamine ranges start at the first used cell, not A1; re-anchor them.
fn sheet_from_range(name: String, range: &Range<Data>) -> Sheet {
    let mut sheet = Sheet::new(name);
    let (row0, col0) = range.start().unwrap_or((0, 0));
    for (r, row) in range.rows().enumerate() {
        for (c, data) in row.iter().enumerate() {
            let cell = cell_from_data(data);
            if !cell.is_empty() {
                sheet.set_cell(row0 as usize + r + 1, col0 as usize + c + 1, cell);
            }
        }
    }
    sheet
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) if value.time() == chrono::NaiveTime::MIN => {
                Cell::Text(value.format("%Y-%m-%d").to_string())
            }
            Some(value) => Cell::Text(value.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) | Data::Empty => Cell::Empty,
    }
}

fn encode_workbook(workbook: &Workbook, path: &Path) -> Result<Vec<u8>, StorageError> {
    let write_err = |e: rust_xlsxwriter::XlsxError| StorageError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut out = rust_xlsxwriter::Workbook::new();
    let default_sheets = [Sheet::new(crate::db::DEFAULT_SHEET_NAME)];
    let sheets = if workbook.sheets.is_empty() {
        &default_sheets[..]
    } else {
        &workbook.sheets[..]
    };

    for sheet in sheets {
        let worksheet = out.add_worksheet();
        if !sheet.name.is_empty() {
            worksheet.set_name(&sheet.name).map_err(write_err)?;
        }
        for (row, col, cell) in sheet.cells() {
            let (Ok(r), Ok(c)) = (u32::try_from(row - 1), u16::try_from(col - 1)) else {
                return Err(StorageError::OutOfBounds { row, col });
            };
            match cell {
                Cell::Text(s) => worksheet.write_string(r, c, s),
                Cell::Number(n) => worksheet.write_number(r, c, *n),
                Cell::Bool(b) => worksheet.write_boolean(r, c, *b),
                Cell::Empty => continue,
            }
            .map_err(write_err)?;
        }
    }

    out.save_to_buffer().map_err(write_err)
}

/// Write `bytes` to a temp file beside `path`, then rename it into place.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let io_err = |p: &Path| {
        let p = p.to_path_buf();
        move |source: std::io::Error| StorageError::Io { path: p, source }
    };

    std::fs::create_dir_all(dir).map_err(io_err(dir))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err(dir))?;
    tmp.write_all(bytes).map_err(io_err(tmp.path()))?;
    tmp.as_file().sync_all().map_err(io_err(path))?;
    tmp.persist(path).map_err(|e| StorageError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
