//! Reading and writing rows of cells from CSV files and spreadsheets.
//!
//! Reports and cost tables arrive either as CSV or as Excel/OpenDocument
//! workbooks. Both are reduced to the same shape here: a list of rows, each a
//! list of type-erased [`Cell`]s, with row and column positions preserved.

use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::Serialize;

use std::{
    cmp::Ordering,
    fmt::Display,
    fs,
    path::{Path, PathBuf},
};

use crate::error::TableError;

/// A single spreadsheet cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Bool(bool),
    Text(String),
}

pub type Row = Vec<Cell>;

impl Cell {
    /// Stands in for cells past the end of a short row.
    pub const BLANK: &'static Cell = &Cell::Empty;

    /// Builds a cell from CSV text; blank text becomes [`Cell::Empty`].
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            Self::Empty
        } else {
            Self::Text(text.to_string())
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Orders cells for sorting a column of mixed content.
    ///
    /// Numbers sort before booleans, which sort before text. Within a kind,
    /// numbers compare numerically and text compares lexicographically.
    #[must_use]
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Number(_) => 1,
            Self::Bool(_) => 2,
            Self::Text(_) => 3,
        }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => write!(f, "{}", s.trim()),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Self::Empty,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Self::from_text(s),
            Data::Int(n) => Self::Number(*n as f64),
            Data::Float(n) => Self::Number(*n),
            Data::Bool(b) => Self::Bool(*b),
            Data::DateTime(dt) => Self::Number(dt.as_f64()),
            Data::Error(e) => Self::Text(e.to_string()),
        }
    }
}

/// The file formats understood by this module, chosen by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    /// `.xlsx` / `.xlsm`: readable and writable.
    Xlsx,
    /// `.xls`, `.xlsb`, `.ods`: readable only.
    Spreadsheet,
}

impl FileKind {
    #[must_use]
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xlsm" => Some(Self::Xlsx),
            "xls" | "xlsb" | "ods" => Some(Self::Spreadsheet),
            _ => None,
        }
    }
}

/// A record type that can be written out as a table with a fixed header.
///
/// CSV output uses the record's [`Serialize`] implementation, so the serde
/// field names must match [`Tabular::HEADER`]; spreadsheet output uses
/// [`Tabular::to_row`] to keep numbers as numeric cells.
pub trait Tabular: Serialize {
    const HEADER: &'static [&'static str];

    fn to_row(&self) -> Row;
}

/// Reads every row of the CSV file or the first worksheet at `path`.
///
/// Row and column positions are preserved: leading blank rows and columns in
/// a worksheet come back as empty cells. CSV rows may differ in length.
///
/// # Errors
///
/// Returns [`TableError::NotFound`] if `path` does not exist,
/// [`TableError::Unsupported`] for an unknown extension, and any error from
/// opening or decoding the file.
pub fn read_rows(path: impl AsRef<Path>) -> Result<Vec<Row>, TableError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TableError::NotFound(path.to_path_buf()));
    }
    match FileKind::of(path) {
        Some(FileKind::Csv) => read_csv(path),
        Some(FileKind::Xlsx | FileKind::Spreadsheet) => read_workbook(path),
        None => Err(TableError::Unsupported {
            path: path.to_path_buf(),
            purpose: "reading",
        }),
    }
}

fn read_csv(path: &Path) -> Result<Vec<Row>, TableError> {
    let csv_error = |source| TableError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(csv_error)?;
        rows.push(record.iter().map(Cell::from_text).collect());
    }
    Ok(rows)
}

fn read_workbook(path: &Path) -> Result<Vec<Row>, TableError> {
    let spreadsheet_error = |source| TableError::Spreadsheet {
        path: path.to_path_buf(),
        source,
    };
    let mut workbook = open_workbook_auto(path).map_err(spreadsheet_error)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TableError::NoSheets(path.to_path_buf()))?
        .map_err(spreadsheet_error)?;
    let Some((first_row, first_col)) = range.start() else {
        return Ok(Vec::new());
    };
    let mut rows: Vec<Row> = (0..first_row).map(|_| Vec::new()).collect();
    for data in range.rows() {
        let mut row = vec![Cell::Empty; first_col as usize];
        row.extend(data.iter().map(Cell::from));
        rows.push(row);
    }
    Ok(rows)
}

/// Writes `records` under `T::HEADER` to a `.csv` or `.xlsx` file at `path`.
///
/// The whole file is produced in memory first and then moved into place, so
/// `path` is either completely written or left as it was.
///
/// # Errors
///
/// Returns [`TableError::Unsupported`] for extensions other than `.csv`,
/// `.xlsx` and `.xlsm`, and any error from encoding or writing the file.
pub fn write_records<T: Tabular>(path: impl AsRef<Path>, records: &[T]) -> Result<(), TableError> {
    let path = path.as_ref();
    let bytes = match FileKind::of(path) {
        Some(FileKind::Csv) => csv_bytes(path, records)?,
        Some(FileKind::Xlsx) => xlsx_bytes(records).map_err(|source| TableError::Xlsx {
            path: path.to_path_buf(),
            source,
        })?,
        _ => {
            return Err(TableError::Unsupported {
                path: path.to_path_buf(),
                purpose: "writing",
            })
        }
    };
    replace_file(path, &bytes)
}

fn csv_bytes<T: Tabular>(path: &Path, records: &[T]) -> Result<Vec<u8>, TableError> {
    let csv_error = |source| TableError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut wtr = csv::Writer::from_writer(Vec::new());
    if records.is_empty() {
        wtr.write_record(T::HEADER).map_err(csv_error)?;
    }
    for record in records {
        wtr.serialize(record).map_err(csv_error)?;
    }
    wtr.into_inner().map_err(|e| TableError::Io {
        path: path.to_path_buf(),
        source: e.into_error(),
    })
}

fn xlsx_bytes<T: Tabular>(records: &[T]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();
    for (col, label) in T::HEADER.iter().enumerate() {
        worksheet.write_string_with_format(0, column(col)?, *label, &bold)?;
    }
    for (idx, record) in records.iter().enumerate() {
        let row = u32::try_from(idx + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
        for (col, cell) in record.to_row().into_iter().enumerate() {
            let col = column(col)?;
            match cell {
                Cell::Empty => {}
                Cell::Number(n) => {
                    worksheet.write_number(row, col, n)?;
                }
                Cell::Bool(b) => {
                    worksheet.write_boolean(row, col, b)?;
                }
                Cell::Text(s) => {
                    worksheet.write_string(row, col, s)?;
                }
            }
        }
    }
    worksheet.autofit();
    workbook.save_to_buffer()
}

fn column(idx: usize) -> Result<u16, XlsxError> {
    u16::try_from(idx).map_err(|_| XlsxError::RowColumnLimitError)
}

fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), TableError> {
    let io_error = |source| TableError::Io {
        path: path.to_path_buf(),
        source,
    };
    let tmp = temp_sibling(path);
    fs::write(&tmp, bytes)
        .and_then(|()| fs::rename(&tmp, path))
        .map_err(|e| {
            let _ = fs::remove_file(&tmp);
            io_error(e)
        })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.partial"))
}
