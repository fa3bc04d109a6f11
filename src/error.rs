use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while reconciling sales against costs.
#[derive(Debug, Error)]
pub enum Error {
    /// The sales report could not be turned into sales rows.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A unit cost of zero or less was offered to an item.
    #[error("invalid cost {0}: unit cost must be greater than zero")]
    InvalidCost(f64),
    /// Derived fields cannot be computed yet.
    #[error("cannot compute RUB cost: exchange rate ({rate}) and USD cost ({cost_usd}) must both be greater than zero")]
    NotReady { rate: f64, cost_usd: f64 },
    /// Results could not be saved.
    #[error("export failed: {0}")]
    ExportFailed(String),
    /// A cost table could not be imported.
    #[error(transparent)]
    Import(#[from] ImportError),
    /// A tabular file could not be read or written.
    #[error(transparent)]
    Table(#[from] TableError),
    /// The cost database failed.
    #[error("cost store: {0}")]
    Store(#[from] rusqlite::Error),
}

/// Problems found while extracting sales rows from a report.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("header marker {marker:?} not found in the first column")]
    MissingHeader { marker: String },
    #[error("row {row}: column {column} is missing")]
    MissingColumn { row: usize, column: usize },
    #[error("row {row}, column {column}: {value:?} is not a valid {expected}")]
    Malformed {
        row: usize,
        column: usize,
        value: String,
        expected: &'static str,
    },
}

/// Problems found while importing a cost table.
#[derive(Debug, Error, PartialEq)]
pub enum ImportError {
    #[error("{}: file not found", .0.display())]
    NotFound(PathBuf),
    #[error("row {row}: the cost column must contain only numbers, found {value:?}")]
    BadValue { row: usize, value: String },
    #[error("row {row}: item code is empty")]
    MissingCode { row: usize },
    #[error("import failed: {0}")]
    Other(String),
}

/// Problems reading or writing tabular files.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("{}: file not found", .0.display())]
    NotFound(PathBuf),
    #[error("{}: unsupported file type for {purpose}", path.display())]
    Unsupported {
        path: PathBuf,
        purpose: &'static str,
    },
    #[error("{}: workbook has no worksheets", .0.display())]
    NoSheets(PathBuf),
    #[error("{}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },
    #[error("{}: {source}", path.display())]
    Spreadsheet {
        path: PathBuf,
        source: calamine::Error,
    },
    #[error("{}: {source}", path.display())]
    Xlsx {
        path: PathBuf,
        source: rust_xlsxwriter::XlsxError,
    },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
