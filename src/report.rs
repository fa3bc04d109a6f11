use tracing::debug;

use std::{path::Path, str::FromStr};

use crate::{
    amount::Amount,
    error::{ParseError, Result},
    table::{self, Cell, Row},
};

/// First-column label of the header row in a sales report.
pub const DEFAULT_HEADER_MARKER: &str = "Номенклатура";
/// First-column label of the grand-total row in a sales report.
pub const DEFAULT_TOTAL_MARKER: &str = "Итого";

/// How many rows at the bottom of the report are searched for a total row.
const TOTAL_SEARCH_DEPTH: usize = 10;

const CODE_COLUMN: usize = 1;
const QTY_COLUMN: usize = 2;
const SUM_COLUMN: usize = 3;

/// One clean line of a sales report: what was sold, how many, for how much.
#[derive(Clone, Debug, PartialEq)]
pub struct SaleRow {
    pub item_code: String,
    pub sold_qty: u32,
    pub sold_sum: f64,
}

/// Extracts [`SaleRow`]s from a sales report exported by accounting software.
///
/// Such reports are meant for people, not programs: a title and a list of
/// filter settings sit above the table, the header row may be followed by
/// blank or sub-header rows, and a grand total closes the table. The parser
/// finds the table by two markers in the first column:
///
/// * the *header marker* labels the header row; data starts at the next row
///   whose first column is not blank.
/// * the *total marker* labels the grand-total row, which is dropped if it
///   appears among the last 10 rows.
///
/// Blank rows and blank columns are then removed, leftover blank cells count
/// as zero, and the rows are sorted by their first column. In each row the
/// second, third and fourth remaining columns hold the item code, quantity and
/// revenue. Anything further right is ignored.
///
/// To create a parser with the default (Russian) markers, use
/// [`ReportParser::new`]; to use other markers, use
/// [`ReportParser::with_markers`].
#[derive(Clone, Debug)]
pub struct ReportParser {
    header_marker: String,
    total_marker: String,
}

impl Default for ReportParser {
    fn default() -> Self {
        Self::with_markers(DEFAULT_HEADER_MARKER, DEFAULT_TOTAL_MARKER)
    }
}

impl ReportParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_markers(header_marker: impl Into<String>, total_marker: impl Into<String>) -> Self {
        Self {
            header_marker: header_marker.into(),
            total_marker: total_marker.into(),
        }
    }

    /// Reads the report at `path` (CSV or spreadsheet) and parses it.
    ///
    /// # Errors
    ///
    /// Returns any error from reading the file, or from [`Self::parse`].
    pub fn read(&self, path: impl AsRef<Path>) -> Result<Vec<SaleRow>> {
        let rows = table::read_rows(path)?;
        Ok(self.parse(rows)?)
    }

    /// Parses raw report rows into sales rows, sorted by the first column.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sales_margin::{ReportParser, table::Cell};
    /// let text = |s: &str| Cell::Text(s.into());
    /// let rows = vec![
    ///     vec![text("Sales, January")],
    ///     vec![text("Item"), text("Code"), text("Qty"), text("Sum")],
    ///     vec![text("Lamp"), text("L-1"), text("2"), text("1 000,50")],
    ///     vec![text("Total"), Cell::Empty, text("2"), text("1 000,50")],
    /// ];
    /// let sales = ReportParser::with_markers("Item", "Total").parse(rows).unwrap();
    /// assert_eq!(sales.len(), 1);
    /// assert_eq!(sales[0].item_code, "L-1");
    /// assert_eq!(sales[0].sold_qty, 2);
    /// assert_eq!(sales[0].sold_sum, 1000.5);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// * No row has the header marker in its first column
    /// * A data row has fewer than four non-blank columns
    /// * A quantity is not a non-negative whole number
    /// * A revenue amount is not a number
    ///
    /// A header marker with no data rows after it is not an error: the result
    /// is empty.
    pub fn parse(&self, rows: Vec<Row>) -> std::result::Result<Vec<SaleRow>, ParseError> {
        let source_len = rows.len();
        // Rows keep their 1-based position in the source for error messages.
        let mut rows: Vec<(usize, Row)> = rows.into_iter().enumerate().map(|(i, r)| (i + 1, r)).collect();

        let start = self.data_start(&rows)?;
        rows.drain(..start);

        let tail_start = rows.len().saturating_sub(TOTAL_SEARCH_DEPTH);
        let mut idx = 0;
        rows.retain(|(_, row)| {
            let keep = idx < tail_start || !first_cell_is(row, &self.total_marker);
            idx += 1;
            keep
        });

        rows.retain(|(_, row)| !row.iter().all(Cell::is_empty));

        let table = drop_empty_columns(rows);
        debug!(
            source_rows = source_len,
            data_rows = table.len(),
            "located sales table"
        );

        table.iter().map(|(line, row)| sale_row(*line, row)).collect()
    }

    fn data_start(&self, rows: &[(usize, Row)]) -> std::result::Result<usize, ParseError> {
        let header = rows
            .iter()
            .position(|(_, row)| first_cell_is(row, &self.header_marker))
            .ok_or_else(|| ParseError::MissingHeader {
                marker: self.header_marker.clone(),
            })?;
        let offset = rows[header + 1..].iter().position(|(_, row)| {
            row.first().is_some_and(|cell| !cell.is_empty())
                && !first_cell_is(row, &self.header_marker)
        });
        Ok(offset.map_or(rows.len(), |offset| header + 1 + offset))
    }
}

fn first_cell_is(row: &Row, marker: &str) -> bool {
    matches!(row.first(), Some(Cell::Text(s)) if s.trim() == marker)
}

/// Keeps only columns with at least one non-blank cell, fills the remaining
/// blanks with zero and sorts the rows by their (new) first column.
fn drop_empty_columns(rows: Vec<(usize, Row)>) -> Vec<(usize, Row)> {
    let width = rows.iter().map(|(_, row)| row.len()).max().unwrap_or(0);
    let kept: Vec<usize> = (0..width)
        .filter(|&col| {
            rows.iter()
                .any(|(_, row)| row.get(col).is_some_and(|cell| !cell.is_empty()))
        })
        .collect();
    let mut table: Vec<(usize, Row)> = rows
        .into_iter()
        .map(|(line, row)| {
            let cells = kept
                .iter()
                .map(|&col| match row.get(col) {
                    Some(cell) if !cell.is_empty() => cell.clone(),
                    _ => Cell::Number(0.0),
                })
                .collect();
            (line, cells)
        })
        .collect();
    table.sort_by(|(_, a), (_, b)| match (a.first(), b.first()) {
        (Some(a), Some(b)) => a.sort_cmp(b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    });
    table
}

fn sale_row(line: usize, row: &Row) -> std::result::Result<SaleRow, ParseError> {
    let cell = |column: usize| {
        row.get(column)
            .ok_or(ParseError::MissingColumn { row: line, column })
    };
    Ok(SaleRow {
        item_code: item_code(cell(CODE_COLUMN)?),
        sold_qty: quantity(cell(QTY_COLUMN)?, line, QTY_COLUMN)?,
        sold_sum: amount(cell(SUM_COLUMN)?, line, SUM_COLUMN)?,
    })
}

/// Renders a cell as an item code; whole numbers print without a fraction.
pub(crate) fn item_code(cell: &Cell) -> String {
    cell.to_string()
}

pub(crate) fn amount(cell: &Cell, row: usize, column: usize) -> std::result::Result<f64, ParseError> {
    let malformed = || ParseError::Malformed {
        row,
        column,
        value: cell.to_string(),
        expected: "number",
    };
    match cell {
        Cell::Empty => Ok(0.0),
        Cell::Number(n) if n.is_finite() => Ok(*n),
        Cell::Text(s) => Amount::from_str(s)
            .map(Amount::value)
            .map_err(|_| malformed()),
        _ => Err(malformed()),
    }
}

pub(crate) fn quantity(cell: &Cell, row: usize, column: usize) -> std::result::Result<u32, ParseError> {
    let value = amount(cell, row, column).map_err(|_| ParseError::Malformed {
        row,
        column,
        value: cell.to_string(),
        expected: "quantity",
    })?;
    if value.fract() != 0.0 || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(ParseError::Malformed {
            row,
            column,
            value: cell.to_string(),
            expected: "quantity",
        });
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let qty = value as u32;
    Ok(qty)
}
