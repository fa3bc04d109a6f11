use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use std::{fmt::Display, path::Path};

use crate::{
    amount::Amount,
    error::{Error, Result, TableError},
    item::SalesItem,
    report::{self, SaleRow},
    table::{self, Cell, FileKind, Row, Tabular},
};

/// Column labels of an exported sales table, in order.
pub const SALES_HEADER: [&str; 8] = [
    "Артикул",
    "Количество продано",
    "Средняя цена продажи",
    "Сумма продано",
    "Себестоимость РУБ",
    "Себестоимость USD",
    "Маржинальность РУБ/шт",
    "Маржинальность %",
];

/// Row order for the printed table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortBy {
    /// Item code, ascending.
    #[default]
    Code,
    /// Revenue, descending.
    Revenue,
    /// Margin percentage, descending.
    Margin,
}

/// Holds the items of one reconciliation, in the order they were ingested.
///
/// To create an empty collection, use [`SalesCollection::new`] with the
/// current USD→RUB exchange rate (zero if not known yet).
///
/// To add sales data, use [`SalesCollection::ingest`].
///
/// To fill in costs, use [`SalesCollection::apply_cost`] directly or a
/// [`CostMatcher`](crate::CostMatcher).
///
/// To get a printable version of the collection, use its [`Display`]
/// implementation; to save it to a file, use [`SalesCollection::save`].
#[derive(Debug, Default)]
pub struct SalesCollection {
    items: Vec<SalesItem>,
    rate: f64,
    sort_by: SortBy,
}

impl SalesCollection {
    #[must_use]
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    #[must_use]
    pub fn sort_by(&self) -> SortBy {
        self.sort_by
    }

    /// Chooses the row order used by [`Self::sorted`] and [`Display`].
    pub fn set_sort_by(&mut self, sort_by: SortBy) {
        self.sort_by = sort_by;
    }

    /// Changes the exchange rate used for costs set from now on.
    ///
    /// Existing items are not updated; call [`Self::recompute_all`] for that.
    pub fn set_exchange_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    /// Appends one item per sales row.
    ///
    /// Existing items are kept, so ingesting the same report twice lists
    /// every item twice.
    pub fn ingest(&mut self, rows: impl IntoIterator<Item = SaleRow>) {
        let before = self.items.len();
        self.items.extend(rows.into_iter().map(SalesItem::from));
        debug!(added = self.items.len() - before, total = self.items.len(), "ingested sales rows");
    }

    /// Returns the code of every item, in order.
    #[must_use]
    pub fn item_codes(&self) -> Vec<String> {
        self.items.iter().map(|item| item.item_code().to_string()).collect()
    }

    /// Sets the USD cost of the first item whose code is `item_code`.
    ///
    /// Returns `false` if no item has that code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCost`] if `cost_usd` is not greater than zero;
    /// the item keeps its previous cost.
    pub fn apply_cost(&mut self, item_code: &str, cost_usd: f64) -> Result<bool> {
        let rate = self.rate;
        match self.items.iter_mut().find(|item| item.item_code() == item_code) {
            Some(item) => {
                item.set_cost(cost_usd, rate)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Recomputes every item with the current exchange rate.
    ///
    /// Items without a cost, or every item if the rate is not set, are
    /// skipped. Returns the number of items recomputed.
    pub fn recompute_all(&mut self) -> usize {
        let rate = self.rate;
        let mut done = 0;
        for item in &mut self.items {
            match item.recompute(rate) {
                Ok(()) => done += 1,
                Err(e) => debug!(item_code = item.item_code(), "skipped: {e}"),
            }
        }
        info!(recomputed = done, skipped = self.items.len() - done, rate, "recomputed costs");
        done
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SalesItem> {
        self.items.iter()
    }

    /// Returns every item as an export record, in ingestion order.
    #[must_use]
    pub fn export(&self) -> Vec<ExportRecord> {
        self.items.iter().map(ExportRecord::from).collect()
    }

    /// Writes the export to a `.csv` or `.xlsx` file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExportFailed`] if the file type is not supported or the
    /// file cannot be written. In that case `path` is left untouched.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        table::write_records(path, &self.export())
            .map_err(|e| Error::ExportFailed(e.to_string()))?;
        info!(path = %path.display(), items = self.items.len(), "saved sales");
        Ok(())
    }

    /// Returns the items in `self.sort_by` order.
    #[must_use]
    pub fn sorted(&self) -> Vec<&SalesItem> {
        let mut items: Vec<_> = self.items.iter().collect();
        match self.sort_by {
            SortBy::Code => items.sort_by(|a, b| a.item_code().cmp(b.item_code())),
            SortBy::Revenue => items.sort_by(|a, b| b.sold_sum().total_cmp(&a.sold_sum())),
            SortBy::Margin => items.sort_by(|a, b| b.margin_pct().total_cmp(&a.margin_pct())),
        }
        items
    }
}

impl Display for SalesCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self
            .items
            .iter()
            .map(|item| item.item_code().chars().count())
            .chain(["Item".len(), "Total".len()])
            .max()
            .unwrap_or_default();
        writeln!(
            f,
            "{:width$} {:>6} {:>12} {:>12} {:>10} {:>10} {:>10} {:>9}",
            "Item", "Units", "Price", "Revenue", "Cost RUB", "Cost USD", "Margin", "Margin %"
        )?;
        let length = width + 76;
        writeln!(f, "{:-<length$}", "")?;
        let (mut units, mut revenue) = (0_u64, 0.0);
        for item in self.sorted() {
            writeln!(
                f,
                "{:width$} {:>6} {:>12.2} {:>12.2} {:>10.2} {:>10.2} {:>10.2} {:>9.2}",
                item.item_code(),
                item.sold_qty(),
                item.sold_price(),
                item.sold_sum(),
                item.cost_rub(),
                item.cost_usd(),
                item.margin_abs(),
                item.margin_pct(),
            )?;
            units += u64::from(item.sold_qty());
            revenue += item.sold_sum();
        }
        writeln!(f, "{:-<length$}", "")?;
        writeln!(f, "{:width$} {units:>6} {:>12} {revenue:>12.2}", "Total", "")?;
        Ok(())
    }
}

/// One line of an exported sales table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    #[serde(rename = "Артикул")]
    pub item_code: String,
    #[serde(rename = "Количество продано")]
    pub sold_qty: u32,
    #[serde(rename = "Средняя цена продажи")]
    pub sold_price: Amount,
    #[serde(rename = "Сумма продано")]
    pub sold_sum: Amount,
    #[serde(rename = "Себестоимость РУБ")]
    pub cost_rub: Amount,
    #[serde(rename = "Себестоимость USD")]
    pub cost_usd: Amount,
    #[serde(rename = "Маржинальность РУБ/шт")]
    pub margin_rub: Amount,
    #[serde(rename = "Маржинальность %")]
    pub margin_pct: Amount,
}

impl From<&SalesItem> for ExportRecord {
    fn from(item: &SalesItem) -> Self {
        Self {
            item_code: item.item_code().to_string(),
            sold_qty: item.sold_qty(),
            sold_price: item.sold_price().into(),
            sold_sum: item.sold_sum().into(),
            cost_rub: item.cost_rub().into(),
            cost_usd: item.cost_usd().into(),
            margin_rub: item.margin_abs().into(),
            margin_pct: item.margin_pct().into(),
        }
    }
}

impl From<ExportRecord> for SaleRow {
    fn from(record: ExportRecord) -> Self {
        Self {
            item_code: record.item_code,
            sold_qty: record.sold_qty,
            sold_sum: record.sold_sum.value(),
        }
    }
}

impl Tabular for ExportRecord {
    const HEADER: &'static [&'static str] = &SALES_HEADER;

    fn to_row(&self) -> Row {
        vec![
            Cell::Text(self.item_code.clone()),
            Cell::Number(f64::from(self.sold_qty)),
            Cell::Number(self.sold_price.value()),
            Cell::Number(self.sold_sum.value()),
            Cell::Number(self.cost_rub.value()),
            Cell::Number(self.cost_usd.value()),
            Cell::Number(self.margin_rub.value()),
            Cell::Number(self.margin_pct.value()),
        ]
    }
}

/// Reads back the sales rows from a table written by [`SalesCollection::save`].
///
/// Only the item code, quantity and revenue columns are used; the derived
/// columns are recomputed when costs are filled in again.
///
/// # Errors
///
/// Returns any error from reading the file, and [`Error::Parse`] if a row has
/// a missing or malformed quantity or revenue.
pub fn read_export(path: impl AsRef<Path>) -> Result<Vec<SaleRow>> {
    let path = path.as_ref();
    if FileKind::of(path) == Some(FileKind::Csv) && path.exists() {
        let csv_error = |source| table_error(path, source);
        let mut rdr = csv::Reader::from_path(path).map_err(csv_error)?;
        let mut rows = Vec::new();
        for result in rdr.deserialize() {
            let record: ExportRecord = result.map_err(csv_error)?;
            rows.push(record.into());
        }
        return Ok(rows);
    }
    let mut rows = Vec::new();
    for (idx, row) in table::read_rows(path)?.iter().enumerate().skip(1) {
        if row.iter().all(Cell::is_empty) {
            continue;
        }
        let line = idx + 1;
        let cell = |column: usize| row.get(column).unwrap_or(Cell::BLANK);
        rows.push(SaleRow {
            item_code: report::item_code(cell(0)),
            sold_qty: report::quantity(cell(1), line, 1)?,
            sold_sum: report::amount(cell(3), line, 3)?,
        });
    }
    Ok(rows)
}

fn table_error(path: &Path, source: csv::Error) -> Error {
    Error::Table(TableError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SalesCollection {
        let mut sales = SalesCollection::new(0.0);
        sales.ingest([
            SaleRow {
                item_code: "LT-300".into(),
                sold_qty: 2,
                sold_sum: 5000.0,
            },
            SaleRow {
                item_code: "LT-100".into(),
                sold_qty: 4,
                sold_sum: 12345.6,
            },
            SaleRow {
                item_code: "LT-200".into(),
                sold_qty: 0,
                sold_sum: 0.0,
            },
        ]);
        sales
    }

    fn triples(rows: &[SaleRow]) -> Vec<(&str, u32, f64)> {
        rows.iter()
            .map(|r| (r.item_code.as_str(), r.sold_qty, r.sold_sum))
            .collect()
    }

    #[test]
    fn ingest_fn_appends_in_order_and_accumulates() {
        let mut sales = sample();
        assert_eq!(sales.item_codes(), vec!["LT-300", "LT-100", "LT-200"]);
        sales.ingest([SaleRow {
            item_code: "LT-300".into(),
            sold_qty: 1,
            sold_sum: 2500.0,
        }]);
        assert_eq!(sales.len(), 4);
        assert_eq!(sales.item_codes()[3], "LT-300");
    }

    #[test]
    fn apply_cost_fn_updates_first_matching_item() {
        let mut sales = SalesCollection::new(90.0);
        sales.ingest([
            SaleRow {
                item_code: "A".into(),
                sold_qty: 1,
                sold_sum: 1000.0,
            },
            SaleRow {
                item_code: "A".into(),
                sold_qty: 2,
                sold_sum: 3000.0,
            },
        ]);
        assert!(sales.apply_cost("A", 10.0).unwrap());
        let items: Vec<_> = sales.iter().collect();
        assert_eq!(items[0].cost_rub(), 900.0);
        assert_eq!(items[1].cost_usd(), 0.0);
    }

    #[test]
    fn apply_cost_fn_reports_missing_code() {
        let mut sales = sample();
        assert!(!sales.apply_cost("NOPE", 10.0).unwrap());
    }

    #[test]
    fn apply_cost_fn_rejects_invalid_cost_and_keeps_previous() {
        let mut sales = SalesCollection::new(90.0);
        sales.ingest(sample().export().into_iter().map(SaleRow::from));
        sales.apply_cost("LT-100", 20.0).unwrap();
        assert!(matches!(
            sales.apply_cost("LT-100", -5.0),
            Err(Error::InvalidCost(cost)) if cost == -5.0
        ));
        let item = sales.iter().find(|i| i.item_code() == "LT-100").unwrap();
        assert_eq!(item.cost_usd(), 20.0);
    }

    #[test]
    fn recompute_all_fn_applies_new_rate() {
        let mut sales = sample();
        sales.apply_cost("LT-100", 10.0).unwrap();
        let item = sales.iter().find(|i| i.item_code() == "LT-100").unwrap();
        assert_eq!(item.cost_rub(), 0.0);

        sales.set_exchange_rate(90.0);
        assert_eq!(sales.recompute_all(), 1);
        let item = sales.iter().find(|i| i.item_code() == "LT-100").unwrap();
        assert_eq!(item.cost_rub(), 900.0);
    }

    #[test]
    fn export_fn_round_trips_through_ingest() {
        let mut sales = sample();
        sales.set_exchange_rate(91.5);
        sales.apply_cost("LT-100", 12.5).unwrap();
        let rows: Vec<SaleRow> = sales.export().into_iter().map(SaleRow::from).collect();
        let mut again = SalesCollection::new(0.0);
        again.ingest(rows.clone());
        let exported: Vec<SaleRow> = again.export().into_iter().map(SaleRow::from).collect();
        assert_eq!(triples(&exported), triples(&rows));
        assert_eq!(
            triples(&rows),
            vec![("LT-300", 2, 5000.0), ("LT-100", 4, 12345.6), ("LT-200", 0, 0.0)]
        );
    }

    #[test]
    fn save_fn_round_trips_through_csv_and_xlsx() {
        let dir = tempfile::tempdir().unwrap();
        let mut sales = sample();
        sales.set_exchange_rate(90.0);
        sales.apply_cost("LT-300", 30.25).unwrap();
        let expected: Vec<SaleRow> = sales.export().into_iter().map(SaleRow::from).collect();
        for name in ["sales.csv", "sales.xlsx"] {
            let path = dir.path().join(name);
            sales.save(&path).unwrap();
            let rows = read_export(&path).unwrap();
            assert_eq!(triples(&rows), triples(&expected), "{name}");
        }
    }

    #[test]
    fn save_fn_writes_fixed_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.csv");
        sample().save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next().unwrap(), SALES_HEADER.join(","));
    }

    #[test]
    fn save_fn_returns_export_failed_for_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("sales.xlsx");
        let err = sample().save(&path).unwrap_err();
        assert!(matches!(err, Error::ExportFailed(_)), "{err}");
        assert!(!path.exists());
    }

    #[test]
    fn sorted_fn_orders_by_chosen_column() {
        let mut sales = sample();
        let codes = |sales: &SalesCollection| -> Vec<String> {
            sales.sorted().iter().map(|i| i.item_code().to_string()).collect()
        };
        assert_eq!(codes(&sales), vec!["LT-100", "LT-200", "LT-300"]);
        sales.set_sort_by(SortBy::Revenue);
        assert_eq!(sales.sort_by(), SortBy::Revenue);
        assert_eq!(codes(&sales), vec!["LT-100", "LT-300", "LT-200"]);
        sales.set_sort_by(SortBy::Code);
        assert_eq!(codes(&sales), vec!["LT-100", "LT-200", "LT-300"]);
    }

    #[test]
    fn display_lists_items_and_totals() {
        let text = sample().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[0].starts_with("Item"));
        assert!(lines[2].starts_with("LT-100"));
        assert!(lines[6].starts_with("Total"));
        assert!(lines[6].contains("17345.60"), "{}", lines[6]);
    }

    #[test]
    fn display_handles_empty_collection() {
        let text = SalesCollection::new(0.0).to_string();
        assert_eq!(text.lines().count(), 4);
    }
}
