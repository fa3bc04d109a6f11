use serde::Serialize;
use tracing::info;

use std::{path::Path, str::FromStr};

use crate::{
    amount::Amount,
    error::{Error, ImportError, Result, TableError},
    store::CostStore,
    table::{self, Cell, Row, Tabular},
};

/// Column labels of an exported cost table, in order.
pub const COSTS_HEADER: [&str; 2] = ["Артикул", "Себестоимость USD"];

/// One line of an exported cost table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CostRecord {
    #[serde(rename = "Артикул")]
    pub item_code: String,
    #[serde(rename = "Себестоимость USD")]
    pub cost_usd: Amount,
}

impl Tabular for CostRecord {
    const HEADER: &'static [&'static str] = &COSTS_HEADER;

    fn to_row(&self) -> Row {
        vec![
            Cell::Text(self.item_code.clone()),
            Cell::Number(self.cost_usd.value()),
        ]
    }
}

/// Reads `(item_code, cost)` pairs from a two-column cost table.
///
/// The first row is a header and is skipped, whatever it says. Columns after
/// the second are ignored, as are rows where both columns are blank.
///
/// # Errors
///
/// Returns errors if:
/// * The file does not exist ([`ImportError::NotFound`])
/// * A cost is blank or not a number ([`ImportError::BadValue`])
/// * A row has a cost but no item code ([`ImportError::MissingCode`])
/// * The file cannot be read for any other reason ([`ImportError::Other`])
pub fn read_costs(path: impl AsRef<Path>) -> std::result::Result<Vec<(String, f64)>, ImportError> {
    let rows = table::read_rows(path).map_err(|e| match e {
        TableError::NotFound(path) => ImportError::NotFound(path),
        other => ImportError::Other(other.to_string()),
    })?;
    let mut pairs = Vec::new();
    for (idx, row) in rows.iter().enumerate().skip(1) {
        let line = idx + 1;
        let code = row.first().unwrap_or(Cell::BLANK);
        let cost = row.get(1).unwrap_or(Cell::BLANK);
        if code.is_empty() && cost.is_empty() {
            continue;
        }
        if code.is_empty() {
            return Err(ImportError::MissingCode { row: line });
        }
        let bad_value = || ImportError::BadValue {
            row: line,
            value: cost.to_string(),
        };
        let cost = match cost {
            Cell::Number(n) if n.is_finite() => *n,
            Cell::Text(s) => Amount::from_str(s).map_err(|_| bad_value())?.value(),
            _ => return Err(bad_value()),
        };
        pairs.push((code.to_string(), cost));
    }
    Ok(pairs)
}

/// Imports the cost table at `path` into `store`, returning how many costs
/// were written.
///
/// The file is checked in full before anything is written, so a bad value
/// leaves the store unchanged.
///
/// # Errors
///
/// Returns [`Error::Import`] for any problem with the file (see
/// [`read_costs`]), and any error from the store.
pub fn import_costs(store: &impl CostStore, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let pairs = read_costs(path)?;
    let written = store.upsert_many(&pairs)?;
    info!(path = %path.display(), costs = written, "imported costs");
    Ok(written)
}

/// Writes every cost in `store` to a `.csv` or `.xlsx` file at `path`,
/// ordered by item code. Returns how many costs were written.
///
/// # Errors
///
/// Returns any error from the store, and [`Error::ExportFailed`] if the file
/// cannot be written.
pub fn export_costs(store: &impl CostStore, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let records: Vec<CostRecord> = store
        .all_costs()?
        .into_iter()
        .map(|(item_code, cost)| CostRecord {
            item_code,
            cost_usd: cost.into(),
        })
        .collect();
    table::write_records(path, &records).map_err(|e| Error::ExportFailed(e.to_string()))?;
    info!(path = %path.display(), costs = records.len(), "exported costs");
    Ok(records.len())
}
