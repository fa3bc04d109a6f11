use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Settings key holding the USD→RUB exchange rate.
pub const EXCHANGE_RATE_KEY: &str = "usd_exchange_rate";

/// Most item codes bound into one `IN (?, …)` lookup; SQLite's default limit
/// on bound parameters is 32766.
pub const MAX_LOOKUP_PARAMS: usize = 30_000;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items_cost (
    item_code TEXT PRIMARY KEY NOT NULL,
    cost REAL
);

CREATE TABLE IF NOT EXISTS settings (
    param TEXT PRIMARY KEY NOT NULL,
    value
);

INSERT OR IGNORE INTO settings (param, value) VALUES ('usd_exchange_rate', 0);
"#;

/// Persistent unit costs keyed by item code, plus numeric settings.
///
/// Every call is atomic on its own; nothing spans calls.
pub trait CostStore {
    /// Inserts or replaces the cost of each `(item_code, cost)` pair.
    ///
    /// If an item code appears more than once, the last pair wins.
    fn upsert_many(&self, pairs: &[(String, f64)]) -> Result<usize>;

    /// Returns the stored `(item_code, cost)` pairs for `keys`.
    ///
    /// Codes that have no cost are left out of the result.
    fn get_many(&self, keys: &[String]) -> Result<Vec<(String, f64)>>;

    /// Returns every stored cost, ordered by item code.
    fn all_costs(&self) -> Result<Vec<(String, f64)>>;

    fn get_setting(&self, name: &str) -> Result<Option<f64>>;

    fn set_setting(&self, name: &str, value: f64) -> Result<()>;

    /// Returns the stored exchange rate, or zero if it has never been set.
    fn exchange_rate(&self) -> Result<f64> {
        Ok(self.get_setting(EXCHANGE_RATE_KEY)?.unwrap_or(0.0))
    }

    fn set_exchange_rate(&self, rate: f64) -> Result<()> {
        self.set_setting(EXCHANGE_RATE_KEY, rate)
    }
}

/// A [`CostStore`] kept in an SQLite database file.
///
/// A connection is opened for each operation and closed when it finishes,
/// whether or not the operation succeeded.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Opens the database at `path`, creating the file and its tables if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns any error from opening the database or creating its schema.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        store.with_connection(|conn| conn.execute_batch(SCHEMA))?;
        debug!(path = %store.path.display(), "opened cost store");
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_connection<T>(
        &self,
        work: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut conn = Connection::open(&self.path)?;
        let result = work(&mut conn);
        let closed = conn.close().map_err(|(_, e)| e);
        let value = result?;
        closed?;
        Ok(value)
    }
}

impl CostStore for SqliteStore {
    fn upsert_many(&self, pairs: &[(String, f64)]) -> Result<usize> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO items_cost (item_code, cost) VALUES (?1, ?2)
                     ON CONFLICT (item_code) DO UPDATE SET cost = excluded.cost",
                )?;
                for (item_code, cost) in pairs {
                    stmt.execute(params![item_code, cost])?;
                }
            }
            tx.commit()?;
            Ok(pairs.len())
        })
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<(String, f64)>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.with_connection(|conn| {
            let mut found = Vec::new();
            for chunk in keys.chunks(MAX_LOOKUP_PARAMS) {
                let placeholders = vec!["?"; chunk.len()].join(", ");
                let sql = format!(
                    "SELECT item_code, cost FROM items_cost WHERE item_code IN ({placeholders})"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk), cost_pair)?;
                for pair in rows {
                    found.extend(pair?);
                }
            }
            Ok(found)
        })
    }

    fn all_costs(&self) -> Result<Vec<(String, f64)>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT item_code, cost FROM items_cost ORDER BY item_code ASC")?;
            let mut costs = Vec::new();
            for pair in stmt.query_map([], cost_pair)? {
                costs.extend(pair?);
            }
            Ok(costs)
        })
    }

    fn get_setting(&self, name: &str) -> Result<Option<f64>> {
        self.with_connection(|conn| {
            let value: Option<Option<f64>> = conn
                .query_row("SELECT value FROM settings WHERE param = ?1", [name], |row| row.get(0))
                .optional()?;
            Ok(value.flatten())
        })
    }

    fn set_setting(&self, name: &str, value: f64) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO settings (param, value) VALUES (?1, ?2)
                 ON CONFLICT (param) DO UPDATE SET value = excluded.value",
                params![name, value],
            )?;
            Ok(())
        })
    }
}

/// Reads an `(item_code, cost)` row; a NULL cost counts as no cost.
fn cost_pair(row: &Row<'_>) -> rusqlite::Result<Option<(String, f64)>> {
    let cost: Option<f64> = row.get(1)?;
    match cost {
        Some(cost) => Ok(Some((row.get(0)?, cost))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("costs.sqlite")).unwrap();
        (dir, store)
    }

    fn pairs(items: &[(&str, f64)]) -> Vec<(String, f64)> {
        items.iter().map(|(code, cost)| ((*code).to_string(), *cost)).collect()
    }

    #[test]
    fn open_fn_seeds_zero_exchange_rate() {
        let (_dir, store) = store();
        assert_eq!(store.get_setting(EXCHANGE_RATE_KEY).unwrap(), Some(0.0));
        assert_eq!(store.exchange_rate().unwrap(), 0.0);
    }

    #[test]
    fn open_fn_keeps_existing_data() {
        let (_dir, store) = store();
        store.upsert_many(&pairs(&[("A", 1.0)])).unwrap();
        store.set_exchange_rate(92.5).unwrap();

        let reopened = SqliteStore::open(store.path()).unwrap();
        assert_eq!(reopened.exchange_rate().unwrap(), 92.5);
        assert_eq!(reopened.all_costs().unwrap(), pairs(&[("A", 1.0)]));
    }

    #[test]
    fn upsert_many_fn_last_write_wins() {
        let (_dir, store) = store();
        store.upsert_many(&pairs(&[("B", 2.0), ("A", 1.0)])).unwrap();
        store.upsert_many(&pairs(&[("A", 3.0), ("A", 4.0)])).unwrap();
        assert_eq!(store.all_costs().unwrap(), pairs(&[("A", 4.0), ("B", 2.0)]));
    }

    #[test]
    fn upsert_many_fn_stores_any_sign() {
        let (_dir, store) = store();
        store.upsert_many(&pairs(&[("NEG", -1.5)])).unwrap();
        assert_eq!(store.all_costs().unwrap(), pairs(&[("NEG", -1.5)]));
    }

    #[test]
    fn get_many_fn_returns_only_matched_keys() {
        let (_dir, store) = store();
        store.upsert_many(&pairs(&[("A", 1.0), ("B", 2.0), ("C", 3.0)])).unwrap();
        let keys = vec!["C".to_string(), "X".to_string(), "A".to_string()];
        let mut found = store.get_many(&keys).unwrap();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(found, pairs(&[("A", 1.0), ("C", 3.0)]));
        assert!(store.get_many(&[]).unwrap().is_empty());
    }

    #[test]
    fn get_setting_fn_returns_none_for_unknown_name() {
        let (_dir, store) = store();
        assert_eq!(store.get_setting("nope").unwrap(), None);
        store.set_setting("nope", 1.0).unwrap();
        assert_eq!(store.get_setting("nope").unwrap(), Some(1.0));
    }

    #[test]
    fn get_many_and_all_costs_fns_skip_items_stored_without_cost() {
        let (_dir, store) = store();
        store.upsert_many(&pairs(&[("A", 2.0)])).unwrap();
        store
            .with_connection(|conn| conn.execute("INSERT INTO items_cost (item_code, cost) VALUES ('B', NULL)", []))
            .unwrap();

        let keys = vec!["A".to_string(), "B".to_string()];
        assert_eq!(store.get_many(&keys).unwrap(), pairs(&[("A", 2.0)]));
        assert_eq!(store.all_costs().unwrap(), pairs(&[("A", 2.0)]));
    }

    #[test]
    fn get_many_fn_splits_lookups_larger_than_parameter_limit() {
        let (_dir, store) = store();
        store.upsert_many(&pairs(&[("K-0", 1.0), ("K-30001", 2.0)])).unwrap();
        let keys: Vec<String> = (0..=MAX_LOOKUP_PARAMS + 1).map(|i| format!("K-{i}")).collect();
        let mut found = store.get_many(&keys).unwrap();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(found, pairs(&[("K-0", 1.0), ("K-30001", 2.0)]));
    }

    #[test]
    fn with_connection_fn_returns_the_error_from_the_work() {
        let (_dir, store) = store();
        let err = store
            .with_connection(|conn| conn.execute("SELECT * FROM no_such_table", []))
            .unwrap_err();
        assert!(err.to_string().contains("no_such_table"), "{err}");
    }
}
