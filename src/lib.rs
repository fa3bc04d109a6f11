#![doc = include_str!("../README.md")]

mod amount;
pub mod costs;
mod error;
mod item;
mod matcher;
mod report;
pub mod sales;
pub mod store;
pub mod table;

pub use amount::{Amount, ParseAmountError};
pub use error::{Error, ImportError, ParseError, Result, TableError};
pub use item::SalesItem;
pub use matcher::{CostMatcher, MatchSummary, DEFAULT_BATCH_SIZE};
pub use report::{ReportParser, SaleRow, DEFAULT_HEADER_MARKER, DEFAULT_TOTAL_MARKER};
pub use sales::{SalesCollection, SortBy};
pub use store::{CostStore, SqliteStore};
