use tracing::{debug, info};

use std::collections::HashSet;

use crate::{
    error::{Error, Result},
    sales::SalesCollection,
    store::CostStore,
};

/// Keys per lookup, kept well below SQLite's bound-parameter limit.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// What a [`CostMatcher::fill`] run did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchSummary {
    /// Lookups sent to the store.
    pub batches: usize,
    /// Items that received a cost.
    pub updated: usize,
    /// Item codes the store has no cost for.
    pub unmatched: usize,
    /// Stored costs refused because they were not positive.
    pub rejected: usize,
}

/// Fills in unit costs for a [`SalesCollection`] from a [`CostStore`].
///
/// Item codes are looked up in batches of at most `batch_size` keys, one
/// store call per batch. The final costs do not depend on the batch size.
#[derive(Clone, Copy, Debug)]
pub struct CostMatcher {
    batch_size: usize,
}

impl Default for CostMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl CostMatcher {
    /// A `batch_size` of zero is treated as one.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Looks up the cost of every distinct item code in `sales` and applies
    /// each one found.
    ///
    /// Items with no stored cost keep a USD cost of zero. A stored cost that
    /// is zero or negative is skipped (and logged) rather than failing the
    /// whole run.
    ///
    /// # Errors
    ///
    /// Returns any error from the store. Costs applied by earlier batches are
    /// kept.
    pub fn fill(&self, store: &impl CostStore, sales: &mut SalesCollection) -> Result<MatchSummary> {
        let mut seen = HashSet::new();
        let codes: Vec<String> = sales
            .item_codes()
            .into_iter()
            .filter(|code| seen.insert(code.clone()))
            .collect();

        let mut summary = MatchSummary::default();
        for batch in codes.chunks(self.batch_size) {
            let found = store.get_many(batch)?;
            summary.batches += 1;
            debug!(
                batch = summary.batches,
                keys = batch.len(),
                found = found.len(),
                "looked up costs"
            );
            for (item_code, cost_usd) in found {
                match sales.apply_cost(&item_code, cost_usd) {
                    Ok(true) => summary.updated += 1,
                    Ok(false) => {}
                    Err(Error::InvalidCost(_)) => summary.rejected += 1,
                    Err(e) => return Err(e),
                }
            }
        }
        summary.unmatched = codes.len().saturating_sub(summary.updated + summary.rejected);
        info!(
            items = codes.len(),
            batches = summary.batches,
            updated = summary.updated,
            unmatched = summary.unmatched,
            rejected = summary.rejected,
            "filled costs"
        );
        Ok(summary)
    }
}
