use tracing::warn;

use crate::{
    error::{Error, Result},
    report::SaleRow,
};

/// Sales and cost figures for a single item.
///
/// The sale facts (`item_code`, `sold_qty`, `sold_sum` and the average
/// `sold_price` derived from them) are fixed when the item is created. The
/// unit cost in USD is set later, and the RUB cost and margins are derived
/// from it and the USD→RUB exchange rate.
///
/// The exchange rate is not stored on the item: it is passed in to
/// [`SalesItem::set_cost`] and [`SalesItem::recompute`]. After the rate
/// changes, derived fields stay as they were until `recompute` is called
/// again.
///
/// # Examples
///
/// ```
/// # use sales_margin::SalesItem;
/// let mut item = SalesItem::new("LT-100", 4, 12000.0);
/// assert_eq!(item.sold_price(), 3000.0);
///
/// item.set_cost(25.0, 100.0).unwrap();
/// assert_eq!(item.cost_rub(), 2500.0);
/// assert_eq!(item.margin_abs(), 500.0);
/// assert_eq!(item.margin_pct(), 20.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct SalesItem {
    item_code: String,
    sold_qty: u32,
    sold_price: f64,
    sold_sum: f64,
    cost_usd: f64,
    cost_rub: f64,
    margin_abs: f64,
    margin_pct: f64,
}

impl SalesItem {
    /// Creates an item with no cost information.
    ///
    /// The average sale price is `sold_sum / sold_qty`, or zero if nothing was
    /// sold.
    #[must_use]
    pub fn new(item_code: impl Into<String>, sold_qty: u32, sold_sum: f64) -> Self {
        let sold_price = if sold_qty > 0 {
            sold_sum / f64::from(sold_qty)
        } else {
            0.0
        };
        Self {
            item_code: item_code.into(),
            sold_qty,
            sold_price,
            sold_sum,
            cost_usd: 0.0,
            cost_rub: 0.0,
            margin_abs: 0.0,
            margin_pct: 0.0,
        }
    }

    /// Sets the unit cost in USD.
    ///
    /// If `rate` is positive, the RUB cost and margins are recomputed
    /// straight away. Otherwise they keep their previous values until
    /// [`Self::recompute`] is called with a usable rate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCost`] if `cost_usd` is not greater than zero.
    /// The item is left unchanged.
    pub fn set_cost(&mut self, cost_usd: f64, rate: f64) -> Result<()> {
        if !(cost_usd > 0.0) {
            warn!(item_code = %self.item_code, cost_usd, "rejected non-positive unit cost");
            return Err(Error::InvalidCost(cost_usd));
        }
        self.cost_usd = cost_usd;
        if rate > 0.0 {
            self.recompute(rate)?;
        }
        Ok(())
    }

    /// Recomputes the RUB cost and, if anything was sold, the margins.
    ///
    /// Calling this again with the same rate gives the same result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] if `rate` or the USD cost is not greater
    /// than zero. The item is left unchanged.
    pub fn recompute(&mut self, rate: f64) -> Result<()> {
        if !(rate > 0.0 && self.cost_usd > 0.0) {
            return Err(Error::NotReady {
                rate,
                cost_usd: self.cost_usd,
            });
        }
        self.cost_rub = self.cost_usd * rate;
        if self.sold_qty != 0 {
            self.margin_abs = self.sold_price - self.cost_rub;
            self.margin_pct = self.margin_abs * 100.0 / self.cost_rub;
        }
        Ok(())
    }

    #[must_use]
    pub fn item_code(&self) -> &str {
        &self.item_code
    }

    #[must_use]
    pub fn sold_qty(&self) -> u32 {
        self.sold_qty
    }

    #[must_use]
    pub fn sold_price(&self) -> f64 {
        self.sold_price
    }

    #[must_use]
    pub fn sold_sum(&self) -> f64 {
        self.sold_sum
    }

    #[must_use]
    pub fn cost_usd(&self) -> f64 {
        self.cost_usd
    }

    #[must_use]
    pub fn cost_rub(&self) -> f64 {
        self.cost_rub
    }

    /// Margin per unit sold, in RUB.
    #[must_use]
    pub fn margin_abs(&self) -> f64 {
        self.margin_abs
    }

    /// Margin as a percentage of the RUB cost.
    #[must_use]
    pub fn margin_pct(&self) -> f64 {
        self.margin_pct
    }
}

impl From<SaleRow> for SalesItem {
    fn from(row: SaleRow) -> Self {
        Self::new(row.item_code, row.sold_qty, row.sold_sum)
    }
}
