use regex::Regex;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use std::{
    fmt::{Debug, Display},
    str::FromStr,
    sync::LazyLock,
};

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+(?:[.,]\d+)?$").expect("valid number regex"));

/// Represents a numeric amount read from, or written to, a spreadsheet.
///
/// Parsing accepts the formatting produced by Russian-locale accounting
/// exports as well as plain numbers: spaces (including non-breaking ones) may
/// separate thousands, and the decimal separator may be a comma or a point.
///
/// ```
/// # use sales_margin::Amount;
/// let amount: Amount = "12 345,60".parse().unwrap();
/// assert_eq!(amount.value(), 12345.6);
/// assert!("12.345,60".parse::<Amount>().is_err());
/// ```
///
/// The [`Display`] implementation prints the shortest representation that
/// parses back to the same value, so amounts survive a write/read cycle
/// unchanged.
#[derive(Clone, Copy, Default, DeserializeFromStr, SerializeDisplay, PartialEq, PartialOrd)]
pub struct Amount(f64);

impl Amount {
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl From<f64> for Amount {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl Debug for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Returned when text does not look like a number.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("not a number: {0:?}")]
pub struct ParseAmountError(pub String);

impl FromStr for Amount {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let compact: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}' | '\t'))
            .collect();
        if !NUMBER.is_match(&compact) {
            return Err(ParseAmountError(s.to_string()));
        }
        compact
            .replace(',', ".")
            .parse()
            .map(Self)
            .map_err(|_| ParseAmountError(s.to_string()))
    }
}
