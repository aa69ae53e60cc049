use anyhow::{ensure, Error, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// A short uppercase currency code such as `BTC` or `USD`.
///
/// Codes are normalized to upper case on construction so that lookups are
/// case-insensitive with respect to the venue's spelling.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[serde(from = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl AsRef<str>) -> Self {
        Currency(code.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Currency {
    fn from(code: String) -> Self {
        Currency::new(code)
    }
}

impl From<&str> for Currency {
    fn from(code: &str) -> Self {
        Currency::new(code)
    }
}

impl FromStr for Currency {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let currency = Currency::new(value);
        ensure!(!currency.is_empty(), "empty currency code");
        Ok(currency)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered currency pair in the exchange's `BASE/QUOTE` notation, e.g.
/// `ETH/USD`. BASE is priced in units of QUOTE.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Symbol {
    pub base: Currency,
    pub quote: Currency,
}

impl Symbol {
    pub fn new(base: impl Into<Currency>, quote: impl Into<Currency>) -> Self {
        Symbol {
            base: base.into(),
            quote: quote.into(),
        }
    }
}

impl FromStr for Symbol {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let mut parts = value.splitn(2, '/');
        let base = parts.next().unwrap_or_default();
        let quote = parts.next().unwrap_or_default();
        ensure!(
            !base.trim().is_empty() && !quote.trim().is_empty(),
            "malformed symbol '{}'",
            value,
        );
        Ok(Symbol::new(base, quote))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}
