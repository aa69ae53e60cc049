//! Module implementing the equivalence relation between currency codes that
//! denote the same underlying asset under different tickers, e.g. `XBT` on
//! Kraken and `BTC` almost everywhere else.

use crate::models::Currency;
use anyhow::{Error, Result};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::str::FromStr;

/// A symmetric map of currency synonyms. Each currency belongs to at most one
/// synonym pair; lookups work from either side of a pair.
#[derive(Clone, Debug, Default)]
pub struct SynonymMap {
    synonyms: HashMap<Currency, Currency>,
}

impl SynonymMap {
    /// Creates a synonym map from currency pairs.
    ///
    /// # Panics
    ///
    /// Panics if a pair relates a currency to itself or if a currency appears
    /// in more than one pair, as either would make the relation ambiguous.
    pub fn new(pairs: impl IntoIterator<Item = (Currency, Currency)>) -> Self {
        let mut synonyms = HashMap::new();
        for (first, second) in pairs {
            assert!(
                first != second,
                "currency {} declared a synonym of itself",
                first,
            );
            let previous = synonyms.insert(first.clone(), second.clone());
            assert!(
                previous.is_none(),
                "currency {} appears in multiple synonym pairs",
                first,
            );
            let previous = synonyms.insert(second.clone(), first);
            assert!(
                previous.is_none(),
                "currency {} appears in multiple synonym pairs",
                second,
            );
        }
        SynonymMap { synonyms }
    }

    /// The commonly traded synonym pairs.
    pub fn standard() -> Self {
        lazy_static! {
            static ref STANDARD: SynonymMap = SynonymMap::new(vec![
                (Currency::new("XBT"), Currency::new("BTC")),
                (Currency::new("BCC"), Currency::new("BCH")),
            ]);
        }

        STANDARD.clone()
    }

    /// Returns the synonym of a currency, if it has one.
    pub fn of(&self, currency: &Currency) -> Option<&Currency> {
        self.synonyms.get(currency)
    }

    /// Returns true if the two codes denote the same underlying asset, either
    /// by being equal or by being synonyms of each other.
    pub fn equivalent(&self, first: &Currency, second: &Currency) -> bool {
        first == second || self.of(first) == Some(second)
    }
}

impl FromStr for SynonymMap {
    type Err = Error;

    /// Parses a JSON object of one-sided synonym declarations, e.g.
    /// `{"XBT": "BTC", "BCC": "BCH"}`. The symmetric closure is taken
    /// automatically.
    fn from_str(value: &str) -> Result<Self> {
        let pairs: HashMap<String, String> = serde_json::from_str(value)?;
        Ok(SynonymMap::new(pairs.into_iter().map(|(first, second)| {
            (Currency::new(first), Currency::new(second))
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_symmetric() {
        let synonyms = SynonymMap::standard();
        let xbt = Currency::new("XBT");
        let btc = Currency::new("BTC");
        assert_eq!(synonyms.of(&xbt), Some(&btc));
        assert_eq!(synonyms.of(&btc), Some(&xbt));
        assert_eq!(synonyms.of(&Currency::new("ETH")), None);
    }

    #[test]
    fn equivalence_covers_identity_and_synonyms() {
        let synonyms = SynonymMap::standard();
        assert!(synonyms.equivalent(&Currency::new("BTC"), &Currency::new("BTC")));
        assert!(synonyms.equivalent(&Currency::new("BTC"), &Currency::new("XBT")));
        assert!(synonyms.equivalent(&Currency::new("XBT"), &Currency::new("BTC")));
        assert!(!synonyms.equivalent(&Currency::new("BTC"), &Currency::new("ETH")));
    }

    #[test]
    fn parses_json_configuration() {
        let synonyms: SynonymMap = r#"{"USDT": "USD"}"#.parse().unwrap();
        assert!(synonyms.equivalent(&Currency::new("USDT"), &Currency::new("USD")));
        assert!(synonyms.equivalent(&Currency::new("USD"), &Currency::new("USDT")));
    }

    #[test]
    #[should_panic]
    fn rejects_currency_in_multiple_pairs() {
        SynonymMap::new(vec![
            (Currency::new("XBT"), Currency::new("BTC")),
            (Currency::new("BTC"), Currency::new("BCH")),
        ]);
    }

    #[test]
    #[should_panic]
    fn rejects_self_synonym() {
        SynonymMap::new(vec![(Currency::new("BTC"), Currency::new("BTC"))]);
    }
}
