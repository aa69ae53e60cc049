use super::Currency;
use std::collections::HashSet;
use std::fmt;

/// One conversion step of an arbitrage chain: converting `from_cur` into
/// `next_cur` on `exchange`. All fields are fixed at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Trade {
    pub exchange: String,
    pub from_cur: Currency,
    pub next_cur: Currency,
    /// The output amount of `next_cur` produced by this step.
    pub amount: f64,
    /// The worst price touched on the book while filling this step.
    pub limit: f64,
    /// The effective conversion rate: output amount per input amount.
    pub value: f64,
}

impl Trade {
    pub fn new(
        exchange: impl Into<String>,
        from_cur: Currency,
        next_cur: Currency,
        amount: f64,
        limit: f64,
        value: f64,
    ) -> Self {
        Trade {
            exchange: exchange.into(),
            from_cur,
            next_cur,
            amount,
            limit,
            value,
        }
    }

    /// Returns the compounded profitability of a chain as a fraction: the
    /// product of the chain's conversion rates minus one. An empty chain has
    /// zero profitability.
    pub fn profitability(trades: &[Trade]) -> f64 {
        trades.iter().fold(1.0, |profit, trade| profit * trade.value) - 1.0
    }

    /// Returns the number of distinct exchanges the chain traverses.
    pub fn num_exchanges(trades: &[Trade]) -> usize {
        trades
            .iter()
            .map(|trade| trade.exchange.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// The identity of the directed edge this trade walks.
    pub fn unique_key(&self) -> (&str, &Currency, &Currency) {
        (&self.exchange, &self.from_cur, &self.next_cur)
    }

    /// The identity of the reverse of the edge this trade walks.
    pub fn unique_key_inv(&self) -> (&str, &Currency, &Currency) {
        (&self.exchange, &self.next_cur, &self.from_cur)
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{exchange: {}, from: {}, next: {}, amount: {:.8}, limit: {:.8}, value: {:.8}}}",
            self.exchange, self.from_cur, self.next_cur, self.amount, self.limit, self.value,
        )
    }
}

/// Displays a chain of trades as the ordered concatenation of its steps.
pub struct ChainDisplay<'a>(pub &'a [Trade]);

impl fmt::Display for ChainDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("[")?;
        let mut trades = self.0.iter();
        if let Some(trade) = trades.next() {
            write!(f, "{}", trade)?;
        }
        for trade in trades {
            write!(f, ", {}", trade)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn trade(exchange: &str, from: &str, next: &str, value: f64) -> Trade {
        Trade::new(
            exchange,
            Currency::new(from),
            Currency::new(next),
            1.0,
            1.0,
            value,
        )
    }

    #[test]
    fn profitability_of_empty_chain_is_zero() {
        assert_approx_eq!(Trade::profitability(&[]), 0.0);
    }

    #[test]
    fn profitability_compounds_values() {
        let chain = [
            trade("a", "USD", "BTC", 0.0001),
            trade("a", "BTC", "ETH", 20.0),
            trade("a", "ETH", "USD", 750.0),
        ];
        assert_approx_eq!(Trade::profitability(&chain), 0.5);
    }

    #[test]
    fn profitability_composes_over_concatenation() {
        let chain1 = [trade("a", "USD", "BTC", 1.1)];
        let chain2 = [trade("b", "BTC", "USD", 0.9), trade("b", "USD", "ETH", 1.2)];
        let combined: Vec<_> = chain1.iter().chain(&chain2).cloned().collect();

        let expected = (1.0 + Trade::profitability(&chain1))
            * (1.0 + Trade::profitability(&chain2))
            - 1.0;
        assert_approx_eq!(Trade::profitability(&combined), expected);
    }

    #[test]
    fn num_exchanges_counts_distinct_venues() {
        let chain = [
            trade("a", "USD", "BTC", 1.0),
            trade("b", "BTC", "ETH", 1.0),
            trade("a", "ETH", "USD", 1.0),
        ];
        assert_eq!(Trade::num_exchanges(&chain), 2);
        assert_eq!(Trade::num_exchanges(&[]), 0);
    }

    #[test]
    fn unique_keys_identify_edge_and_reverse() {
        let trade = trade("a", "USD", "BTC", 1.0);
        let usd = Currency::new("USD");
        let btc = Currency::new("BTC");
        assert_eq!(trade.unique_key(), ("a", &usd, &btc));
        assert_eq!(trade.unique_key_inv(), ("a", &btc, &usd));
    }

    #[test]
    fn trades_render_floats_with_eight_decimals() {
        let trade = Trade::new(
            "kraken",
            Currency::new("USD"),
            Currency::new("BTC"),
            1.0,
            10_000.0,
            0.0001,
        );
        assert_eq!(
            trade.to_string(),
            "{exchange: kraken, from: USD, next: BTC, \
             amount: 1.00000000, limit: 10000.00000000, value: 0.00010000}",
        );
    }

    #[test]
    fn chains_render_as_concatenated_trades() {
        let chain = [trade("a", "USD", "BTC", 1.0), trade("a", "BTC", "USD", 1.0)];
        let rendered = ChainDisplay(&chain).to_string();
        assert!(rendered.starts_with("[{exchange: a, from: USD"));
        assert!(rendered.contains("}, {exchange: a, from: BTC"));
        assert!(rendered.ends_with("}]"));
    }
}
