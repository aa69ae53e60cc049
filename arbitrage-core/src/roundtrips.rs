//! Module implementing the bounded depth-first enumeration of conversion
//! chains over a rate table snapshot. A roundtrip starts and ends, possibly
//! modulo synonyms, in the same currency; every step's conversion rate is
//! realized by walking the book for the amount actually carried into it.

use crate::models::{Currency, Trade};
use crate::rate_table::Snapshot;
use crate::synonyms::SynonymMap;
use std::collections::HashSet;

/// Enumerates roundtrips from `cur` back to itself across venues, sorted by
/// compounded profitability descending.
///
/// `venues` and `coins` optionally restrict which venues are expanded and
/// which currencies chains may pass through. `max_steps` bounds the chain
/// length. The search never mutates the snapshot it is handed.
pub fn best_roundtrips(
    synonyms: &SynonymMap,
    snapshot: &Snapshot,
    cur: &Currency,
    amount: f64,
    venues: Option<&HashSet<String>>,
    coins: Option<&HashSet<Currency>>,
    max_steps: usize,
) -> Vec<Vec<Trade>> {
    let search = Search {
        synonyms,
        snapshot,
        target: cur,
        venues,
        coins,
        max_steps,
    };

    let mut solutions = Vec::new();
    search.expand(cur, amount, &mut Vec::new(), &mut solutions);
    solutions.sort_by(|a, b| {
        Trade::profitability(b)
            .partial_cmp(&Trade::profitability(a))
            .expect("profitability cannot be NaN")
    });
    solutions
}

struct Search<'a> {
    synonyms: &'a SynonymMap,
    snapshot: &'a Snapshot,
    target: &'a Currency,
    venues: Option<&'a HashSet<String>>,
    coins: Option<&'a HashSet<Currency>>,
    max_steps: usize,
}

impl Search<'_> {
    fn expand(
        &self,
        current: &Currency,
        amount: f64,
        chain: &mut Vec<Trade>,
        solutions: &mut Vec<Vec<Trade>>,
    ) {
        // Arriving back at the target currency (or a synonym of it) closes
        // the roundtrip; the empty chain at the search root does not count.
        if !chain.is_empty() && self.synonyms.equivalent(current, self.target) {
            solutions.push(chain.clone());
            return;
        }
        if chain.len() >= self.max_steps {
            return;
        }

        for (venue, books) in self.snapshot {
            if let Some(venues) = self.venues {
                if !venues.contains(venue) {
                    continue;
                }
            }

            // Outgoing edges of the current currency under both its own code
            // and its synonym, as listed on this venue.
            let rows = books.get(current).into_iter().chain(
                self.synonyms
                    .of(current)
                    .and_then(|synonym| books.get(synonym)),
            );
            for row in rows {
                for (next_cur, book) in row {
                    let fill = match book.fill(amount) {
                        Some(fill) => fill,
                        None => continue,
                    };
                    if let Some(coins) = self.coins {
                        if !coins.contains(next_cur) {
                            continue;
                        }
                    }

                    let trade = Trade::new(
                        venue.clone(),
                        current.clone(),
                        next_cur.clone(),
                        fill.output_amount,
                        fill.limit_price,
                        fill.avg_price,
                    );
                    // Never walk the same directed edge, or its reverse, on
                    // the same venue twice within one chain.
                    let repeats_edge = chain.iter().any(|previous| {
                        previous.unique_key() == trade.unique_key()
                            || previous.unique_key() == trade.unique_key_inv()
                    });
                    if repeats_edge {
                        continue;
                    }

                    chain.push(trade);
                    self.expand(next_cur, fill.output_amount, chain, solutions);
                    chain.pop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_table::test_util::{snapshot_from, symmetric_market, venue_books};
    use assert_approx_eq::assert_approx_eq;

    fn usd() -> Currency {
        Currency::new("USD")
    }

    /// The canonical three-pair venue: buying BTC with USD, converting to
    /// ETH, and selling the ETH for USD nets 50%.
    fn three_stage_snapshot(eth_btc_volume: f64) -> Snapshot {
        snapshot_from(vec![(
            "mock",
            venue_books(vec![
                ("BTC/USD", symmetric_market(10_000.0, 20_000.0)),
                ("ETH/BTC", symmetric_market(0.05, eth_btc_volume)),
                ("ETH/USD", symmetric_market(750.0, 40.0)),
            ]),
        )])
    }

    fn roundtrips(
        snapshot: &Snapshot,
        cur: &Currency,
        amount: f64,
        max_steps: usize,
    ) -> Vec<Vec<Trade>> {
        best_roundtrips(
            &SynonymMap::standard(),
            snapshot,
            cur,
            amount,
            None,
            None,
            max_steps,
        )
    }

    #[test]
    fn finds_three_stage_roundtrip() {
        let snapshot = three_stage_snapshot(1_000.0);
        let solutions = roundtrips(&snapshot, &usd(), 10_000.0, 3);

        // The profitable direction and its mirror image are the only two
        // three-step roundtrips; two-step ones reverse their own first edge.
        assert_eq!(solutions.len(), 2);

        let best = &solutions[0];
        assert_approx_eq!(Trade::profitability(best), 0.5);
        assert!(best.iter().all(|trade| trade.exchange == "mock"));
        let froms: Vec<_> = best.iter().map(|t| t.from_cur.as_str()).collect();
        let nexts: Vec<_> = best.iter().map(|t| t.next_cur.as_str()).collect();
        assert_eq!(froms, ["USD", "BTC", "ETH"]);
        assert_eq!(nexts, ["BTC", "ETH", "USD"]);

        assert!(Trade::profitability(&solutions[1]) < 0.0);
    }

    #[test]
    fn realizes_fill_amounts_along_the_chain() {
        let snapshot = three_stage_snapshot(1_000.0);
        let solutions = roundtrips(&snapshot, &usd(), 10_000.0, 3);

        let best = &solutions[0];
        // 10000 USD buy 1 BTC, which buys 20 ETH, which sell for 15000 USD.
        assert_approx_eq!(best[0].amount, 1.0);
        assert_approx_eq!(best[1].amount, 20.0);
        assert_approx_eq!(best[2].amount, 15_000.0);
        assert_approx_eq!(best[2].limit, 750.0);
    }

    #[test]
    fn aborts_chains_on_insufficient_liquidity() {
        let snapshot = three_stage_snapshot(0.01);
        assert!(roundtrips(&snapshot, &usd(), 10_000.0, 3).is_empty());
    }

    #[test]
    fn never_repeats_an_edge_or_its_reverse() {
        let snapshot = three_stage_snapshot(1_000.0);
        let solutions = roundtrips(&snapshot, &usd(), 10_000.0, 4);
        assert!(!solutions.is_empty());

        for chain in &solutions {
            for (i, first) in chain.iter().enumerate() {
                for second in &chain[i + 1..] {
                    assert_ne!(first.unique_key(), second.unique_key());
                    assert_ne!(first.unique_key(), second.unique_key_inv());
                }
            }
        }
    }

    #[test]
    fn solutions_are_sorted_by_profitability() {
        let snapshot = three_stage_snapshot(1_000.0);
        let solutions = roundtrips(&snapshot, &usd(), 10_000.0, 4);

        let profits: Vec<_> = solutions.iter().map(|c| Trade::profitability(c)).collect();
        let mut sorted = profits.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(profits, sorted);
    }

    #[test]
    fn depth_cutoff_bounds_chain_length() {
        let snapshot = three_stage_snapshot(1_000.0);
        // All two-step roundtrips reverse their first edge, so nothing
        // survives below three steps.
        assert!(roundtrips(&snapshot, &usd(), 10_000.0, 2).is_empty());
        assert!(roundtrips(&snapshot, &usd(), 10_000.0, 0).is_empty());
    }

    #[test]
    fn roundtrips_may_close_on_a_synonym() {
        let snapshot = snapshot_from(vec![(
            "mock",
            venue_books(vec![("XBT/USD", symmetric_market(10_000.0, 1_000_000.0))]),
        )]);

        let solutions = roundtrips(&snapshot, &Currency::new("BTC"), 1.0, 2);
        assert_eq!(solutions.len(), 1);

        let chain = &solutions[0];
        assert_eq!(chain[0].from_cur, Currency::new("BTC"));
        assert_eq!(chain[1].next_cur, Currency::new("XBT"));
        assert!(SynonymMap::standard().equivalent(&chain[1].next_cur, &Currency::new("BTC")));
    }

    #[test]
    fn venue_filter_restricts_expansion() {
        let mut snapshot = three_stage_snapshot(1_000.0);
        snapshot.extend(snapshot_from(vec![(
            "other",
            venue_books(vec![("BTC/USD", symmetric_market(10_000.0, 20_000.0))]),
        )]));

        let venues: HashSet<String> = vec!["mock".to_owned()].into_iter().collect();
        let solutions = best_roundtrips(
            &SynonymMap::standard(),
            &snapshot,
            &usd(),
            10_000.0,
            Some(&venues),
            None,
            3,
        );
        assert!(!solutions.is_empty());
        for chain in &solutions {
            assert!(chain.iter().all(|trade| trade.exchange == "mock"));
        }
    }

    #[test]
    fn coin_filter_restricts_intermediate_currencies() {
        let snapshot = three_stage_snapshot(1_000.0);
        let coins: HashSet<Currency> = vec![Currency::new("BTC"), Currency::new("USD")]
            .into_iter()
            .collect();

        // Without ETH there is no way back to USD that does not reverse the
        // first edge.
        let solutions = best_roundtrips(
            &SynonymMap::standard(),
            &snapshot,
            &usd(),
            10_000.0,
            None,
            Some(&coins),
            3,
        );
        assert!(solutions.is_empty());
    }

    #[test]
    fn non_positive_amounts_find_nothing() {
        let snapshot = three_stage_snapshot(1_000.0);
        assert!(roundtrips(&snapshot, &usd(), 0.0, 3).is_empty());
        assert!(roundtrips(&snapshot, &usd(), -1.0, 3).is_empty());
    }
}
