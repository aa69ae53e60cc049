//! Module wiring the populators and the roundtrip enumerator together:
//! refresh every venue, enumerate roundtrips for the configured starting
//! position, and publish the candidates that clear the profit threshold.

use crate::exchanges::ExchangeClient;
use crate::models::{ChainDisplay, Currency, Trade};
use crate::populator;
use crate::rate_table::RateTable;
use async_std::task;
use futures::future;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A conversion chain whose compounded profit cleared the configured
/// threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct ArbitrageCandidate {
    pub trades: Vec<Trade>,
    pub profit: f64,
}

impl fmt::Display for ArbitrageCandidate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} for {}% profit",
            ChainDisplay(&self.trades),
            self.profit * 100.0,
        )
    }
}

/// A trait representing the sink that detected candidates are published to.
#[cfg_attr(test, mockall::automock)]
pub trait CandidateReporting: Send + Sync {
    fn report(&self, candidate: &ArbitrageCandidate);
}

#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// The currency the roundtrip search starts and ends in.
    pub start_currency: Currency,
    /// The amount of `start_currency` to trade along each chain.
    pub start_amount: f64,
    /// The minimum compounded profit, as a fraction, for a chain to be
    /// published.
    pub arbitrage_threshold: f64,
    /// The maximum number of conversion steps per chain.
    pub max_steps: usize,
    /// Currencies excluded from ingestion everywhere.
    pub blacklist: HashSet<Currency>,
    /// The pause between two refreshes of the same venue.
    pub refresh_interval: Duration,
    /// The pause between two reporting sweeps in forever mode.
    pub report_interval: Duration,
    /// At most this many candidates are published per sweep.
    pub report_limit: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            start_currency: Currency::new("USD"),
            start_amount: 10_000.0,
            arbitrage_threshold: 0.02,
            max_steps: 3,
            blacklist: HashSet::new(),
            refresh_interval: populator::DEFAULT_REFRESH_INTERVAL,
            report_interval: Duration::from_secs(1),
            report_limit: 5,
        }
    }
}

/// The detector's top level: owns the rate table, the exchange clients, and
/// the reporting sink.
pub struct Driver {
    rate_table: Arc<RateTable>,
    clients: Vec<Arc<dyn ExchangeClient>>,
    reporter: Arc<dyn CandidateReporting>,
    config: DriverConfig,
}

impl Driver {
    pub fn new(
        rate_table: Arc<RateTable>,
        clients: Vec<Arc<dyn ExchangeClient>>,
        reporter: Arc<dyn CandidateReporting>,
        config: DriverConfig,
    ) -> Self {
        Driver {
            rate_table,
            clients,
            reporter,
            config,
        }
    }

    /// Refreshes every venue once, concurrently, and returns the detected
    /// candidates. Venues that fail to refresh are skipped with a warning;
    /// detection proceeds on whatever data is available.
    pub async fn run_once(&self) -> Vec<ArbitrageCandidate> {
        let refreshes = self.clients.iter().map(|client| async move {
            if let Err(err) = self
                .rate_table
                .populate(client.as_ref(), &self.config.blacklist)
                .await
            {
                log::warn!("failed to refresh rates for {}: {}", client.name(), err);
            }
        });
        future::join_all(refreshes).await;

        self.detect().await
    }

    /// Launches one populator per venue and publishes detected candidates
    /// periodically until the process is stopped.
    pub async fn run_forever(&self) {
        let blacklist = Arc::new(self.config.blacklist.clone());
        let _populators: Vec<_> = self
            .clients
            .iter()
            .map(|client| {
                populator::start(
                    &self.rate_table,
                    client.clone(),
                    blacklist.clone(),
                    self.config.refresh_interval,
                )
            })
            .collect();

        loop {
            for candidate in self
                .detect()
                .await
                .iter()
                .take(self.config.report_limit)
            {
                self.reporter.report(candidate);
            }
            task::sleep(self.config.report_interval).await;
        }
    }

    /// Enumerates roundtrips on the current table state and keeps the chains
    /// above the profit threshold, most profitable first. Equally profitable
    /// chains spanning fewer venues rank higher.
    pub async fn detect(&self) -> Vec<ArbitrageCandidate> {
        let chains = self
            .rate_table
            .best_roundtrips(
                &self.config.start_currency,
                self.config.start_amount,
                None,
                None,
                self.config.max_steps,
            )
            .await;

        let mut candidates: Vec<_> = chains
            .into_iter()
            .map(|trades| {
                let profit = Trade::profitability(&trades);
                ArbitrageCandidate { trades, profit }
            })
            .filter(|candidate| candidate.profit >= self.config.arbitrage_threshold)
            .collect();
        candidates.sort_by(|a, b| {
            b.profit
                .partial_cmp(&a.profit)
                .expect("profit cannot be NaN")
                .then_with(|| {
                    Trade::num_exchanges(&a.trades).cmp(&Trade::num_exchanges(&b.trades))
                })
        });
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::{
        ExchangeError, ExchangeFeatures, L2OrderBook, MockExchangeClient,
    };
    use crate::models::Symbol;
    use crate::synonyms::SynonymMap;
    use crate::util::FutureWaitExt as _;
    use assert_approx_eq::assert_approx_eq;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn symmetric(price: f64, volume: f64) -> L2OrderBook {
        L2OrderBook {
            bids: vec![(price, volume)],
            asks: vec![(price, volume)],
        }
    }

    fn book_client(name: &str, books: Vec<(&str, L2OrderBook)>) -> Arc<dyn ExchangeClient> {
        let mut client = MockExchangeClient::new();
        client.expect_name().return_const(name.to_owned());
        client
            .expect_features()
            .return_const(ExchangeFeatures::default());
        client.expect_load_markets().returning(|| Ok(()));

        let symbols: Vec<Symbol> = books
            .iter()
            .map(|(symbol, _)| symbol.parse().unwrap())
            .collect();
        client.expect_symbols().return_const(symbols);

        let by_symbol: HashMap<Symbol, L2OrderBook> = books
            .into_iter()
            .map(|(symbol, book)| (symbol.parse().unwrap(), book))
            .collect();
        client.expect_fetch_l2_order_book().returning(move |symbol| {
            by_symbol
                .get(symbol)
                .cloned()
                .ok_or_else(|| ExchangeError::Exchange(format!("no book for {}", symbol)))
        });
        Arc::new(client)
    }

    /// The venue from the three-stage scenario: a 50% roundtrip through
    /// USD → BTC → ETH → USD.
    fn three_stage_client(name: &str) -> Arc<dyn ExchangeClient> {
        book_client(
            name,
            vec![
                ("BTC/USD", symmetric(10_000.0, 20_000.0)),
                ("ETH/BTC", symmetric(0.05, 1_000.0)),
                ("ETH/USD", symmetric(750.0, 40.0)),
            ],
        )
    }

    fn config(threshold: f64) -> DriverConfig {
        DriverConfig {
            arbitrage_threshold: threshold,
            ..DriverConfig::default()
        }
    }

    fn driver_with(clients: Vec<Arc<dyn ExchangeClient>>, config: DriverConfig) -> Driver {
        Driver::new(
            Arc::new(RateTable::new(SynonymMap::standard())),
            clients,
            Arc::new(MockCandidateReporting::new()),
            config,
        )
    }

    #[test]
    fn finds_three_stage_arb() {
        let driver = driver_with(vec![three_stage_client("Mock Exchange")], config(0.05));
        let candidates = driver.run_once().wait();

        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert_approx_eq!(candidate.profit, 0.5);
        assert_eq!(candidate.trades[0].exchange, "Mock Exchange");

        let froms: Vec<_> = candidate.trades.iter().map(|t| t.from_cur.as_str()).collect();
        let nexts: Vec<_> = candidate.trades.iter().map(|t| t.next_cur.as_str()).collect();
        assert_eq!(froms, ["USD", "BTC", "ETH"]);
        assert_eq!(nexts, ["BTC", "ETH", "USD"]);
    }

    #[test]
    fn threshold_filters_out_weak_chains() {
        let driver = driver_with(vec![three_stage_client("mock")], config(0.6));
        assert!(driver.run_once().wait().is_empty());
    }

    #[test]
    fn equal_profits_rank_fewer_venues_first() {
        // Two identical venues: the 50% roundtrip exists within each venue
        // and in every cross-venue combination, all with the same profit.
        let driver = driver_with(
            vec![three_stage_client("a"), three_stage_client("b")],
            config(0.05),
        );
        let candidates = driver.run_once().wait();
        assert!(candidates.len() > 1);

        for pair in candidates.windows(2) {
            let by_profit = pair[1].profit.partial_cmp(&pair[0].profit).unwrap();
            assert!(by_profit != std::cmp::Ordering::Greater);
            if (pair[0].profit - pair[1].profit).abs() < 1e-12 {
                assert!(
                    Trade::num_exchanges(&pair[0].trades)
                        <= Trade::num_exchanges(&pair[1].trades)
                );
            }
        }
        assert_eq!(Trade::num_exchanges(&candidates[0].trades), 1);
    }

    #[test]
    fn run_once_skips_venues_that_fail_to_refresh() {
        let mut broken = MockExchangeClient::new();
        broken.expect_name().return_const("broken".to_owned());
        broken
            .expect_load_markets()
            .returning(|| Err(ExchangeError::Exchange("down for maintenance".into())));
        let broken: Arc<dyn ExchangeClient> = Arc::new(broken);

        let driver = driver_with(vec![broken, three_stage_client("mock")], config(0.05));
        let candidates = driver.run_once().wait();
        assert_eq!(candidates.len(), 1);
        assert_approx_eq!(candidates[0].profit, 0.5);
    }

    #[test]
    fn candidates_render_as_chain_and_percentage() {
        let candidate = ArbitrageCandidate {
            trades: vec![Trade::new(
                "mock",
                Currency::new("USD"),
                Currency::new("BTC"),
                1.0,
                10_000.0,
                0.0001,
            )],
            profit: 0.5,
        };
        let rendered = candidate.to_string();
        assert!(rendered.starts_with("[{exchange: mock"));
        assert!(rendered.ends_with(" for 50% profit"));
    }

    #[test]
    fn forever_mode_publishes_candidates() {
        let reported = Arc::new(AtomicUsize::new(0));
        let mut reporter = MockCandidateReporting::new();
        reporter
            .expect_report()
            .withf(|candidate| (candidate.profit - 0.5).abs() < 1e-9)
            .returning({
                let reported = reported.clone();
                move |_| {
                    reported.fetch_add(1, Ordering::SeqCst);
                }
            });

        let driver = Arc::new(Driver::new(
            Arc::new(RateTable::new(SynonymMap::standard())),
            vec![three_stage_client("mock")],
            Arc::new(reporter),
            DriverConfig {
                arbitrage_threshold: 0.05,
                refresh_interval: Duration::from_millis(1),
                report_interval: Duration::from_millis(1),
                ..DriverConfig::default()
            },
        ));

        let _runner = task::spawn({
            let driver = driver.clone();
            async move { driver.run_forever().await }
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while reported.load(Ordering::SeqCst) == 0 {
            assert!(Instant::now() <= deadline, "no candidate was published");
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
