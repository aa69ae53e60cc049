//! Implementation of an `ExchangeClient` for the Kraken public REST API.
//!
//! Only the market data subset the detector needs is covered: the tradable
//! asset pairs, per-pair level-2 depth, and the bulk ticker snapshot.

use super::{ExchangeClient, ExchangeError, ExchangeFeatures, L2OrderBook, Ticker};
use crate::http::{HttpClient, HttpFactory, HttpLabel};
use crate::models::Symbol;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::RwLock;

/// The default base URL for Kraken's public market data endpoints.
pub const DEFAULT_BASE_URL: &str = "https://api.kraken.com/0/public";

/// How many levels per side to request for level-2 books.
const ORDER_BOOK_DEPTH: usize = 50;

/// A trait representing the Kraken API subset used by the client. This allows
/// for mocked APIs to be used for testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait KrakenApi: Send + Sync {
    /// Retrieves the list of tradable asset pairs.
    async fn asset_pairs(&self) -> Result<HashMap<String, AssetPair>, ExchangeError>;
    /// Retrieves the order book for the given asset pair identifier.
    async fn depth(
        &self,
        pair: &str,
        count: usize,
    ) -> Result<HashMap<String, DepthBook>, ExchangeError>;
    /// Retrieves ticker information for the given asset pair identifiers.
    async fn ticker<'p>(
        &self,
        pairs: &[&'p str],
    ) -> Result<HashMap<String, TickerInfo>, ExchangeError>;
}

/// An HTTP Kraken API Client.
#[derive(Debug)]
pub struct KrakenHttpApi {
    /// The base URL for the API calls.
    base_url: String,
    /// An HTTP client for all of the HTTP requests.
    client: HttpClient,
}

impl KrakenHttpApi {
    pub fn new(http_factory: &HttpFactory) -> Result<Self> {
        KrakenHttpApi::with_base_url(http_factory, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(http_factory: &HttpFactory, base_url: &str) -> Result<Self> {
        let client = http_factory
            .create()
            .context("failed to initialize HTTP client")?;
        Ok(KrakenHttpApi {
            base_url: base_url.trim_end_matches('/').into(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl KrakenApi for KrakenHttpApi {
    async fn asset_pairs(&self) -> Result<HashMap<String, AssetPair>, ExchangeError> {
        self.client
            .get_json_async::<_, KrakenResult<_>>(
                format!("{}/AssetPairs", self.base_url),
                HttpLabel::AssetPairs,
            )
            .await?
            .into_result()
    }

    async fn depth(
        &self,
        pair: &str,
        count: usize,
    ) -> Result<HashMap<String, DepthBook>, ExchangeError> {
        self.client
            .get_json_async::<_, KrakenResult<_>>(
                format!("{}/Depth?pair={}&count={}", self.base_url, pair, count),
                HttpLabel::OrderBook,
            )
            .await?
            .into_result()
    }

    async fn ticker<'p>(
        &self,
        pairs: &[&'p str],
    ) -> Result<HashMap<String, TickerInfo>, ExchangeError> {
        self.client
            .get_json_async::<_, KrakenResult<_>>(
                format!("{}/Ticker?pair={}", self.base_url, pairs.join(",")),
                HttpLabel::Ticker,
            )
            .await?
            .into_result()
    }
}

/// The result envelope that Kraken wraps all API responses in. This type is
/// only used internally.
#[derive(Clone, Debug, Deserialize)]
struct KrakenResult<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

impl<T> KrakenResult<T> {
    fn into_result(self) -> Result<T, ExchangeError> {
        if let Some(result) = self.result {
            Ok(result)
        } else if !self.error.is_empty() {
            Err(ExchangeError::Exchange(format!(
                "Kraken API errors: {:?}",
                self.error
            )))
        } else {
            Err(ExchangeError::Exchange("unknown Kraken API error".into()))
        }
    }
}

/// A tradable asset pair as returned by the `AssetPairs` endpoint, reduced to
/// the fields the detector needs.
#[derive(Clone, Debug, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct AssetPair {
    /// The websocket name in `BASE/QUOTE` notation, e.g. `XBT/USD`. Dark pool
    /// pairs do not carry one and are skipped.
    pub wsname: Option<String>,
}

impl AssetPair {
    #[cfg(test)]
    pub(crate) fn new(wsname: &str) -> AssetPair {
        AssetPair {
            wsname: Some(wsname.into()),
        }
    }
}

/// One side level of a `Depth` response: price and volume as decimal strings
/// plus the timestamp of the last update.
#[derive(Clone, Debug, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct DepthEntry(pub String, pub String, pub f64);

impl DepthEntry {
    fn level(&self) -> Option<(f64, f64)> {
        let price = self.0.parse().ok()?;
        let volume = self.1.parse().ok()?;
        Some((price, volume))
    }
}

/// An order book as returned by the `Depth` endpoint.
#[derive(Clone, Debug, Default, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct DepthBook {
    pub bids: Vec<DepthEntry>,
    pub asks: Vec<DepthEntry>,
}

/// Ticker information for one asset pair, reduced to the best ask (`a`) and
/// bid (`b`) arrays whose first element is the price as a decimal string.
#[derive(Clone, Debug, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct TickerInfo {
    a: Vec<String>,
    b: Vec<String>,
}

impl TickerInfo {
    #[cfg(test)]
    pub(crate) fn new(ask: f64, bid: f64) -> TickerInfo {
        TickerInfo {
            a: vec![ask.to_string()],
            b: vec![bid.to_string()],
        }
    }

    fn ask(&self) -> Option<f64> {
        self.a.first()?.parse().ok()
    }

    fn bid(&self) -> Option<f64> {
        self.b.first()?.parse().ok()
    }
}

/// The market definitions loaded from the venue: the tradable symbols and the
/// mapping between symbols and Kraken pair identifiers.
#[derive(Clone, Debug, Default)]
struct Markets {
    symbols: Vec<Symbol>,
    ids_by_symbol: HashMap<Symbol, String>,
    symbols_by_id: HashMap<String, Symbol>,
}

/// A market data client for the Kraken exchange, or any venue speaking the
/// same wire protocol when constructed with a custom name and base URL.
pub struct KrakenClient<Api> {
    name: String,
    /// A Kraken API implementation. This allows for mocked Kraken APIs to be
    /// used for testing.
    api: Api,
    markets: RwLock<Option<Markets>>,
}

impl KrakenClient<KrakenHttpApi> {
    /// Creates a new client instance using an HTTP API instance and the
    /// default Kraken API base URL.
    pub fn new(http_factory: &HttpFactory) -> Result<Self> {
        let api = KrakenHttpApi::new(http_factory)?;
        Ok(KrakenClient::with_api("kraken", api))
    }

    /// Creates a new client for a venue speaking the Kraken wire protocol at
    /// a custom base URL.
    pub fn with_base_url(http_factory: &HttpFactory, name: &str, base_url: &str) -> Result<Self> {
        let api = KrakenHttpApi::with_base_url(http_factory, base_url)?;
        Ok(KrakenClient::with_api(name, api))
    }
}

impl<Api> KrakenClient<Api>
where
    Api: KrakenApi,
{
    /// Create a new client instance from an API.
    pub fn with_api(name: &str, api: Api) -> Self {
        KrakenClient {
            name: name.into(),
            api,
            markets: RwLock::new(None),
        }
    }

    fn markets(&self) -> Option<Markets> {
        self.markets
            .read()
            .expect("markets lock poisoned")
            .clone()
    }

    fn pair_id(&self, symbol: &Symbol) -> Result<String, ExchangeError> {
        self.markets()
            .and_then(|markets| markets.ids_by_symbol.get(symbol).cloned())
            .ok_or_else(|| {
                ExchangeError::Exchange(format!("unknown symbol {} on {}", symbol, self.name))
            })
    }
}

#[async_trait::async_trait]
impl<Api> ExchangeClient for KrakenClient<Api>
where
    Api: KrakenApi + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn features(&self) -> ExchangeFeatures {
        ExchangeFeatures {
            fetch_tickers: true,
            fetch_order_books: false,
        }
    }

    fn symbols(&self) -> Vec<Symbol> {
        self.markets()
            .map(|markets| markets.symbols)
            .unwrap_or_default()
    }

    async fn load_markets(&self) -> Result<(), ExchangeError> {
        if self.markets().is_some() {
            return Ok(());
        }

        let pairs = self.api.asset_pairs().await?;
        let mut markets = Markets::default();
        for (id, pair) in pairs {
            // NOTE: Filter out pairs ending in ".d" as these are dark pool
            //   pairs that cannot be used for retrieving market data.
            if id.ends_with(".d") {
                continue;
            }
            let symbol: Symbol = match pair.wsname.as_deref().map(str::parse) {
                Some(Ok(symbol)) => symbol,
                _ => {
                    log::warn!("skipping Kraken pair {} without usable wsname", id);
                    continue;
                }
            };
            markets.symbols.push(symbol.clone());
            markets.ids_by_symbol.insert(symbol.clone(), id.clone());
            markets.symbols_by_id.insert(id, symbol);
        }

        *self.markets.write().expect("markets lock poisoned") = Some(markets);
        Ok(())
    }

    async fn fetch_l2_order_book(&self, symbol: &Symbol) -> Result<L2OrderBook, ExchangeError> {
        let pair = self.pair_id(symbol)?;
        let mut books = self.api.depth(&pair, ORDER_BOOK_DEPTH).await?;

        // The response is keyed by pair identifier, but some endpoints key by
        // altname instead; fall back to the sole entry in that case.
        let book = match books.remove(&pair) {
            Some(book) => book,
            None => books
                .into_iter()
                .map(|(_, book)| book)
                .next()
                .ok_or_else(|| {
                    ExchangeError::Exchange(format!("order book response missing pair {}", pair))
                })?,
        };

        Ok(L2OrderBook {
            bids: parse_levels(&self.name, symbol, &book.bids),
            asks: parse_levels(&self.name, symbol, &book.asks),
        })
    }

    async fn fetch_tickers(&self) -> Result<HashMap<Symbol, Ticker>, ExchangeError> {
        let markets = self.markets().ok_or_else(|| {
            ExchangeError::Exchange(format!("markets not loaded for {}", self.name))
        })?;

        let ids: Vec<&str> = markets.symbols_by_id.keys().map(String::as_str).collect();
        let infos = self.api.ticker(&ids).await?;

        let mut tickers = HashMap::new();
        for (id, info) in infos {
            let symbol = match markets.symbols_by_id.get(&id) {
                Some(symbol) => symbol.clone(),
                None => {
                    log::warn!("{} returned ticker for unknown pair {}", self.name, id);
                    continue;
                }
            };
            tickers.insert(
                symbol,
                Ticker {
                    bid: info.bid(),
                    ask: info.ask(),
                    // Kraken reports traded volume in base units only, so no
                    // quote volume is available for slippage modeling.
                    quote_volume: None,
                },
            );
        }
        Ok(tickers)
    }
}

fn parse_levels(venue: &str, symbol: &Symbol, entries: &[DepthEntry]) -> Vec<(f64, f64)> {
    entries
        .iter()
        .filter_map(|entry| match entry.level() {
            Some(level) => Some(level),
            None => {
                log::warn!("dropping malformed {} level on {}: {:?}", symbol, venue, entry);
                None
            }
        })
        .collect()
}
