//! Module defining the capability the detector core expects from a market
//! data client, together with the error classification shared by every
//! implementation.

pub mod kraken;

use crate::models::Symbol;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by exchange clients, classified by how the caller should
/// react to them.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// A transient network timeout. Safe to retry.
    #[error("exchange request timed out")]
    Timeout,

    /// An error reported by the exchange or the transport, e.g. a rejected
    /// request or an unparsable response. The current refresh should be
    /// skipped; the next one may well succeed.
    #[error("exchange error: {0}")]
    Exchange(String),

    /// Anything else. Propagated to the caller.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ExchangeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExchangeError::Timeout)
    }
}

/// The optional capabilities a client advertises. These drive the rate
/// table's choice of ingestion mode.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExchangeFeatures {
    /// The client can fetch a snapshot of all tickers in one request.
    pub fetch_tickers: bool,
    /// The client can fetch order books in bulk.
    pub fetch_order_books: bool,
}

/// A level-2 order book for one symbol: `(price, volume)` levels with bids
/// descending and asks ascending, volumes denominated in the base currency.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct L2OrderBook {
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

/// A best bid/ask snapshot for one symbol. Either side may be missing when
/// the venue has no resting orders on it; such tickers are dropped during
/// ingestion. `quote_volume` is the traded volume in quote currency units,
/// when the venue reports one.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Ticker {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub quote_volume: Option<f64>,
}

/// A trait representing the market data capability of one trading venue.
///
/// This is the seam at which concrete exchange integrations plug into the
/// detector; the core only ever polls through this interface.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ExchangeClient: Send + Sync {
    /// The venue name used as the key into the rate table.
    fn name(&self) -> &str;

    /// The capabilities this client advertises.
    fn features(&self) -> ExchangeFeatures;

    /// The symbols tradable on this venue. Only meaningful once
    /// `load_markets` has succeeded.
    fn symbols(&self) -> Vec<Symbol>;

    /// Loads the venue's market definitions. Idempotent.
    async fn load_markets(&self) -> Result<(), ExchangeError>;

    /// Fetches the level-2 order book for one symbol.
    async fn fetch_l2_order_book(&self, symbol: &Symbol) -> Result<L2OrderBook, ExchangeError>;

    /// Fetches a snapshot of best bid/ask tickers for all symbols at once.
    async fn fetch_tickers(&self) -> Result<HashMap<Symbol, Ticker>, ExchangeError>;
}
