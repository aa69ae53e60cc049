//! Module implementing the live table of currency conversion rates: a
//! venue-aware directed graph whose edges carry order-book depth. Populators
//! write one venue each; readers work against point-in-time snapshots.

use crate::exchanges::{ExchangeClient, ExchangeError, L2OrderBook};
use crate::models::{Book, Currency, OrderBookEntry, Symbol, Trade};
use crate::roundtrips;
use crate::synonyms::SynonymMap;
use async_std::sync::RwLock;
use futures::future;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

/// Maximum attempts for a timed out exchange call within one refresh phase.
const MAX_ATTEMPTS: usize = 5;

/// Up to this many pairs the per-pair book fetch is cheap enough to always
/// prefer over the ticker snapshot.
const BOOK_MODE_PAIR_LIMIT: usize = 10;

/// The conversion books of one venue: `from → to → book`.
pub type Books = HashMap<Currency, HashMap<Currency, Book>>;

/// A point-in-time view of the whole table. Shallow: the per-venue books are
/// shared with the table and never mutated once installed, so a snapshot
/// stays consistent for the life of a reader.
pub type Snapshot = HashMap<String, Arc<Books>>;

/// Absolute or percentage top-of-book differences between venues, ordered
/// best-first per row and across rows.
pub type DiffMatrix = Vec<(String, Vec<(String, f64)>)>;

/// The result of comparing one currency pair across all venue pairs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PairwiseDiffs {
    pub absolute: DiffMatrix,
    pub percentage: DiffMatrix,
}

/// The live table of conversion rates across venues.
pub struct RateTable {
    synonyms: SynonymMap,
    venues: RwLock<Snapshot>,
}

impl RateTable {
    pub fn new(synonyms: SynonymMap) -> Self {
        RateTable {
            synonyms,
            venues: RwLock::new(Snapshot::new()),
        }
    }

    pub fn synonyms(&self) -> &SynonymMap {
        &self.synonyms
    }

    /// Takes a point-in-time view of the table.
    pub async fn snapshot(&self) -> Snapshot {
        self.venues.read().await.clone()
    }

    /// Refreshes one venue from its exchange client, leaving every other
    /// venue untouched. The venue's books are rebuilt from scratch and
    /// swapped in at the end, so concurrent readers either see the previous
    /// books or the new ones, never a partial rebuild.
    pub async fn populate(
        &self,
        client: &dyn ExchangeClient,
        blacklist: &HashSet<Currency>,
    ) -> Result<(), ExchangeError> {
        let venue = client.name().to_owned();

        let is_new = {
            let mut venues = self.venues.write().await;
            match venues.entry(venue.clone()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(entry) => {
                    entry.insert(Arc::new(Books::new()));
                    true
                }
            }
        };
        if is_new {
            retry_on_timeout(&venue, || client.load_markets()).await?;
        }

        let symbols: HashSet<Symbol> = client
            .symbols()
            .into_iter()
            .filter(|symbol| {
                !blacklist.contains(&symbol.base) && !blacklist.contains(&symbol.quote)
            })
            .collect();

        let features = client.features();
        let book_mode = !features.fetch_tickers
            || symbols.len() <= BOOK_MODE_PAIR_LIMIT
            || features.fetch_order_books;

        let fetched = if book_mode {
            retry_on_timeout(&venue, || fetch_book_pairs(client, &symbols)).await?
        } else {
            retry_on_timeout(&venue, || fetch_ticker_pairs(client, &symbols)).await?
        };

        let mut books = Books::new();
        for (symbol, data) in fetched {
            insert_directed_books(&mut books, symbol, data);
        }

        self.venues.write().await.insert(venue, Arc::new(books));
        Ok(())
    }

    /// Synonym-aware two-level lookup of the `from → to` book on a venue.
    /// The direct currency code is consulted first, then its synonym, on
    /// both levels independently.
    pub fn syn_get<'s>(
        &self,
        snapshot: &'s Snapshot,
        venue: &str,
        from: &Currency,
        to: &Currency,
    ) -> Option<&'s Book> {
        let books = snapshot.get(venue)?;
        let row = books
            .get(from)
            .or_else(|| self.synonyms.of(from).and_then(|synonym| books.get(synonym)))?;
        row.get(to)
            .or_else(|| self.synonyms.of(to).and_then(|synonym| row.get(synonym)))
    }

    /// For each source currency, the destination currencies reachable from it
    /// on any venue.
    pub async fn get_pairs(&self) -> HashMap<Currency, Vec<Currency>> {
        let snapshot = self.snapshot().await;
        let mut pairs: HashMap<Currency, Vec<Currency>> = HashMap::new();
        for books in snapshot.values() {
            for (from, row) in books.iter() {
                pairs
                    .entry(from.clone())
                    .or_default()
                    .extend(row.keys().cloned());
            }
        }
        pairs
    }

    /// Computes pairwise absolute and percentage top-of-book differences
    /// between venues for one currency pair. A cell represents the profit
    /// from buying on the row's venue and selling on the column's; venue
    /// pairs for which either side lacks the pair are skipped. Rows are
    /// sorted best-first internally, then against each other by their second
    /// value.
    pub async fn pairwise_diffs(
        &self,
        from: &Currency,
        to: &Currency,
        snapshot: Option<&Snapshot>,
    ) -> PairwiseDiffs {
        let owned;
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                owned = self.snapshot().await;
                &owned
            }
        };

        let mut diffs = PairwiseDiffs::default();
        for venue1 in snapshot.keys() {
            let best1 = match self.top_price(snapshot, venue1, from, to) {
                Some(price) => price,
                None => continue,
            };

            let mut absolute = Vec::new();
            let mut percentage = Vec::new();
            for venue2 in snapshot.keys() {
                let best2 = match self.top_price(snapshot, venue2, from, to) {
                    Some(price) => price,
                    None => continue,
                };
                let diff = best2 - best1;
                absolute.push((venue2.clone(), diff));
                percentage.push((venue2.clone(), diff / best1));
            }

            sort_diff_row(&mut absolute);
            sort_diff_row(&mut percentage);
            diffs.absolute.push((venue1.clone(), absolute));
            diffs.percentage.push((venue1.clone(), percentage));
        }

        sort_diff_rows(&mut diffs.absolute);
        sort_diff_rows(&mut diffs.percentage);
        diffs
    }

    /// Finds the most profitable roundtrips from one currency back to itself
    /// (or a synonym of itself) across venues, best first.
    pub async fn best_roundtrips(
        &self,
        cur: &Currency,
        amount: f64,
        venues: Option<&HashSet<String>>,
        coins: Option<&HashSet<Currency>>,
        max_steps: usize,
    ) -> Vec<Vec<Trade>> {
        let snapshot = self.snapshot().await;
        roundtrips::best_roundtrips(
            &self.synonyms,
            &snapshot,
            cur,
            amount,
            venues,
            coins,
            max_steps,
        )
    }

    fn top_price(
        &self,
        snapshot: &Snapshot,
        venue: &str,
        from: &Currency,
        to: &Currency,
    ) -> Option<f64> {
        let book = self.syn_get(snapshot, venue, from, to)?;
        Some(book.best()?.price)
    }
}

fn sort_diff_row(row: &mut Vec<(String, f64)>) {
    row.sort_by(|a, b| b.1.partial_cmp(&a.1).expect("rate diffs cannot be NaN"));
}

fn sort_diff_rows(rows: &mut DiffMatrix) {
    let second_value = |row: &Vec<(String, f64)>| {
        row.get(1).map(|&(_, value)| value).unwrap_or(f64::NEG_INFINITY)
    };
    rows.sort_by(|a, b| {
        second_value(&b.1)
            .partial_cmp(&second_value(&a.1))
            .expect("rate diffs cannot be NaN")
    });
}

/// Fans out one level-2 book request per symbol and gathers the results,
/// dropping individual failures. A refresh where every single fetch timed out
/// counts as a timeout of the whole phase so that it gets retried.
async fn fetch_book_pairs(
    client: &dyn ExchangeClient,
    symbols: &HashSet<Symbol>,
) -> Result<Vec<(Symbol, L2OrderBook)>, ExchangeError> {
    let fetches = symbols.iter().map(|symbol| async move {
        (symbol.clone(), client.fetch_l2_order_book(symbol).await)
    });
    let results = future::join_all(fetches).await;

    let mut books = Vec::with_capacity(results.len());
    let mut timeouts = 0;
    for (symbol, result) in results {
        match result {
            Ok(book) => books.push((symbol, book)),
            Err(err) => {
                if err.is_timeout() {
                    timeouts += 1;
                }
                log::warn!(
                    "failed to fetch {} order book from {}: {}",
                    symbol,
                    client.name(),
                    err,
                );
            }
        }
    }
    if !symbols.is_empty() && timeouts == symbols.len() {
        return Err(ExchangeError::Timeout);
    }
    Ok(books)
}

/// Fetches the venue's ticker snapshot and synthesizes a one-entry book per
/// side. Tickers missing either side are dropped for this refresh; missing
/// quote volume means unbounded synthetic depth.
async fn fetch_ticker_pairs(
    client: &dyn ExchangeClient,
    symbols: &HashSet<Symbol>,
) -> Result<Vec<(Symbol, L2OrderBook)>, ExchangeError> {
    let tickers = client.fetch_tickers().await?;
    Ok(tickers
        .into_iter()
        .filter(|(symbol, _)| symbols.contains(symbol))
        .filter_map(|(symbol, ticker)| {
            let (bid, ask) = match (ticker.bid, ticker.ask) {
                (Some(bid), Some(ask)) => (bid, ask),
                _ => return None,
            };
            let volume = ticker.quote_volume.unwrap_or(f64::INFINITY);
            Some((
                symbol,
                L2OrderBook {
                    bids: vec![(bid, volume)],
                    asks: vec![(ask, volume)],
                },
            ))
        })
        .collect())
}

/// Derives the two directed books of a symbol and inserts them. Selling BASE
/// for QUOTE fills against the bids as-is; buying BASE with QUOTE fills
/// against the asks with the price inverted and the volume restated in QUOTE
/// units. Either both directions are inserted or neither, and degenerate
/// symbols quoting a currency against itself are skipped.
fn insert_directed_books(books: &mut Books, symbol: Symbol, data: L2OrderBook) {
    if data.bids.is_empty() || data.asks.is_empty() {
        return;
    }
    let Symbol { base, quote } = symbol;
    if base == quote {
        return;
    }

    let sell = Book::new(
        data.bids
            .iter()
            .map(|&(price, volume)| OrderBookEntry { price, volume })
            .collect(),
    );
    let buy = Book::new(
        data.asks
            .iter()
            .filter(|&&(price, _)| price > 0.0)
            .map(|&(price, volume)| OrderBookEntry {
                price: 1.0 / price,
                volume: price * volume,
            })
            .collect(),
    );
    if sell.is_empty() || buy.is_empty() {
        return;
    }

    books
        .entry(base.clone())
        .or_default()
        .insert(quote.clone(), sell);
    books.entry(quote).or_default().insert(base, buy);
}

async fn retry_on_timeout<T, F, Fut>(venue: &str, mut call: F) -> Result<T, ExchangeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match call().await {
            Err(err) if err.is_timeout() && attempts < MAX_ATTEMPTS => {
                log::warn!(
                    "exchange call to {} timed out, retrying ({}/{})",
                    venue,
                    attempts,
                    MAX_ATTEMPTS,
                );
            }
            other => return other,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    /// Builds one venue's books from raw level-2 data, the same way
    /// ingestion derives the directed books.
    pub(crate) fn venue_books(markets: Vec<(&str, L2OrderBook)>) -> Books {
        let mut books = Books::new();
        for (symbol, data) in markets {
            insert_directed_books(&mut books, symbol.parse().unwrap(), data);
        }
        books
    }

    pub(crate) fn snapshot_from(venues: Vec<(&str, Books)>) -> Snapshot {
        venues
            .into_iter()
            .map(|(venue, books)| (venue.to_owned(), Arc::new(books)))
            .collect()
    }

    /// A market with identical bid and ask, convenient for deterministic
    /// search scenarios.
    pub(crate) fn symmetric_market(price: f64, volume: f64) -> L2OrderBook {
        L2OrderBook {
            bids: vec![(price, volume)],
            asks: vec![(price, volume)],
        }
    }
}
