/// A single level of resting liquidity: a price and the volume available at
/// that price, both strictly positive. The volume is denominated in the
/// book's input currency and may be `+∞` for synthesized ticker books.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrderBookEntry {
    pub price: f64,
    pub volume: f64,
}

/// The outcome of walking a book for a requested input volume.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fill {
    /// Volume-weighted average price over the touched entries.
    pub avg_price: f64,
    /// The price of the last entry touched, i.e. the worst price paid.
    pub limit_price: f64,
    /// The amount of output currency received for the input volume.
    pub output_amount: f64,
}

/// An ordered sequence of order-book entries representing the available
/// liquidity in one direction on one venue for one ordered currency pair.
/// Entries are expected in fill order: best price first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Book {
    entries: Vec<OrderBookEntry>,
}

impl Book {
    /// Creates a book from raw entries, dropping levels with non-positive
    /// price or zero volume.
    ///
    /// # Panics
    ///
    /// Panics on entries with negative volume, which cannot come out of a
    /// well-formed order book in either direction.
    pub fn new(entries: Vec<OrderBookEntry>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|entry| {
                assert!(
                    entry.volume >= 0.0,
                    "negative volume in order book entry: {:?}",
                    entry,
                );
                entry.price > 0.0 && entry.volume > 0.0
            })
            .collect();
        Book { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The top of the book: the best available price level.
    pub fn best(&self) -> Option<&OrderBookEntry> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[OrderBookEntry] {
        &self.entries
    }

    /// Walks the book to fill an order of the requested input volume.
    ///
    /// Returns the average price paid, the worst price touched and the
    /// resulting output amount, or `None` if the book does not hold enough
    /// liquidity to fill the full volume.
    pub fn fill(&self, volume: f64) -> Option<Fill> {
        if volume <= 0.0 {
            return None;
        }

        let mut total_price = 0.0;
        let mut remaining_volume = volume;
        for entry in &self.entries {
            let take = remaining_volume.min(entry.volume);
            remaining_volume -= take;
            total_price += take * entry.price;
            if remaining_volume <= 0.0 {
                let avg_price = total_price / volume;
                return Some(Fill {
                    avg_price,
                    limit_price: entry.price,
                    output_amount: volume * avg_price,
                });
            }
        }
        None
    }
}
