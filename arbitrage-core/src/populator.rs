//! Module implementing the long-lived per-venue refresh task. Each venue gets
//! its own loop; failures are venue-local and never disturb other venues.

use crate::exchanges::{ExchangeClient, ExchangeError};
use crate::models::Currency;
use crate::rate_table::RateTable;
use async_std::task::{self, JoinHandle};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// The default pause between two refreshes of the same venue.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Spawns the refresh loop for one venue.
///
/// The task holds only a weak reference to the rate table, so it winds down
/// on its own once the table's owner goes away. The join handle can be used
/// to verify the task exits.
pub fn start(
    rate_table: &Arc<RateTable>,
    client: Arc<dyn ExchangeClient>,
    blacklist: Arc<HashSet<Currency>>,
    refresh_interval: Duration,
) -> JoinHandle<()> {
    let rate_table = Arc::downgrade(rate_table);
    task::spawn(refresh_loop(
        rate_table,
        client,
        blacklist,
        refresh_interval,
    ))
}

async fn refresh_loop(
    rate_table: Weak<RateTable>,
    client: Arc<dyn ExchangeClient>,
    blacklist: Arc<HashSet<Currency>>,
    refresh_interval: Duration,
) {
    while let Some(rate_table) = rate_table.upgrade() {
        match rate_table.populate(client.as_ref(), &blacklist).await {
            Ok(()) => log::debug!("refreshed conversion rates for {}", client.name()),
            Err(ExchangeError::Timeout) => log::warn!(
                "rate refresh for {} timed out, trying again next cycle",
                client.name(),
            ),
            Err(ExchangeError::Exchange(err)) => {
                log::error!("rate refresh for {} failed: {}", client.name(), err)
            }
            Err(ExchangeError::Unexpected(err)) => {
                log::error!("populator for {} exiting: {:?}", client.name(), err);
                return;
            }
        }
        drop(rate_table);
        task::sleep(refresh_interval).await;
    }
}
