// Mockall triggers this warning for every mocked trait. This is fixed in Mockall master but not
// released.
#![cfg_attr(test, allow(clippy::unused_unit))]

#[macro_use]
pub mod macros;

pub mod driver;
pub mod exchanges;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod populator;
pub mod rate_table;
pub mod roundtrips;
pub mod synonyms;
pub mod util;
