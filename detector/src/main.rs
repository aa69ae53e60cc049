use anyhow::{anyhow, ensure, Context, Error, Result};
use arbitrage_core::driver::{ArbitrageCandidate, CandidateReporting, Driver, DriverConfig};
use arbitrage_core::exchanges::kraken::KrakenClient;
use arbitrage_core::exchanges::ExchangeClient;
use arbitrage_core::http::HttpFactory;
use arbitrage_core::logging;
use arbitrage_core::metrics::HttpMetrics;
use arbitrage_core::models::Currency;
use arbitrage_core::rate_table::RateTable;
use arbitrage_core::synonyms::SynonymMap;
use arbitrage_core::util::FutureWaitExt as _;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;
use url::Url;

#[derive(Debug, StructOpt)]
#[structopt(name = "arbitrage detector", rename_all = "kebab")]
struct Options {
    /// The log filter to use.
    ///
    /// This follows the `slog-envlogger` syntax (e.g.
    /// 'info,detector=debug').
    #[structopt(
        long,
        env = "LOG_FILTER",
        default_value = "warn,detector=info,arbitrage_core=info"
    )]
    log_filter: String,

    /// The venues to poll. Each entry is either a known client name
    /// (currently `kraken`) or `<name>=<base-url>` for any venue speaking
    /// the Kraken wire protocol.
    #[structopt(
        long,
        env = "EXCHANGES",
        default_value = "kraken",
        use_delimiter = true
    )]
    exchanges: Vec<ExchangeSpec>,

    /// The currency roundtrips start and end in.
    #[structopt(long, env = "START_CURRENCY", default_value = "USD")]
    start_currency: Currency,

    /// The amount of the start currency to trade along each chain.
    #[structopt(long, env = "START_AMOUNT", default_value = "10000")]
    start_amount: f64,

    /// The minimum compounded profit, as a fraction, for a chain to be
    /// reported.
    #[structopt(long, env = "ARBITRAGE_THRESHOLD", default_value = "0.02")]
    arbitrage_threshold: f64,

    /// The maximum number of conversion steps per chain.
    #[structopt(long, env = "MAX_STEPS", default_value = "3")]
    max_steps: usize,

    /// Currencies to exclude from ingestion entirely.
    #[structopt(long, env = "BLACKLIST", use_delimiter = true)]
    blacklist: Vec<Currency>,

    /// JSON object declaring currency synonyms, e.g. '{"USDT": "USD"}' to
    /// treat Tether as dollars.
    #[structopt(
        long,
        env = "SYNONYMS",
        default_value = r#"{"XBT": "BTC", "BCC": "BCH"}"#
    )]
    synonyms: SynonymMap,

    /// The timeout in seconds of exchange HTTP calls.
    #[structopt(
        long,
        env = "HTTP_TIMEOUT",
        default_value = "10",
        parse(try_from_str = duration_secs),
    )]
    http_timeout: Duration,

    /// Time interval in seconds in which each venue is refreshed.
    #[structopt(
        long,
        env = "REFRESH_INTERVAL",
        default_value = "5",
        parse(try_from_str = duration_secs),
    )]
    refresh_interval: Duration,

    /// Time interval in seconds in which detected candidates are published.
    #[structopt(
        long,
        env = "REPORT_INTERVAL",
        default_value = "1",
        parse(try_from_str = duration_secs),
    )]
    report_interval: Duration,

    /// Refresh every venue once, print the detected candidates and exit
    /// instead of polling forever.
    #[structopt(long)]
    once: bool,
}

fn duration_secs(secs: &str) -> Result<Duration, ParseIntError> {
    Ok(Duration::from_secs(secs.parse()?))
}

/// A venue given on the command line: a known client name, optionally with a
/// custom API base URL.
#[derive(Debug)]
struct ExchangeSpec {
    name: String,
    base_url: Option<Url>,
}

impl FromStr for ExchangeSpec {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let mut parts = value.splitn(2, '=');
        let name = parts.next().unwrap_or_default().trim().to_lowercase();
        ensure!(!name.is_empty(), "empty exchange name in '{}'", value);
        let base_url = parts
            .next()
            .map(Url::parse)
            .transpose()
            .with_context(|| format!("malformed base URL in exchange spec '{}'", value))?;
        Ok(ExchangeSpec { name, base_url })
    }
}

fn create_client(
    http_factory: &HttpFactory,
    spec: &ExchangeSpec,
) -> Result<Arc<dyn ExchangeClient>> {
    match &spec.base_url {
        Some(url) => Ok(Arc::new(KrakenClient::with_base_url(
            http_factory,
            &spec.name,
            url.as_str(),
        )?)),
        None if spec.name == "kraken" => Ok(Arc::new(KrakenClient::new(http_factory)?)),
        None => Err(anyhow!(
            "unknown exchange '{}'; pass <name>=<base-url> for venues speaking \
             the Kraken wire protocol",
            spec.name,
        )),
    }
}

/// Publishes candidates as lines on standard output.
struct StdoutReporter;

impl CandidateReporting for StdoutReporter {
    fn report(&self, candidate: &ArbitrageCandidate) {
        println!("{}", candidate);
    }
}

fn main() {
    let options = Options::from_args();
    let (_, _guard) = logging::init(&options.log_filter);
    log::info!(
        "starting arbitrage detector with runtime options: {:#?}",
        options
    );

    let http_factory = HttpFactory::new(options.http_timeout, HttpMetrics::default());
    let clients = options
        .exchanges
        .iter()
        .map(|spec| create_client(&http_factory, spec))
        .collect::<Result<Vec<_>>>()
        .expect("failed to initialize exchange clients");

    let rate_table = Arc::new(RateTable::new(options.synonyms.clone()));
    let config = DriverConfig {
        start_currency: options.start_currency.clone(),
        start_amount: options.start_amount,
        arbitrage_threshold: options.arbitrage_threshold,
        max_steps: options.max_steps,
        blacklist: options.blacklist.iter().cloned().collect(),
        refresh_interval: options.refresh_interval,
        report_interval: options.report_interval,
        ..DriverConfig::default()
    };
    let driver = Driver::new(rate_table, clients, Arc::new(StdoutReporter), config);

    if options.once {
        for candidate in driver.run_once().wait() {
            println!("{}", candidate);
        }
    } else {
        driver.run_forever().wait();
    }
}
