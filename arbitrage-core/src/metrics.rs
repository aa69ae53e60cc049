use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, Registry};
use std::sync::Arc;
use std::time::Duration;

/// The market data endpoints the detector polls, used as the label on
/// per-request metrics.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HttpLabel {
    AssetPairs,
    OrderBook,
    Ticker,
}

impl HttpLabel {
    const ALL: &'static [HttpLabel] = &[
        HttpLabel::AssetPairs,
        HttpLabel::OrderBook,
        HttpLabel::Ticker,
    ];

    fn as_str(self) -> &'static str {
        match self {
            HttpLabel::AssetPairs => "asset_pairs",
            HttpLabel::OrderBook => "order_book",
            HttpLabel::Ticker => "ticker",
        }
    }
}

/// Latency and response size histograms for exchange HTTP requests, labeled
/// by the endpoint being polled.
#[derive(Debug)]
pub struct HttpMetrics {
    latency: HistogramVec,
    size: HistogramVec,
}

impl HttpMetrics {
    pub fn new(registry: &Arc<Registry>) -> Result<Self> {
        let latency = HistogramVec::new(
            HistogramOpts::new(
                "arbitrage_detector_http_latency",
                "Latency in seconds of exchange HTTP requests",
            ),
            &["endpoint"],
        )?;
        let size = HistogramVec::new(
            HistogramOpts::new(
                "arbitrage_detector_http_size",
                "Size in bytes of exchange HTTP response bodies",
            )
            .buckets(prometheus::exponential_buckets(100.0, 10.0, 8)?),
            &["endpoint"],
        )?;

        for label in HttpLabel::ALL {
            latency.with_label_values(&[label.as_str()]);
            size.with_label_values(&[label.as_str()]);
        }
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(size.clone()))?;

        Ok(HttpMetrics { latency, size })
    }

    /// Records one completed request against the endpoint's histograms.
    pub fn request(&self, label: HttpLabel, latency: Duration, size: usize) {
        self.latency
            .with_label_values(&[label.as_str()])
            .observe(latency.as_secs_f64());
        self.size
            .with_label_values(&[label.as_str()])
            .observe(size as _);
    }
}

impl Default for HttpMetrics {
    fn default() -> Self {
        HttpMetrics::new(&Default::default()).unwrap()
    }
}
