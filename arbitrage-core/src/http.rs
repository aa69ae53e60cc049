//! Module contains the implementation for a shared HTTP client for the
//! bundled exchange integrations.

pub use crate::metrics::HttpLabel;
use crate::exchanges::ExchangeError;
use crate::metrics::HttpMetrics;
use anyhow::{Context, Result};
use isahc::http::{Error as HttpError, Uri};
use isahc::prelude::Configurable;
use isahc::{HttpClientBuilder, ResponseExt};
use serde::de::DeserializeOwned;
use std::convert::TryFrom;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A factory type for creating HTTP clients.
#[derive(Debug)]
pub struct HttpFactory {
    default_timeout: Duration,
    metrics: Arc<HttpMetrics>,
}

impl HttpFactory {
    /// Creates a new HTTP client factory.
    pub fn new(default_timeout: Duration, metrics: HttpMetrics) -> Self {
        HttpFactory {
            default_timeout,
            metrics: Arc::new(metrics),
        }
    }

    /// Creates a new HTTP client with the default configuration.
    pub fn create(&self) -> Result<HttpClient> {
        self.with_config(|builder| builder.timeout(self.default_timeout))
    }

    /// Creates a new HTTP Client with the given configuration.
    pub fn with_config(
        &self,
        configure: impl FnOnce(HttpClientBuilder) -> HttpClientBuilder,
    ) -> Result<HttpClient> {
        let inner = configure(isahc::HttpClient::builder())
            .build()
            .context("failed to initialize HTTP client")?;
        let metrics = self.metrics.clone();

        Ok(HttpClient { inner, metrics })
    }
}

impl Default for HttpFactory {
    fn default() -> Self {
        HttpFactory::new(Duration::from_secs(10), HttpMetrics::default())
    }
}

/// An HTTP client instance with metrics.
#[derive(Debug)]
pub struct HttpClient {
    inner: isahc::HttpClient,
    metrics: Arc<HttpMetrics>,
}

impl HttpClient {
    /// Standard HTTP GET request that parses the result as JSON and
    /// classifies transport failures for the exchange layer: request
    /// timeouts map to `ExchangeError::Timeout`, everything else the venue
    /// or the transport did wrong maps to `ExchangeError::Exchange`.
    pub async fn get_json_async<U, T>(&self, url: U, label: HttpLabel) -> Result<T, ExchangeError>
    where
        Uri: TryFrom<U>,
        <Uri as TryFrom<U>>::Error: Into<HttpError>,
        T: DeserializeOwned,
    {
        let start = Instant::now();

        let mut response = self.inner.get_async(url).await.map_err(classify)?;
        let content = response
            .text()
            .map_err(|err| ExchangeError::Exchange(format!("failed to read response: {}", err)))?;

        if !response.status().is_success() {
            return Err(ExchangeError::Exchange(format!(
                "HTTP error status {}: '{}'",
                response.status(),
                content.trim(),
            )));
        }
        self.metrics.request(label, start.elapsed(), content.len());

        serde_json::from_str(&content)
            .map_err(|err| ExchangeError::Exchange(format!("failed to parse JSON '{}': {}", content, err)))
    }
}

fn classify(err: isahc::Error) -> ExchangeError {
    match err {
        isahc::Error::Timeout => ExchangeError::Timeout,
        err => ExchangeError::Exchange(err.to_string()),
    }
}
