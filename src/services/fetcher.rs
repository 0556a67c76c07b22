//! Signal Fetcher
//!
//! Wraps the market data provider with a per-request timeout, bounded
//! retries and client-side rate-limit spacing, and turns the raw readings
//! into one `MarketObservation` per fetch.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::adapters::{HeadlineSource, MarketDataSource};
use crate::clock::Clock;
use crate::domain::{Headline, MarketObservation, MarketSnapshot};
use crate::error::FetchError;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Result of a fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fresh(MarketObservation),
    /// Too soon after the previous fetch; the previous snapshot stands
    Throttled { next_allowed_at: DateTime<Utc> },
}

pub struct SignalFetcher {
    market: Arc<dyn MarketDataSource>,
    headlines: Option<Arc<dyn HeadlineSource>>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    request_timeout: Duration,
    min_spacing: Duration,
    last_fetch_at: Option<DateTime<Utc>>,
}

impl SignalFetcher {
    pub fn new(
        market: Arc<dyn MarketDataSource>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        request_timeout: Duration,
        min_spacing: Duration,
    ) -> Self {
        Self {
            market,
            headlines: None,
            clock,
            retry,
            request_timeout,
            min_spacing,
            last_fetch_at: None,
        }
    }

    /// Also pull headlines for the text rules
    pub fn with_headlines(mut self, source: Arc<dyn HeadlineSource>) -> Self {
        self.headlines = Some(source);
        self
    }

    /// Carry the last successful fetch time across a restart
    pub fn resume_from(&mut self, last_fetch_at: Option<DateTime<Utc>>) {
        self.last_fetch_at = last_fetch_at;
    }

    /// Earliest time the next fetch may hit the provider
    pub fn next_allowed_at(&self) -> Option<DateTime<Utc>> {
        let spacing = chrono::Duration::from_std(self.min_spacing).ok()?;
        self.last_fetch_at.map(|last| last + spacing)
    }

    pub async fn fetch(&mut self) -> Result<FetchOutcome, FetchError> {
        let now = self.clock.now();

        if let Some(next_allowed_at) = self.next_allowed_at() {
            if now < next_allowed_at {
                info!(
                    "Using cached data. Next poll in {}s",
                    (next_allowed_at - now).num_seconds()
                );
                return Ok(FetchOutcome::Throttled { next_allowed_at });
            }
        }

        info!("Polling market data for fresh readings...");

        let yield_10y = self
            .with_retry("fetch_yield_10y", || self.market.fetch_yield_10y())
            .await?;
        let usd_jpy = self
            .with_retry("fetch_usd_jpy", || self.market.fetch_usd_jpy())
            .await?;
        let headlines = self.fetch_headlines().await?;

        let snapshot = MarketSnapshot::new(now, yield_10y, usd_jpy);
        if !is_plausible(&snapshot) {
            return Err(FetchError::MalformedResponse(format!(
                "implausible readings: {}",
                snapshot.summary()
            )));
        }
        info!(
            "Fetched US10Y: {}% USD/JPY: {} ({} headlines)",
            snapshot.yield_10y,
            snapshot.usd_jpy,
            headlines.len()
        );

        self.last_fetch_at = Some(now);
        Ok(FetchOutcome::Fresh(MarketObservation {
            snapshot,
            headlines,
        }))
    }

    /// Headline failures degrade to "no headlines" unless they are fatal
    async fn fetch_headlines(&self) -> Result<Vec<Headline>, FetchError> {
        let Some(source) = self.headlines.as_ref() else {
            return Ok(Vec::new());
        };

        match self
            .with_retry("fetch_headlines", || source.fetch_headlines())
            .await
        {
            Ok(headlines) => Ok(headlines),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Headline fetch failed, continuing without text signals: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let timeout = self.request_timeout;
        retry_with_backoff(
            &self.retry,
            self.clock.as_ref(),
            operation,
            FetchError::is_transient,
            || {
                let fut = call();
                async move {
                    match tokio::time::timeout(timeout, fut).await {
                        Ok(result) => result,
                        Err(_) => {
                            debug!("{} timed out after {:?}", operation, timeout);
                            Err(FetchError::Timeout {
                                elapsed_ms: timeout.as_millis() as u64,
                            })
                        }
                    }
                }
            },
        )
        .await
    }
}

/// Reject readings no real market would print
pub fn is_plausible(snapshot: &MarketSnapshot) -> bool {
    snapshot.yield_10y > Decimal::ZERO
        && snapshot.yield_10y < Decimal::from(30)
        && snapshot.usd_jpy > Decimal::ZERO
}
