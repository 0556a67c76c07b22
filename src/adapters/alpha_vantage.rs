//! Alpha Vantage REST client
//!
//! Provides:
//! - USD/JPY spot rate (`CURRENCY_EXCHANGE_RATE`)
//! - US 10-year treasury yield (`TREASURY_YIELD`, daily)
//! - JPY monetary-policy headlines (`NEWS_SENTIMENT`)
//!
//! Alpha Vantage reports most failures as HTTP 200 with an explanatory
//! field in the body, so every response goes through `classify_body`.

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::traits::{HeadlineSource, MarketDataSource};
use crate::config::MarketDataConfig;
use crate::domain::Headline;
use crate::error::{FetchError, GopherError, Result};

/// Alpha Vantage client
pub struct AlphaVantageClient {
    http: Client,
    base_url: String,
    api_key: Zeroizing<String>,
    timeout: Duration,
    headline_topics: String,
    headline_limit: usize,
}

impl AlphaVantageClient {
    /// Create a new client
    pub fn new(config: &MarketDataConfig, api_key: Zeroizing<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GopherError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout: config.request_timeout(),
            headline_topics: config.headline_topics.clone(),
            headline_limit: config.headline_limit,
        })
    }

    async fn query(&self, params: &[(&str, &str)]) -> std::result::Result<Value, FetchError> {
        let url = format!("{}/query", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Alpha Vantage error: {} - {}", status, truncate(&body, 200));
            return Err(classify_status(status, &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::MalformedResponse(format!("invalid JSON: {}", e.without_url())))?;

        classify_body(&body)?;
        Ok(body)
    }

    fn map_transport_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                elapsed_ms: self.timeout.as_millis() as u64,
            }
        } else {
            // Never echo the URL: it carries the API key
            FetchError::Transport(e.without_url().to_string())
        }
    }
}

#[async_trait]
impl MarketDataSource for AlphaVantageClient {
    async fn fetch_yield_10y(&self) -> std::result::Result<Decimal, FetchError> {
        let body = self
            .query(&[
                ("function", "TREASURY_YIELD"),
                ("interval", "daily"),
                ("maturity", "10year"),
            ])
            .await?;
        let value = parse_treasury_yield(&body)?;
        debug!("Fetched US10Y: {}%", value);
        Ok(value)
    }

    async fn fetch_usd_jpy(&self) -> std::result::Result<Decimal, FetchError> {
        let body = self
            .query(&[
                ("function", "CURRENCY_EXCHANGE_RATE"),
                ("from_currency", "USD"),
                ("to_currency", "JPY"),
            ])
            .await?;
        let value = parse_exchange_rate(&body)?;
        debug!("Fetched USD/JPY: {}", value);
        Ok(value)
    }
}

#[async_trait]
impl HeadlineSource for AlphaVantageClient {
    async fn fetch_headlines(&self) -> std::result::Result<Vec<Headline>, FetchError> {
        let limit = self.headline_limit.to_string();
        let body = self
            .query(&[
                ("function", "NEWS_SENTIMENT"),
                ("tickers", "FOREX:JPY"),
                ("topics", self.headline_topics.as_str()),
                ("sort", "LATEST"),
                ("limit", limit.as_str()),
            ])
            .await?;
        let headlines = parse_news_feed(&body, self.headline_limit)?;
        debug!("Fetched {} headlines", headlines.len());
        Ok(headlines)
    }
}

fn classify_status(status: StatusCode, body: &str) -> FetchError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FetchError::Unauthorized(format!("HTTP {}", status))
        }
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited(format!("HTTP {}", status)),
        s if s.is_server_error() => FetchError::Transport(format!("HTTP {}", status)),
        _ => FetchError::MalformedResponse(format!("HTTP {}: {}", status, truncate(body, 200))),
    }
}

/// Map Alpha Vantage's in-body error conventions onto `FetchError`
fn classify_body(body: &Value) -> std::result::Result<(), FetchError> {
    if let Some(message) = body.get("Error Message").and_then(Value::as_str) {
        let lower = message.to_lowercase();
        if lower.contains("apikey") || lower.contains("api key") {
            return Err(FetchError::Unauthorized(message.to_string()));
        }
        return Err(FetchError::MalformedResponse(message.to_string()));
    }

    for field in ["Note", "Information"] {
        if let Some(message) = body.get(field).and_then(Value::as_str) {
            let lower = message.to_lowercase();
            if lower.contains("premium") || lower.contains("invalid api") {
                return Err(FetchError::Unauthorized(message.to_string()));
            }
            return Err(FetchError::RateLimited(message.to_string()));
        }
    }

    Ok(())
}

fn parse_decimal(raw: &str, what: &str) -> std::result::Result<Decimal, FetchError> {
    Decimal::from_str(raw.trim())
        .map_err(|_| FetchError::MalformedResponse(format!("{} is not a number: {:?}", what, raw)))
}

fn parse_exchange_rate(body: &Value) -> std::result::Result<Decimal, FetchError> {
    let raw = body
        .get("Realtime Currency Exchange Rate")
        .and_then(|r| r.get("5. Exchange Rate"))
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::MalformedResponse("missing exchange rate".to_string()))?;

    let rate = parse_decimal(raw, "exchange rate")?;
    if rate <= Decimal::ZERO {
        return Err(FetchError::MalformedResponse(format!(
            "non-positive exchange rate: {}",
            rate
        )));
    }
    Ok(rate)
}

/// Newest numeric observation; the series uses "." for days without data
fn parse_treasury_yield(body: &Value) -> std::result::Result<Decimal, FetchError> {
    let series = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::MalformedResponse("missing yield series".to_string()))?;

    series
        .iter()
        .filter_map(|point| point.get("value").and_then(Value::as_str))
        .find_map(|raw| Decimal::from_str(raw.trim()).ok())
        .ok_or_else(|| FetchError::MalformedResponse("yield series has no values".to_string()))
}

fn parse_news_feed(body: &Value, limit: usize) -> std::result::Result<Vec<Headline>, FetchError> {
    let feed = body
        .get("feed")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::MalformedResponse("missing news feed".to_string()))?;

    Ok(feed
        .iter()
        .filter_map(|item| {
            let title = item.get("title").and_then(Value::as_str)?.trim();
            if title.is_empty() {
                return None;
            }
            let text = |key: &str| {
                item.get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            };
            let published_at = item
                .get("time_published")
                .and_then(Value::as_str)
                .and_then(|raw| NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S").ok())
                .map(|naive| Utc.from_utc_datetime(&naive));

            Some(Headline {
                title: title.to_string(),
                summary: text("summary"),
                source: text("source"),
                published_at,
            })
        })
        .take(limit)
        .collect())
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
