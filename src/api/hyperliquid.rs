use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::{timeframe_duration, MarketData};
use crate::error::FetchError;
use crate::models::Bar;

pub const HYPERLIQUID_API_BASE: &str = "https://api.hyperliquid.xyz";
const RATE_LIMIT_RPM: u32 = 120; // info endpoint weight budget is 1200/min, snapshot costs ~10
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;

type InfoRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Candle as returned by `candleSnapshot`
///
/// Prices and volume arrive as decimal strings.
#[derive(Debug, Deserialize)]
struct RawCandle {
    /// Open time, ms since epoch
    t: i64,
    o: String,
    h: String,
    l: String,
    c: String,
    v: String,
}

impl RawCandle {
    fn into_bar(self) -> Result<Bar, FetchError> {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(self.t)
            .ok_or_else(|| FetchError::Malformed(format!("bad candle timestamp {}", self.t)))?;

        Ok(Bar {
            timestamp,
            open: parse_decimal("open", &self.o)?,
            high: parse_decimal("high", &self.h)?,
            low: parse_decimal("low", &self.l)?,
            close: parse_decimal("close", &self.c)?,
            volume: parse_decimal("volume", &self.v)?,
        })
    }
}

fn parse_decimal(field: &str, raw: &str) -> Result<f64, FetchError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FetchError::Malformed(format!("{} '{}' is not a number", field, raw)))
}

/// Read-only client for the Hyperliquid info API
///
/// Cloneable; clones share the rate limiter.
#[derive(Clone)]
pub struct HyperliquidClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<InfoRateLimiter>,
    initial_backoff: Duration,
}

impl HyperliquidClient {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(HYPERLIQUID_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let quota = Quota::per_minute(NonZeroU32::MIN.saturating_add(RATE_LIMIT_RPM - 1));
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the first retry delay (doubles on every attempt)
    pub fn with_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST an info request, retrying rate limits, server errors and network failures
    async fn post_info(&self, body: &serde_json::Value) -> Result<reqwest::Response, FetchError> {
        let url = format!("{}/info", self.base_url);
        let mut attempt = 1;

        loop {
            self.rate_limiter.until_ready().await;
            let backoff = self.initial_backoff * 2_u32.pow(attempt - 1);

            match self.client.post(&url).json(body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if !retryable || attempt >= MAX_RETRIES {
                        let body = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(FetchError::Api {
                            status: status.as_u16(),
                            body,
                        });
                    }

                    tracing::warn!(
                        "Hyperliquid returned {}, retrying in {:?} (attempt {}/{})",
                        status,
                        backoff,
                        attempt,
                        MAX_RETRIES
                    );
                }
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        "Network error: {}, retrying in {:?} (attempt {}/{})",
                        e,
                        backoff,
                        attempt,
                        MAX_RETRIES
                    );
                }
                Err(e) => return Err(FetchError::Http(e)),
            }

            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Candles for `coin` whose open time falls in `[start, end]`, oldest first
    pub async fn candle_snapshot(
        &self,
        coin: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, FetchError> {
        let body = json!({
            "type": "candleSnapshot",
            "req": {
                "coin": coin,
                "interval": interval,
                "startTime": start.timestamp_millis(),
                "endTime": end.timestamp_millis(),
            }
        });

        tracing::debug!("Fetching {} {} candles from {} to {}", coin, interval, start, end);

        let response = self.post_info(&body).await?;
        let raw: Vec<RawCandle> = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("candle payload: {}", e)))?;

        let mut bars = raw
            .into_iter()
            .map(RawCandle::into_bar)
            .collect::<Result<Vec<_>, _>>()?;
        bars.sort_by_key(|bar| bar.timestamp);
        bars.dedup_by_key(|bar| bar.timestamp);

        Ok(bars)
    }
}

#[async_trait]
impl MarketData for HyperliquidClient {
    /// The most recent `limit` candles, the last one possibly still forming
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, FetchError> {
        let bar_len = timeframe_duration(timeframe)
            .ok_or_else(|| FetchError::Malformed(format!("unsupported timeframe '{}'", timeframe)))?;

        let end = Utc::now();
        let start = end - bar_len * (limit as i32 + 1);
        let mut bars = self.candle_snapshot(symbol, timeframe, start, end).await?;

        if bars.is_empty() {
            return Err(FetchError::Empty);
        }
        if bars.len() > limit {
            bars.drain(..bars.len() - limit);
        }
        Ok(bars)
    }

    fn name(&self) -> &str {
        "hyperliquid"
    }
}
