// Market data capability and exchange clients
pub mod hyperliquid;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::FetchError;
use crate::models::Bar;

pub use hyperliquid::HyperliquidClient;

/// Source of OHLCV candles, oldest first
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, FetchError>;

    fn name(&self) -> &str {
        "market_data"
    }
}

/// Length of one bar for an exchange timeframe string such as `15m` or `4h`
pub fn timeframe_duration(timeframe: &str) -> Option<chrono::Duration> {
    let unit = timeframe.chars().last()?;
    let count: i64 = timeframe[..timeframe.len() - unit.len_utf8()]
        .parse()
        .ok()
        .filter(|c| *c > 0)?;
    match unit {
        'm' => Some(chrono::Duration::minutes(count)),
        'h' => Some(chrono::Duration::hours(count)),
        'd' => Some(chrono::Duration::days(count)),
        'w' => Some(chrono::Duration::weeks(count)),
        _ => None,
    }
}

/// Bars must be strictly ordered by time and carry usable prices.
pub fn validate_bars(bars: &[Bar]) -> Result<(), FetchError> {
    for window in bars.windows(2) {
        if window[1].timestamp <= window[0].timestamp {
            return Err(FetchError::Malformed(format!(
                "candles out of order at {}",
                window[1].timestamp
            )));
        }
    }
    if let Some(bad) = bars.iter().find(|b| !b.close.is_finite() || b.close <= 0.0) {
        return Err(FetchError::Malformed(format!(
            "invalid close {} at {}",
            bad.close, bad.timestamp
        )));
    }
    Ok(())
}

/// Fetch candles with a deadline. An empty result counts as a failure.
pub async fn fetch_with_timeout(
    source: &dyn MarketData,
    symbol: &str,
    timeframe: &str,
    limit: usize,
    timeout: Duration,
) -> Result<Vec<Bar>, FetchError> {
    let bars = tokio::time::timeout(timeout, source.fetch_candles(symbol, timeframe, limit))
        .await
        .map_err(|_| FetchError::Timeout(timeout))??;

    if bars.is_empty() {
        return Err(FetchError::Empty);
    }
    validate_bars(&bars)?;
    Ok(bars)
}
