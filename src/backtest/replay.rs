use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::api::{validate_bars, MarketData};
use crate::error::{BacktestError, FetchError};
use crate::models::Bar;

/// Market data that replays a fixed history one bar at a time
///
/// Each fetch returns the newest `limit` bars up to and including the cursor.
pub struct ReplayFeed {
    bars: Vec<Bar>,
    cursor: AtomicUsize,
}

impl ReplayFeed {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Make bar `index` the newest visible bar
    pub fn seek(&self, index: usize) {
        self.cursor.store(index, Ordering::SeqCst);
    }
}

#[async_trait]
impl MarketData for ReplayFeed {
    async fn fetch_candles(
        &self,
        _symbol: &str,
        _timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, FetchError> {
        let cursor = self.cursor.load(Ordering::SeqCst);
        if cursor >= self.bars.len() {
            return Err(FetchError::Empty);
        }
        let start = (cursor + 1).saturating_sub(limit);
        Ok(self.bars[start..=cursor].to_vec())
    }

    fn name(&self) -> &str {
        "replay"
    }
}

#[derive(Debug, Deserialize)]
struct BarRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// RFC 3339, a naive `YYYY-MM-DD HH:MM:SS` read as UTC (pandas `to_csv`),
/// or a unix timestamp in seconds or milliseconds
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(epoch) = raw.parse::<i64>() {
        return if epoch.abs() >= 100_000_000_000 {
            DateTime::from_timestamp_millis(epoch)
        } else {
            DateTime::from_timestamp(epoch, 0)
        };
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Read `timestamp,open,high,low,close,volume` rows from any reader
pub fn read_bars<R: std::io::Read>(reader: R) -> Result<Vec<Bar>, BacktestError> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();

    for (i, row) in csv.deserialize::<BarRow>().enumerate() {
        let row = row?;
        // Header is line 1
        let line = i + 2;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| BacktestError::InvalidBar {
            line,
            reason: format!("unrecognised timestamp '{}'", row.timestamp),
        })?;

        bars.push(Bar {
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    validate_bars(&bars)?;
    Ok(bars)
}

pub fn load_bars_csv(path: impl AsRef<Path>) -> Result<Vec<Bar>, BacktestError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    let bars = read_bars(file)?;
    tracing::info!("Loaded {} bars from {}", bars.len(), path.display());
    Ok(bars)
}
