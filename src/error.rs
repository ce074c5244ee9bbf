//! Error taxonomy for the trading engine.
//!
//! Every per-tick failure is contained at the tick boundary; only
//! [`StartupError`] is allowed to stop the process.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Market data could not be fetched. The tick is skipped.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("market data API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("malformed candle data: {0}")]
    Malformed(String),

    #[error("no candles returned")]
    Empty,

    #[error("candle fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// A position could not be constructed or recorded.
#[derive(Debug, Error, PartialEq)]
pub enum TradeError {
    #[error("invalid entry price {0}")]
    InvalidEntry(f64),

    #[error("invalid position size {0}")]
    InvalidSize(f64),

    #[error("{side} levels out of order: stop {stop_loss}, entry {entry}, target {take_profit}")]
    InvalidLevels {
        side: crate::models::Side,
        entry: f64,
        stop_loss: f64,
        take_profit: f64,
    },

    #[error("ledger at capacity ({max} open trades)")]
    AtCapacity { max: usize },

    #[error("venue order id {0} already recorded")]
    DuplicateOrderId(String),
}

/// Fatal errors raised before the trading loop is entered.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot read model artifact {path}: {source}")]
    ModelRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model artifact is not valid JSON: {0}")]
    ModelFormat(#[from] serde_json::Error),

    #[error("incompatible model artifact: {0}")]
    IncompatibleModel(String),
}

/// Failure of a single decision cycle.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("opening order failed: {0}")]
    OpenOrder(String),

    #[error("trade rejected: {0}")]
    Trade(#[from] TradeError),

    #[error("entry order {order_id} filled but could not be recorded: {source}")]
    UntrackedFill { order_id: String, source: TradeError },

    #[error("{0}")]
    Internal(String),
}

impl TickError {
    /// Fetch and opening-order failures are routine; everything else is worth
    /// paging an operator.
    pub fn is_critical(&self) -> bool {
        !matches!(self, TickError::Fetch(_) | TickError::OpenOrder(_))
    }
}

/// Historical replay could not be set up.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("not enough bars for backtest: need {need}, got {got}")]
    NotEnoughBars { need: usize, got: usize },

    #[error("cannot read bar file: {0}")]
    Csv(#[from] csv::Error),

    #[error("bad bar at line {line}: {reason}")]
    InvalidBar { line: usize, reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
