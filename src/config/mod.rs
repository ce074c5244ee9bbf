//! Configuration management for perpbot
//!
//! Built-in defaults, then optional `config/default` and `config/local` files,
//! then `PERPBOT__SECTION__KEY` environment variables. `.env` is loaded first.

use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::{hyperliquid::HYPERLIQUID_API_BASE, timeframe_duration};
use crate::error::StartupError;
use crate::risk::{RiskParameters, SizingMode};
use crate::strategy::DEFAULT_THRESHOLD;

/// Fewest candles a tick may request
pub const MIN_CANDLE_LIMIT: usize = 25;

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub market: MarketConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub engine: EngineConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Perpetual coin, e.g. BTC
    pub symbol: String,
    /// Candle interval (1m, 15m, 1h, ...)
    pub timeframe: String,
    /// Candles requested per tick
    pub candle_limit: usize,
    pub api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Minimum classifier probability to open a trade
    pub threshold: f64,
    pub model_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    pub initial_balance: f64,
    pub risk_per_trade_percent: f64,
    pub reward_risk_ratio: f64,
    pub fee_percent: f64,
    pub max_open_trades: usize,
    pub sizing_mode: SizingMode,
    pub stop_loss_percent: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub poll_interval_secs: u64,
    /// Pause after a failed tick
    pub error_backoff_secs: u64,
    pub report_period_hours: u64,
    /// Deadline for every external call
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl RiskConfig {
    pub fn parameters(&self) -> RiskParameters {
        RiskParameters {
            risk_per_trade_percent: self.risk_per_trade_percent,
            reward_risk_ratio: self.reward_risk_ratio,
            fee_percent: self.fee_percent,
            max_open_trades: self.max_open_trades,
            sizing_mode: self.sizing_mode,
            stop_loss_percent: self.stop_loss_percent,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn report_period(&self) -> Duration {
        Duration::from_secs(self.report_period_hours * 3600)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl NotifyConfig {
    /// Token and chat id, when both are set and non-empty
    pub fn telegram(&self) -> Option<(&str, &str)> {
        match (self.telegram_token.as_deref(), self.telegram_chat_id.as_deref()) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Some((token, chat))
            }
            _ => None,
        }
    }
}

impl BotConfig {
    /// Builder pre-populated with every default
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, StartupError> {
        let builder = Config::builder()
            // Market defaults
            .set_default("market.symbol", "BTC")?
            .set_default("market.timeframe", "15m")?
            .set_default("market.candle_limit", MIN_CANDLE_LIMIT as i64)?
            .set_default("market.api_url", HYPERLIQUID_API_BASE)?
            // Strategy defaults
            .set_default("strategy.threshold", DEFAULT_THRESHOLD)?
            .set_default("strategy.model_path", "master_model.json")?
            // Risk defaults
            .set_default("risk.initial_balance", 100.0)?
            .set_default("risk.risk_per_trade_percent", 0.02)?
            .set_default("risk.reward_risk_ratio", 3.0)?
            .set_default("risk.fee_percent", 0.0005)?
            .set_default("risk.max_open_trades", 2)?
            .set_default("risk.sizing_mode", "full_balance")?
            // Engine defaults
            .set_default("engine.poll_interval_secs", 60)?
            .set_default("engine.error_backoff_secs", 60)?
            .set_default("engine.report_period_hours", 12)?
            .set_default("engine.call_timeout_secs", 30)?;
        Ok(builder)
    }

    /// Load configuration from files and environment, then validate it
    pub fn load() -> Result<Self, StartupError> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (PERPBOT__*)
            .add_source(Environment::with_prefix("PERPBOT").separator("__"));

        let mut config = Self::from_builder(builder)?;

        // Unprefixed Telegram variables are honoured as a fallback
        if config.notify.telegram_token.is_none() {
            config.notify.telegram_token = std::env::var("TELEGRAM_TOKEN").ok();
        }
        if config.notify.telegram_chat_id.is_none() {
            config.notify.telegram_chat_id = std::env::var("TELEGRAM_CHAT_ID").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, StartupError> {
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), StartupError> {
        let invalid = |msg: String| Err(StartupError::InvalidConfig(msg));

        if self.market.symbol.trim().is_empty() {
            return invalid("market.symbol is empty".into());
        }
        if timeframe_duration(&self.market.timeframe).is_none() {
            return invalid(format!("unknown timeframe '{}'", self.market.timeframe));
        }
        if self.market.candle_limit < MIN_CANDLE_LIMIT {
            return invalid(format!(
                "market.candle_limit must be at least {}, got {}",
                MIN_CANDLE_LIMIT, self.market.candle_limit
            ));
        }
        if !(0.0..=1.0).contains(&self.strategy.threshold) {
            return invalid(format!(
                "strategy.threshold must be within [0, 1], got {}",
                self.strategy.threshold
            ));
        }

        let risk = &self.risk;
        let positive = [
            ("risk.initial_balance", risk.initial_balance),
            ("risk.risk_per_trade_percent", risk.risk_per_trade_percent),
            ("risk.reward_risk_ratio", risk.reward_risk_ratio),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return invalid(format!("{} must be positive, got {}", name, value));
            }
        }
        if !risk.fee_percent.is_finite() || risk.fee_percent < 0.0 {
            return invalid(format!("risk.fee_percent must be >= 0, got {}", risk.fee_percent));
        }
        if let Some(stop) = risk.stop_loss_percent {
            if !stop.is_finite() || stop <= 0.0 || stop >= 1.0 {
                return invalid(format!("risk.stop_loss_percent must be in (0, 1), got {}", stop));
            }
        }
        if risk.risk_per_trade_percent >= 1.0 && risk.stop_loss_percent.is_none() {
            return invalid("risk.risk_per_trade_percent must be below 1 when it sets the stop".into());
        }
        // A short's take-profit sits at entry * (1 - stop * rr)
        let target_reach = risk.parameters().stop_distance() * risk.reward_risk_ratio;
        if target_reach >= 1.0 {
            return invalid(format!(
                "stop distance x risk.reward_risk_ratio must be below 1, got {}",
                target_reach
            ));
        }
        if risk.max_open_trades == 0 {
            return invalid("risk.max_open_trades must be at least 1".into());
        }

        if self.engine.poll_interval_secs == 0 || self.engine.call_timeout_secs == 0 {
            return invalid("engine intervals must be non-zero".into());
        }

        Ok(())
    }

    /// Summary of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "symbol={} timeframe={} candles={} threshold={:.2} balance={:.2} risk={:.2}% rr={:.1} sizing={:?} max_open={} poll={}s telegram={}",
            self.market.symbol,
            self.market.timeframe,
            self.market.candle_limit,
            self.strategy.threshold,
            self.risk.initial_balance,
            self.risk.risk_per_trade_percent * 100.0,
            self.risk.reward_risk_ratio,
            self.risk.sizing_mode,
            self.risk.max_open_trades,
            self.engine.poll_interval_secs,
            self.notify.telegram().is_some()
        )
    }
}

impl std::fmt::Display for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
