//! Decision loop: fetch, monitor, maybe open, report, sleep.
//!
//! One tick runs to completion before the next starts. External calls are
//! awaited one at a time, each under its own timeout, so the portfolio is
//! only ever touched from this task.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{fetch_with_timeout, MarketData};
use crate::config::BotConfig;
use crate::error::TickError;
use crate::execution::{
    place_with_timeout, ExecutionVenue, OrderOutcome, OrderRequest, Portfolio, TradeMonitor,
};
use crate::features::latest_features;
use crate::models::{Bar, ClosedTrade, Trade};
use crate::notify::{messages, Notifications};
use crate::risk::size_position;
use crate::strategy::{Decision, SignalEvaluation, SignalGenerator};

/// Loop settings, fixed at startup
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub symbol: String,
    pub timeframe: String,
    pub candle_limit: usize,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub report_period: Duration,
    pub call_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            symbol: "BTC".to_string(),
            timeframe: "15m".to_string(),
            candle_limit: 25,
            poll_interval: Duration::from_secs(60),
            error_backoff: Duration::from_secs(60),
            report_period: Duration::from_secs(12 * 3600),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&BotConfig> for EngineSettings {
    fn from(config: &BotConfig) -> Self {
        Self {
            symbol: config.market.symbol.clone(),
            timeframe: config.market.timeframe.clone(),
            candle_limit: config.market.candle_limit,
            poll_interval: config.engine.poll_interval(),
            error_backoff: config.engine.error_backoff(),
            report_period: config.engine.report_period(),
            call_timeout: config.engine.call_timeout(),
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone)]
pub struct TickReport {
    pub price: f64,
    pub closed: Vec<ClosedTrade>,
    /// None when the ledger was full or the latest feature row was incomplete
    pub evaluation: Option<SignalEvaluation>,
    pub opened: Option<Trade>,
    pub report_sent: bool,
}

pub struct TradingEngine {
    market: Arc<dyn MarketData>,
    venue: Arc<dyn ExecutionVenue>,
    notifications: Notifications,
    signals: SignalGenerator,
    monitor: TradeMonitor,
    portfolio: Portfolio,
    settings: EngineSettings,
    last_report: DateTime<Utc>,
}

impl TradingEngine {
    pub fn new(
        market: Arc<dyn MarketData>,
        venue: Arc<dyn ExecutionVenue>,
        notifications: Notifications,
        signals: SignalGenerator,
        portfolio: Portfolio,
        settings: EngineSettings,
    ) -> Self {
        let monitor = TradeMonitor::new(
            venue.clone(),
            notifications.clone(),
            settings.symbol.clone(),
            settings.call_timeout,
        );
        let last_report = portfolio.start_time();

        Self {
            market,
            venue,
            notifications,
            signals,
            monitor,
            portfolio,
            settings,
            last_report,
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn into_portfolio(self) -> Portfolio {
        self.portfolio
    }

    /// Send the startup notification
    pub async fn announce(&self) {
        tracing::info!(
            "🚀 Trading {} {} via {} (data: {}, model: {}, threshold {:.2})",
            self.settings.symbol,
            self.settings.timeframe,
            self.venue.name(),
            self.market.name(),
            self.signals.classifier_name(),
            self.signals.threshold()
        );
        self.notifications
            .send(&messages::startup(&self.settings.symbol, self.venue.name()))
            .await;
    }

    pub async fn tick(&mut self) -> Result<TickReport, TickError> {
        self.tick_at(Utc::now()).await
    }

    /// Run one decision cycle as of `now`
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> Result<TickReport, TickError> {
        let bars = fetch_with_timeout(
            self.market.as_ref(),
            &self.settings.symbol,
            &self.settings.timeframe,
            self.settings.candle_limit,
            self.settings.call_timeout,
        )
        .await?;
        let price = bars
            .last()
            .map(|bar| bar.close)
            .ok_or_else(|| TickError::Internal("fetch returned no bars".into()))?;

        let closed = self.monitor.scan(&mut self.portfolio, price, now).await;

        // A failed open still lets the report go out before the error surfaces
        let opening = if self.portfolio.has_capacity() {
            self.try_open(&bars, price, now).await
        } else {
            Ok((None, None))
        };

        let report_sent = self.maybe_report(now).await;
        let (evaluation, opened) = opening?;

        let report = TickReport {
            price,
            closed,
            evaluation,
            opened,
            report_sent,
        };
        self.log_summary(&report);
        Ok(report)
    }

    /// Score the newest bar and, on a signal, place the entry before booking it
    async fn try_open(
        &mut self,
        bars: &[Bar],
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<(Option<SignalEvaluation>, Option<Trade>), TickError> {
        let Some(features) = latest_features(bars) else {
            tracing::debug!("Latest feature row incomplete, not evaluating");
            return Ok((None, None));
        };

        let evaluation = self.signals.evaluate(&features);
        let Decision::Open(side) = evaluation.decision else {
            return Ok((Some(evaluation), None));
        };

        let plan = size_position(&self.portfolio, side, price)?;
        let order = OrderRequest {
            symbol: self.settings.symbol.clone(),
            side: side.entry_order(),
            size: plan.size(),
            reduce_only: false,
        };

        let order_id =
            match place_with_timeout(self.venue.as_ref(), &order, self.settings.call_timeout).await
            {
                OrderOutcome::Filled { order_id } => order_id,
                OrderOutcome::AlreadyClosed => {
                    return Err(TickError::OpenOrder(
                        "venue reported no position on an opening order".into(),
                    ))
                }
                OrderOutcome::Rejected { reason } => return Err(TickError::OpenOrder(reason)),
            };

        let trade = plan.into_trade(order_id.clone(), now);
        if let Err(source) = self.portfolio.record_open(trade.clone()) {
            self.unwind_entry(&order, &order_id).await;
            return Err(TickError::UntrackedFill { order_id, source });
        }

        tracing::info!(
            "🔔 Opened {} {:.6} {} @ ${:.2} | SL ${:.2} | TP ${:.2}",
            trade.side(),
            trade.size(),
            self.settings.symbol,
            trade.entry_price(),
            trade.stop_loss(),
            trade.take_profit()
        );
        self.notifications
            .send(&messages::trade_opened(&trade))
            .await;

        Ok((Some(evaluation), Some(trade)))
    }

    /// Offset a filled entry the ledger refused, so the venue is not left
    /// holding a position nothing tracks
    async fn unwind_entry(&self, entry: &OrderRequest, entry_order_id: &str) {
        let offset = OrderRequest {
            symbol: entry.symbol.clone(),
            side: entry.side.opposite(),
            size: entry.size,
            reduce_only: true,
        };
        match place_with_timeout(self.venue.as_ref(), &offset, self.settings.call_timeout).await {
            OrderOutcome::Filled { order_id } => tracing::warn!(
                "Offset unrecorded entry {} with {}",
                entry_order_id,
                order_id
            ),
            OrderOutcome::AlreadyClosed => tracing::warn!(
                "Unrecorded entry {} has no position left on {}",
                entry_order_id,
                self.venue.name()
            ),
            OrderOutcome::Rejected { reason } => tracing::error!(
                "Could not offset unrecorded entry {} ({}), position left open on {}",
                entry_order_id,
                reason,
                self.venue.name()
            ),
        }
    }

    async fn maybe_report(&mut self, now: DateTime<Utc>) -> bool {
        let elapsed = (now - self.last_report).to_std().unwrap_or_default();
        if elapsed < self.settings.report_period {
            return false;
        }

        let snapshot = self.portfolio.snapshot();
        tracing::info!(
            "📊 Periodic report: balance ${:.2}, P&L ${:.2}, {} trades ({:.2}% win)",
            snapshot.balance,
            snapshot.net_pnl,
            snapshot.total_trades,
            snapshot.win_rate_pct
        );
        self.notifications
            .send(&messages::periodic_report(&snapshot, now))
            .await;
        self.last_report = now;
        true
    }

    fn log_summary(&self, report: &TickReport) {
        let (buy, sell) = report
            .evaluation
            .as_ref()
            .map(|e| (Some(e.buy_probability), e.sell_probability))
            .unwrap_or((None, None));
        let fmt = |p: Option<f64>| p.map_or_else(|| "-".to_string(), |p| format!("{:.3}", p));

        tracing::info!(
            "💹 {} @ ${:.2} | P(buy) {} P(sell) {} | balance ${:.2} | open {}/{} | W/L {}/{}",
            self.settings.symbol,
            report.price,
            fmt(buy),
            fmt(sell),
            self.portfolio.balance(),
            self.portfolio.ledger().count(),
            self.portfolio.ledger().max_open_trades(),
            self.portfolio.wins(),
            self.portfolio.losses()
        );
    }

    /// Contain a failed tick: routine failures are logged, anything else is also paged
    pub async fn handle_tick_error(&self, error: &TickError) {
        if error.is_critical() {
            tracing::error!("Tick failed: {}", error);
            self.notifications
                .send(&messages::critical_error(error))
                .await;
        } else {
            tracing::warn!("Skipping tick: {}", error);
        }
    }

    /// Tick forever, sleeping between cycles, until `shutdown` resolves.
    ///
    /// Shutdown is only observed between ticks, never in the middle of one.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let pause = match self.tick().await {
                Ok(_) => self.settings.poll_interval,
                Err(e) => {
                    self.handle_tick_error(&e).await;
                    self.settings.error_backoff
                }
            };

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, leaving trading loop");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}
