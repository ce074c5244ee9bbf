use std::sync::Arc;
use std::time::Duration;

use super::metrics::{BacktestMetrics, FinalState};
use super::replay::ReplayFeed;
use crate::classifier::Classifier;
use crate::config::BotConfig;
use crate::engine::{EngineSettings, TradingEngine};
use crate::error::BacktestError;
use crate::execution::{PaperVenue, Portfolio};
use crate::models::Bar;
use crate::notify::{Notifications, SilentNotifier};
use crate::risk::RiskParameters;
use crate::strategy::{SignalGenerator, DEFAULT_THRESHOLD};

/// Replays historical bars through the live engine against a paper venue
pub struct BacktestRunner {
    initial_balance: f64,
    params: RiskParameters,
    threshold: f64,
    settings: EngineSettings,
}

impl BacktestRunner {
    pub fn new(initial_balance: f64, params: RiskParameters) -> Self {
        Self {
            initial_balance,
            params,
            threshold: DEFAULT_THRESHOLD,
            settings: EngineSettings::default(),
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            initial_balance: config.risk.initial_balance,
            params: config.risk.parameters(),
            threshold: config.strategy.threshold,
            settings: EngineSettings::from(config),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Run one tick per bar once a full candle window is available.
    ///
    /// Each tick sees exactly the window the live loop would have fetched at
    /// that bar's open time. Trades still open at the end are left open and
    /// reported as such.
    pub async fn run(
        &self,
        classifier: Arc<dyn Classifier>,
        bars: Vec<Bar>,
    ) -> Result<BacktestMetrics, BacktestError> {
        let window = self.settings.candle_limit.max(1);
        if bars.len() < window {
            return Err(BacktestError::NotEnoughBars {
                need: window,
                got: bars.len(),
            });
        }

        tracing::info!(
            "Starting backtest: {} bars, {}-bar window, threshold {:.2}",
            bars.len(),
            window,
            self.threshold
        );

        let start_time = bars[0].timestamp;
        let feed = Arc::new(ReplayFeed::new(bars));
        let notifications = Notifications::new(Arc::new(SilentNotifier), Duration::from_secs(1));
        let mut engine = TradingEngine::new(
            feed.clone(),
            Arc::new(PaperVenue::new()),
            notifications,
            SignalGenerator::new(classifier, self.threshold),
            Portfolio::new(self.initial_balance, self.params.clone(), start_time),
            self.settings.clone(),
        );

        let mut closed = Vec::new();
        let mut failed_ticks = 0;
        for index in window - 1..feed.len() {
            feed.seek(index);
            let now = feed.bars()[index].timestamp;

            match engine.tick_at(now).await {
                Ok(report) => closed.extend(report.closed),
                Err(e) => {
                    failed_ticks += 1;
                    tracing::warn!("Tick at {} failed: {}", now, e);
                }
            }
        }

        let portfolio = engine.portfolio();
        let metrics = BacktestMetrics::from_closed_trades(
            &closed,
            FinalState {
                initial_balance: portfolio.initial_balance(),
                final_balance: portfolio.balance(),
                total_trades: portfolio.total_trades(),
                open_at_end: portfolio.ledger().count(),
                bars_replayed: feed.len() + 1 - window,
                failed_ticks,
            },
        );

        tracing::info!(
            "Backtest complete: {} trades, P&L: ${:.2} ({:.2}%)",
            metrics.total_trades,
            metrics.net_pnl,
            metrics.net_return_pct
        );

        Ok(metrics)
    }

    /// Run backtest and print report
    pub async fn run_and_report(
        &self,
        classifier: Arc<dyn Classifier>,
        bars: Vec<Bar>,
        source_name: &str,
    ) -> Result<BacktestMetrics, BacktestError> {
        println!("\n🔬 Running backtest: {}", source_name);
        println!("   Classifier: {}", classifier.name());
        println!("   Bars: {}", bars.len());
        println!("   Initial Balance: ${:.2}", self.initial_balance);

        let metrics = self.run(classifier, bars).await?;
        metrics.print_report();

        Ok(metrics)
    }
}
