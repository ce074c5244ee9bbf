use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ClosedTrade, ExitReason, Side};

/// Record of a single closed trade for analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: Side,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    /// Market price observed when the level was crossed
    pub exit_price: f64,
    pub size: f64,
    pub take_profit: bool,
    pub gross_pnl: f64,
    pub fees: f64,
    pub net_pnl: f64,
    pub balance_after: f64,
    pub holding_period_minutes: i64,
}

impl From<&ClosedTrade> for TradeRecord {
    fn from(closed: &ClosedTrade) -> Self {
        Self {
            side: closed.trade.side(),
            entry_time: closed.trade.opened_at(),
            exit_time: closed.closed_at,
            entry_price: closed.trade.entry_price(),
            exit_price: closed.market_price,
            size: closed.trade.size(),
            take_profit: closed.reason == ExitReason::TakeProfit,
            gross_pnl: closed.gross_pnl,
            fees: closed.fees,
            net_pnl: closed.net_pnl,
            balance_after: closed.balance_after,
            holding_period_minutes: (closed.closed_at - closed.trade.opened_at()).num_minutes(),
        }
    }
}

/// Complete backtest performance metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    // Balance
    pub initial_balance: f64,
    pub final_balance: f64,
    pub net_pnl: f64,
    pub net_return_pct: f64,
    pub total_fees: f64,

    // Trade Statistics
    /// Every trade opened, closed or not
    pub total_trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub open_at_end: usize,
    /// Wins over trades opened, matching the live report
    pub win_rate: f64,

    // P&L Distribution
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64, // Gross wins / gross losses, net of fees

    // Risk Metrics
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,

    pub avg_holding_period_minutes: f64,

    pub bars_replayed: usize,
    pub failed_ticks: usize,

    pub trades: Vec<TradeRecord>,
}

/// Counters taken from the portfolio once the replay finishes
#[derive(Debug, Clone, Copy)]
pub struct FinalState {
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_trades: u64,
    pub open_at_end: usize,
    pub bars_replayed: usize,
    pub failed_ticks: usize,
}

impl BacktestMetrics {
    pub fn from_closed_trades(closed: &[ClosedTrade], state: FinalState) -> Self {
        let trades: Vec<TradeRecord> = closed.iter().map(TradeRecord::from).collect();

        let wins: Vec<f64> = trades
            .iter()
            .filter(|t| t.take_profit)
            .map(|t| t.net_pnl)
            .collect();
        let losses: Vec<f64> = trades
            .iter()
            .filter(|t| !t.take_profit)
            .map(|t| t.net_pnl)
            .collect();

        let mean = |values: &[f64]| {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        };

        let win_rate = if state.total_trades > 0 {
            wins.len() as f64 / state.total_trades as f64 * 100.0
        } else {
            0.0
        };

        // Net P&L of a take-profit can still be negative after fees
        let gross_profit: f64 = trades.iter().map(|t| t.net_pnl).filter(|p| *p > 0.0).sum();
        let gross_loss: f64 = trades
            .iter()
            .map(|t| t.net_pnl)
            .filter(|p| *p < 0.0)
            .map(f64::abs)
            .sum();
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_pct) =
            Self::calculate_drawdown(&trades, state.initial_balance);

        let avg_holding_period_minutes = if trades.is_empty() {
            0.0
        } else {
            trades.iter().map(|t| t.holding_period_minutes).sum::<i64>() as f64
                / trades.len() as f64
        };

        let net_pnl = state.final_balance - state.initial_balance;

        Self {
            initial_balance: state.initial_balance,
            final_balance: state.final_balance,
            net_pnl,
            net_return_pct: net_pnl / state.initial_balance * 100.0,
            total_fees: trades.iter().map(|t| t.fees).sum(),
            total_trades: state.total_trades,
            wins: wins.len() as u64,
            losses: losses.len() as u64,
            open_at_end: state.open_at_end,
            win_rate,
            avg_win: mean(&wins),
            avg_loss: mean(&losses),
            largest_win: wins.iter().copied().fold(0.0, f64::max),
            largest_loss: losses.iter().copied().fold(0.0, f64::min),
            profit_factor,
            max_drawdown,
            max_drawdown_pct,
            avg_holding_period_minutes,
            bars_replayed: state.bars_replayed,
            failed_ticks: state.failed_ticks,
            trades,
        }
    }

    /// Largest peak-to-trough fall of the realized balance
    fn calculate_drawdown(trades: &[TradeRecord], initial_balance: f64) -> (f64, f64) {
        let mut peak = initial_balance;
        let mut max_dd = 0.0;
        let mut max_dd_pct = 0.0;

        for trade in trades {
            peak = f64::max(peak, trade.balance_after);
            let drawdown = peak - trade.balance_after;
            if drawdown > max_dd {
                max_dd = drawdown;
                max_dd_pct = if peak > 0.0 { drawdown / peak * 100.0 } else { 0.0 };
            }
        }

        (max_dd, max_dd_pct)
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              BACKTEST PERFORMANCE REPORT              ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!("📊 BALANCE");
        println!("  Initial Balance:       ${:.2}", self.initial_balance);
        println!("  Final Balance:         ${:.2}", self.final_balance);
        println!(
            "  Net P&L:               ${:.2} ({:+.2}%)",
            self.net_pnl, self.net_return_pct
        );
        println!("  Fees Paid:             ${:.2}", self.total_fees);

        println!("\n📈 TRADE STATISTICS");
        println!("  Bars Replayed:         {}", self.bars_replayed);
        println!("  Total Trades:          {}", self.total_trades);
        println!("  Wins:                  {}", self.wins);
        println!("  Losses:                {}", self.losses);
        println!("  Still Open:            {}", self.open_at_end);
        println!("  Win Rate:              {:.2}%", self.win_rate);

        if !self.trades.is_empty() {
            println!("\n💰 WIN/LOSS ANALYSIS");
            println!("  Average Win:           ${:.2}", self.avg_win);
            println!("  Average Loss:          ${:.2}", self.avg_loss);
            println!("  Largest Win:           ${:.2}", self.largest_win);
            println!("  Largest Loss:          ${:.2}", self.largest_loss);
            println!("  Profit Factor:         {:.2}", self.profit_factor);
            println!(
                "  Avg Holding:           {:.1} minutes ({:.1} hours)",
                self.avg_holding_period_minutes,
                self.avg_holding_period_minutes / 60.0
            );

            println!("\n⚠️  RISK METRICS");
            println!(
                "  Max Drawdown:          ${:.2} ({:.2}%)",
                self.max_drawdown, self.max_drawdown_pct
            );
        }

        if self.failed_ticks > 0 {
            println!("\n🛑 Failed ticks:         {}", self.failed_ticks);
        }

        println!("\n═════════════════════════════════════════════════════════\n");
    }
}
