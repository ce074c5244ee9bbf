use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::TradeLedger;
use crate::error::TradeError;
use crate::models::{ClosedTrade, ExitReason, Trade};
use crate::risk::RiskParameters;

/// Account state for the paper book
///
/// Owned by the engine and mutated only inside a tick; never shared.
#[derive(Debug, Clone)]
pub struct Portfolio {
    balance: f64,
    initial_balance: f64,
    ledger: TradeLedger,
    params: RiskParameters,
    wins: u64,
    losses: u64,
    total_trades: u64,
    start_time: DateTime<Utc>,
}

/// Point-in-time view used for reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    pub balance: f64,
    pub net_pnl: f64,
    pub wins: u64,
    pub losses: u64,
    pub total_trades: u64,
    pub open_trades: usize,
    pub win_rate_pct: f64,
    pub start_time: DateTime<Utc>,
}

impl Portfolio {
    pub fn new(initial_balance: f64, params: RiskParameters, start_time: DateTime<Utc>) -> Self {
        Self {
            balance: initial_balance,
            initial_balance,
            ledger: TradeLedger::new(params.max_open_trades),
            params,
            wins: 0,
            losses: 0,
            total_trades: 0,
            start_time,
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn net_pnl(&self) -> f64 {
        self.balance - self.initial_balance
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    pub fn open_trades(&self) -> &[Trade] {
        self.ledger.trades()
    }

    pub fn has_capacity(&self) -> bool {
        self.ledger.has_capacity()
    }

    pub fn wins(&self) -> u64 {
        self.wins
    }

    pub fn losses(&self) -> u64 {
        self.losses
    }

    pub fn total_trades(&self) -> u64 {
        self.total_trades
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Wins as a percentage of all trades ever opened, 0 before the first trade
    pub fn win_rate_pct(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.total_trades as f64 * 100.0
        }
    }

    /// Record a filled entry. Balance is untouched until the trade closes.
    pub fn record_open(&mut self, trade: Trade) -> Result<Uuid, TradeError> {
        let id = self.ledger.open(trade)?;
        self.total_trades += 1;
        Ok(id)
    }

    /// Realize a closed trade: remove it, book net P&L and bump the counters.
    ///
    /// Gross P&L is measured to the triggered level; fees are charged on the
    /// entry notional plus the notional at the observed market price. Returns
    /// `None` if the trade is no longer open, so a trade settles at most once.
    pub fn settle_close(
        &mut self,
        trade_id: Uuid,
        reason: ExitReason,
        market_price: f64,
        close_order_id: Option<String>,
        closed_at: DateTime<Utc>,
    ) -> Option<ClosedTrade> {
        let trade = self.ledger.remove(trade_id)?;

        let exit_level = trade.exit_level(reason);
        let gross_pnl = trade.unrealized_pnl(exit_level);
        let fees = (trade.entry_price() * trade.size() + market_price * trade.size())
            * self.params.fee_percent;
        let net_pnl = gross_pnl - fees;

        self.balance += net_pnl;
        if reason.is_win() {
            self.wins += 1;
        } else {
            self.losses += 1;
        }

        Some(ClosedTrade {
            trade,
            reason,
            market_price,
            gross_pnl,
            fees,
            net_pnl,
            balance_after: self.balance,
            close_order_id,
            closed_at,
        })
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot {
            balance: self.balance,
            net_pnl: self.net_pnl(),
            wins: self.wins,
            losses: self.losses,
            total_trades: self.total_trades,
            open_trades: self.ledger.count(),
            win_rate_pct: self.win_rate_pct(),
            start_time: self.start_time,
        }
    }
}
