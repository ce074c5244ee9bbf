use serde::{Deserialize, Serialize};

use crate::error::TradeError;
use crate::execution::Portfolio;
use crate::models::{PositionPlan, Side};

/// How the notional of a new position is derived from the balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizingMode {
    /// `riskAmount / riskPct`, which is always the whole balance.
    ///
    /// This is the historical behaviour: the risk percent cancels out, so every
    /// trade is sized at 100% of the current balance.
    #[default]
    FullBalance,
    /// `riskAmount / stopDistance`, so a move to the stop loses exactly
    /// `riskAmount`. Identical to `FullBalance` when the stop distance equals
    /// the risk percent.
    FixedFractional,
}

/// Account-level risk settings, fixed at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParameters {
    pub risk_per_trade_percent: f64,
    pub reward_risk_ratio: f64,
    pub fee_percent: f64,
    pub max_open_trades: usize,
    #[serde(default)]
    pub sizing_mode: SizingMode,
    /// Stop distance as a fraction of entry; defaults to the risk percent
    #[serde(default)]
    pub stop_loss_percent: Option<f64>,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            risk_per_trade_percent: 0.02,
            reward_risk_ratio: 3.0,
            fee_percent: 0.0005,
            max_open_trades: 2,
            sizing_mode: SizingMode::FullBalance,
            stop_loss_percent: None,
        }
    }
}

impl RiskParameters {
    pub fn stop_distance(&self) -> f64 {
        self.stop_loss_percent.unwrap_or(self.risk_per_trade_percent)
    }

    /// Quote amount lost if a trade opened now hits its stop
    pub fn risk_amount(&self, balance: f64) -> f64 {
        balance * self.risk_per_trade_percent
    }

    /// Notional value of a new position
    pub fn position_value(&self, balance: f64) -> f64 {
        let risk_amount = self.risk_amount(balance);
        match self.sizing_mode {
            SizingMode::FullBalance => risk_amount / self.risk_per_trade_percent,
            SizingMode::FixedFractional => risk_amount / self.stop_distance(),
        }
    }
}

/// Stop-loss and take-profit prices for an entry
///
/// Returns `(stop_loss, take_profit)`.
pub fn protective_levels(side: Side, entry: f64, stop_distance: f64, rr_ratio: f64) -> (f64, f64) {
    match side {
        Side::Long => (
            entry * (1.0 - stop_distance),
            entry * (1.0 + stop_distance * rr_ratio),
        ),
        Side::Short => (
            entry * (1.0 + stop_distance),
            entry * (1.0 - stop_distance * rr_ratio),
        ),
    }
}

/// Size a new position from the current account state
pub fn size_position(
    portfolio: &Portfolio,
    side: Side,
    entry_price: f64,
) -> Result<PositionPlan, TradeError> {
    if !entry_price.is_finite() || entry_price <= 0.0 {
        return Err(TradeError::InvalidEntry(entry_price));
    }

    let params = portfolio.params();
    let position_value = params.position_value(portfolio.balance());
    let size = position_value / entry_price;
    let (stop_loss, take_profit) = protective_levels(
        side,
        entry_price,
        params.stop_distance(),
        params.reward_risk_ratio,
    );

    tracing::debug!(
        "Sizing {} @ {:.2}: risk ${:.2}, notional ${:.2}, size {:.6}",
        side,
        entry_price,
        params.risk_amount(portfolio.balance()),
        position_value,
        size
    );

    PositionPlan::new(side, entry_price, stop_loss, take_profit, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn portfolio(balance: f64, params: RiskParameters) -> Portfolio {
        Portfolio::new(balance, params, Utc::now())
    }

    #[test]
    fn test_levels_long() {
        let plan = size_position(&portfolio(100.0, RiskParameters::default()), Side::Long, 50000.0)
            .unwrap();

        assert!((plan.stop_loss() - 49000.0).abs() < 1e-9);
        assert!((plan.take_profit() - 53000.0).abs() < 1e-9);
    }

    #[test]
    fn test_levels_short() {
        let plan = size_position(&portfolio(100.0, RiskParameters::default()), Side::Short, 50000.0)
            .unwrap();

        assert!((plan.stop_loss() - 51000.0).abs() < 1e-9);
        assert!((plan.take_profit() - 47000.0).abs() < 1e-9);
    }

    #[test]
    fn test_full_balance_sizing_ignores_risk_percent() {
        for risk in [0.005, 0.02, 0.1] {
            let params = RiskParameters {
                risk_per_trade_percent: risk,
                ..Default::default()
            };
            assert!((params.position_value(100.0) - 100.0).abs() < 1e-9);
        }

        let plan = size_position(&portfolio(100.0, RiskParameters::default()), Side::Long, 50000.0)
            .unwrap();
        assert!((plan.size() - 0.002).abs() < 1e-12);
        assert!((plan.notional() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_fractional_loses_risk_amount_at_stop() {
        let params = RiskParameters {
            risk_per_trade_percent: 0.01,
            stop_loss_percent: Some(0.04),
            sizing_mode: SizingMode::FixedFractional,
            ..Default::default()
        };
        let book = portfolio(1000.0, params);
        let plan = size_position(&book, Side::Long, 200.0).unwrap();

        // 1% of 1000 at risk over a 4% stop -> 250 notional
        assert!((plan.notional() - 250.0).abs() < 1e-9);
        let loss_at_stop = (plan.entry_price() - plan.stop_loss()) * plan.size();
        assert!((loss_at_stop - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_modes_agree_without_separate_stop() {
        let full = RiskParameters::default();
        let fractional = RiskParameters {
            sizing_mode: SizingMode::FixedFractional,
            ..Default::default()
        };
        assert!((full.position_value(250.0) - fractional.position_value(250.0)).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_bad_entry() {
        let book = portfolio(100.0, RiskParameters::default());
        assert_eq!(
            size_position(&book, Side::Long, 0.0),
            Err(TradeError::InvalidEntry(0.0))
        );
    }

    #[test]
    fn test_rejects_empty_balance() {
        let book = portfolio(0.0, RiskParameters::default());
        assert!(matches!(
            size_position(&book, Side::Long, 100.0),
            Err(TradeError::InvalidSize(_))
        ));
    }
}
