use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::TradeError;

/// OHLCV candlestick for one fixed interval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Direction of a position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Order that opens a position on this side
    pub fn entry_order(self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Offsetting order that closes a position on this side
    pub fn exit_order(self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }

    /// +1 for long, -1 for short
    pub fn direction(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Side of a market order sent to the venue
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
}

impl ExitReason {
    pub fn is_win(self) -> bool {
        matches!(self, ExitReason::TakeProfit)
    }
}

/// Check the side-dependent ordering of stop, entry and target.
fn check_levels(
    side: Side,
    entry: f64,
    stop_loss: f64,
    take_profit: f64,
    size: f64,
) -> Result<(), TradeError> {
    if !entry.is_finite() || entry <= 0.0 {
        return Err(TradeError::InvalidEntry(entry));
    }
    if !size.is_finite() || size <= 0.0 {
        return Err(TradeError::InvalidSize(size));
    }

    let ordered = stop_loss.is_finite()
        && take_profit.is_finite()
        && stop_loss > 0.0
        && take_profit > 0.0
        && match side {
            Side::Long => stop_loss < entry && entry < take_profit,
            Side::Short => take_profit < entry && entry < stop_loss,
        };

    if !ordered {
        return Err(TradeError::InvalidLevels {
            side,
            entry,
            stop_loss,
            take_profit,
        });
    }
    Ok(())
}

/// A sized position that has not been sent to the venue yet
#[derive(Debug, Clone, PartialEq)]
pub struct PositionPlan {
    side: Side,
    entry_price: f64,
    stop_loss: f64,
    take_profit: f64,
    size: f64,
}

impl PositionPlan {
    pub fn new(
        side: Side,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        size: f64,
    ) -> Result<Self, TradeError> {
        check_levels(side, entry_price, stop_loss, take_profit, size)?;
        Ok(Self {
            side,
            entry_price,
            stop_loss,
            take_profit,
            size,
        })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }

    pub fn take_profit(&self) -> f64 {
        self.take_profit
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    /// Quote-currency value of the position at entry
    pub fn notional(&self) -> f64 {
        self.entry_price * self.size
    }

    /// Turn the plan into a live trade once the venue has filled the entry order.
    pub fn into_trade(self, venue_order_id: String, opened_at: DateTime<Utc>) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            side: self.side,
            entry_price: self.entry_price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            size: self.size,
            venue_order_id,
            opened_at,
        }
    }
}

/// An open position mirrored on the venue
///
/// Fields are read-only after construction; the only transition is the close,
/// which consumes the trade into a [`ClosedTrade`].
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    id: Uuid,
    side: Side,
    entry_price: f64,
    stop_loss: f64,
    take_profit: f64,
    size: f64,
    venue_order_id: String,
    opened_at: DateTime<Utc>,
}

impl Trade {
    pub fn new(
        side: Side,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        size: f64,
        venue_order_id: String,
        opened_at: DateTime<Utc>,
    ) -> Result<Self, TradeError> {
        Ok(PositionPlan::new(side, entry_price, stop_loss, take_profit, size)?
            .into_trade(venue_order_id, opened_at))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }

    pub fn take_profit(&self) -> f64 {
        self.take_profit
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn venue_order_id(&self) -> &str {
        &self.venue_order_id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Level that would close the trade for the given reason
    pub fn exit_level(&self, reason: ExitReason) -> f64 {
        match reason {
            ExitReason::TakeProfit => self.take_profit,
            ExitReason::StopLoss => self.stop_loss,
        }
    }

    /// Mark-to-market P&L at `price`, before fees
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.size * self.side.direction()
    }
}

/// Realized outcome of a closed trade
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub trade: Trade,
    pub reason: ExitReason,
    /// Price observed when the close was triggered
    pub market_price: f64,
    pub gross_pnl: f64,
    pub fees: f64,
    pub net_pnl: f64,
    pub balance_after: f64,
    /// None when the venue reported the position as already closed
    pub close_order_id: Option<String>,
    pub closed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_trade_creation() {
        let trade = Trade::new(
            Side::Long,
            50000.0,
            49000.0,
            53000.0,
            0.002,
            "order-1".to_string(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(trade.side(), Side::Long);
        assert_eq!(trade.venue_order_id(), "order-1");
        assert_eq!(trade.exit_level(ExitReason::StopLoss), 49000.0);
        assert_eq!(trade.exit_level(ExitReason::TakeProfit), 53000.0);
    }

    #[test]
    fn test_long_levels_must_bracket_entry() {
        let result = PositionPlan::new(Side::Long, 50000.0, 51000.0, 53000.0, 0.002);
        assert!(matches!(result, Err(TradeError::InvalidLevels { .. })));
    }

    #[test]
    fn test_short_levels_are_reversed() {
        assert!(PositionPlan::new(Side::Short, 50000.0, 51000.0, 47000.0, 0.002).is_ok());

        let result = PositionPlan::new(Side::Short, 50000.0, 49000.0, 53000.0, 0.002);
        assert!(matches!(result, Err(TradeError::InvalidLevels { .. })));
    }

    #[test]
    fn test_size_must_be_positive() {
        let result = PositionPlan::new(Side::Long, 100.0, 98.0, 106.0, 0.0);
        assert_eq!(result, Err(TradeError::InvalidSize(0.0)));

        let result = PositionPlan::new(Side::Long, 100.0, 98.0, 106.0, f64::NAN);
        assert!(matches!(result, Err(TradeError::InvalidSize(_))));
    }

    #[test]
    fn test_entry_must_be_positive() {
        let result = PositionPlan::new(Side::Long, -1.0, -2.0, 1.0, 1.0);
        assert_eq!(result, Err(TradeError::InvalidEntry(-1.0)));
    }

    #[test]
    fn test_unrealized_pnl_signed_by_side() {
        let long = Trade::new(Side::Long, 100.0, 98.0, 106.0, 2.0, "a".into(), Utc::now()).unwrap();
        let short =
            Trade::new(Side::Short, 100.0, 102.0, 94.0, 2.0, "b".into(), Utc::now()).unwrap();

        assert_eq!(long.unrealized_pnl(110.0), 20.0);
        assert_eq!(short.unrealized_pnl(110.0), -20.0);
        assert_eq!(short.unrealized_pnl(95.0), 10.0);
    }

    #[test]
    fn test_order_sides() {
        assert_eq!(Side::Long.entry_order(), OrderSide::Buy);
        assert_eq!(Side::Long.exit_order(), OrderSide::Sell);
        assert_eq!(Side::Short.entry_order(), OrderSide::Sell);
        assert_eq!(Side::Short.exit_order(), OrderSide::Buy);
    }
}
