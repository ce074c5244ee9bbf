use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::venue::{place_with_timeout, ExecutionVenue, OrderOutcome, OrderRequest};
use super::Portfolio;
use crate::models::{ClosedTrade, ExitReason, Side, Trade};
use crate::notify::{messages, Notifications};

/// Which protective level, if any, `price` has crossed
///
/// Take-profit is tested before stop-loss.
pub fn exit_signal(trade: &Trade, price: f64) -> Option<ExitReason> {
    match trade.side() {
        Side::Long => {
            if price >= trade.take_profit() {
                Some(ExitReason::TakeProfit)
            } else if price <= trade.stop_loss() {
                Some(ExitReason::StopLoss)
            } else {
                None
            }
        }
        Side::Short => {
            if price <= trade.take_profit() {
                Some(ExitReason::TakeProfit)
            } else if price >= trade.stop_loss() {
                Some(ExitReason::StopLoss)
            } else {
                None
            }
        }
    }
}

/// Closes open trades whose stop or target has been crossed
pub struct TradeMonitor {
    venue: Arc<dyn ExecutionVenue>,
    notifications: Notifications,
    symbol: String,
    call_timeout: Duration,
}

impl TradeMonitor {
    pub fn new(
        venue: Arc<dyn ExecutionVenue>,
        notifications: Notifications,
        symbol: String,
        call_timeout: Duration,
    ) -> Self {
        Self {
            venue,
            notifications,
            symbol,
            call_timeout,
        }
    }

    /// Check every open trade against `price` and close the triggered ones.
    ///
    /// A close is only booked once the venue confirms the offsetting order (or
    /// reports the position already gone). On any other venue failure the
    /// trade stays open and is retried on the next scan.
    pub async fn scan(
        &self,
        portfolio: &mut Portfolio,
        price: f64,
        now: DateTime<Utc>,
    ) -> Vec<ClosedTrade> {
        let triggered: Vec<(Uuid, ExitReason, OrderRequest)> = portfolio
            .open_trades()
            .iter()
            .filter_map(|trade| {
                exit_signal(trade, price).map(|reason| {
                    let order = OrderRequest {
                        symbol: self.symbol.clone(),
                        side: trade.side().exit_order(),
                        size: trade.size(),
                        reduce_only: true,
                    };
                    (trade.id(), reason, order)
                })
            })
            .collect();

        let mut closed = Vec::with_capacity(triggered.len());
        for (trade_id, reason, order) in triggered {
            let close_order_id =
                match place_with_timeout(self.venue.as_ref(), &order, self.call_timeout).await {
                    OrderOutcome::Filled { order_id } => Some(order_id),
                    OrderOutcome::AlreadyClosed => {
                        tracing::info!(
                            "Position for trade {} already closed on {}",
                            trade_id,
                            self.venue.name()
                        );
                        None
                    }
                    OrderOutcome::Rejected { reason: why } => {
                        tracing::warn!(
                            "Close order for trade {} failed ({}), will retry next tick",
                            trade_id,
                            why
                        );
                        continue;
                    }
                };

            if let Some(result) =
                portfolio.settle_close(trade_id, reason, price, close_order_id, now)
            {
                tracing::info!(
                    "✓ Closed {} {:?} @ ${:.2} | net ${:.2} (fees ${:.2}) | balance ${:.2}",
                    result.trade.side(),
                    result.reason,
                    price,
                    result.net_pnl,
                    result.fees,
                    result.balance_after
                );
                self.notifications
                    .send(&messages::trade_closed(&result))
                    .await;
                closed.push(result);
            }
        }

        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::PaperVenue;
    use crate::notify::RecordingNotifier;
    use crate::risk::RiskParameters;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn long() -> Trade {
        Trade::new(Side::Long, 50000.0, 49000.0, 53000.0, 0.002, "o-long".into(), Utc::now())
            .unwrap()
    }

    fn short() -> Trade {
        Trade::new(Side::Short, 50000.0, 51000.0, 47000.0, 0.002, "o-short".into(), Utc::now())
            .unwrap()
    }

    /// Replays a fixed list of outcomes and records the orders it saw
    struct ScriptedVenue {
        outcomes: Mutex<Vec<OrderOutcome>>,
        orders: Mutex<Vec<OrderRequest>>,
    }

    impl ScriptedVenue {
        fn new(outcomes: Vec<OrderOutcome>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                orders: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ExecutionVenue for ScriptedVenue {
        async fn place_market_order(&self, order: &OrderRequest) -> OrderOutcome {
            self.orders.lock().unwrap().push(order.clone());
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                OrderOutcome::Filled {
                    order_id: "fill".into(),
                }
            } else {
                outcomes.remove(0)
            }
        }
    }

    fn monitor(venue: Arc<dyn ExecutionVenue>) -> (TradeMonitor, Arc<RecordingNotifier>) {
        let recorder = Arc::new(RecordingNotifier::new());
        let monitor = TradeMonitor::new(
            venue,
            Notifications::new(recorder.clone(), Duration::from_secs(1)),
            "BTC".into(),
            Duration::from_secs(5),
        );
        (monitor, recorder)
    }

    fn book_with(trades: Vec<Trade>) -> Portfolio {
        let mut portfolio = Portfolio::new(100.0, RiskParameters::default(), Utc::now());
        for trade in trades {
            portfolio.record_open(trade).unwrap();
        }
        portfolio
    }

    #[test]
    fn test_exit_signal_long() {
        let trade = long();
        assert_eq!(exit_signal(&trade, 53000.0), Some(ExitReason::TakeProfit));
        assert_eq!(exit_signal(&trade, 60000.0), Some(ExitReason::TakeProfit));
        assert_eq!(exit_signal(&trade, 49000.0), Some(ExitReason::StopLoss));
        assert_eq!(exit_signal(&trade, 50500.0), None);
    }

    #[test]
    fn test_exit_signal_short() {
        let trade = short();
        assert_eq!(exit_signal(&trade, 47000.0), Some(ExitReason::TakeProfit));
        assert_eq!(exit_signal(&trade, 51000.0), Some(ExitReason::StopLoss));
        assert_eq!(exit_signal(&trade, 49500.0), None);
    }

    #[tokio::test]
    async fn test_take_profit_closes_with_offsetting_order() {
        let venue = ScriptedVenue::new(vec![]);
        let (monitor, recorder) = monitor(venue.clone());
        let mut portfolio = book_with(vec![long()]);

        let closed = monitor.scan(&mut portfolio, 53000.0, Utc::now()).await;

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].reason, ExitReason::TakeProfit);
        assert!((portfolio.balance() - 105.897).abs() < 1e-9);
        assert_eq!(portfolio.wins(), 1);
        assert_eq!(portfolio.ledger().count(), 0);

        let orders = venue.orders.lock().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, crate::models::OrderSide::Sell);
        assert_eq!(orders[0].size, 0.002);
        assert!(orders[0].reduce_only);
        assert_eq!(recorder.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_closes_exactly_once() {
        let venue = ScriptedVenue::new(vec![]);
        let (monitor, _) = monitor(venue.clone());
        let mut portfolio = book_with(vec![long()]);

        monitor.scan(&mut portfolio, 53000.0, Utc::now()).await;
        let balance = portfolio.balance();

        let again = monitor.scan(&mut portfolio, 54000.0, Utc::now()).await;
        assert!(again.is_empty());
        assert_eq!(portfolio.balance(), balance);
        assert_eq!(portfolio.wins(), 1);
        assert_eq!(venue.orders.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_already_closed_is_treated_as_success() {
        let venue = ScriptedVenue::new(vec![OrderOutcome::AlreadyClosed]);
        let (monitor, _) = monitor(venue);
        let mut portfolio = book_with(vec![short()]);

        let closed = monitor.scan(&mut portfolio, 51000.0, Utc::now()).await;

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].close_order_id, None);
        assert_eq!(portfolio.losses(), 1);
        assert!(portfolio.balance() < 100.0);
    }

    #[tokio::test]
    async fn test_failed_close_keeps_trade_open() {
        let venue = ScriptedVenue::new(vec![OrderOutcome::Rejected {
            reason: "exchange down".into(),
        }]);
        let (monitor, recorder) = monitor(venue);
        let mut portfolio = book_with(vec![long()]);

        let closed = monitor.scan(&mut portfolio, 53000.0, Utc::now()).await;
        assert!(closed.is_empty());
        assert_eq!(portfolio.balance(), 100.0);
        assert_eq!(portfolio.ledger().count(), 1);
        assert!(recorder.messages().is_empty());

        // Retried on the next scan
        let closed = monitor.scan(&mut portfolio, 53100.0, Utc::now()).await;
        assert_eq!(closed.len(), 1);
        assert_eq!(portfolio.ledger().count(), 0);
    }

    #[tokio::test]
    async fn test_trades_evaluated_independently() {
        let venue = Arc::new(PaperVenue::new());
        let (monitor, _) = monitor(venue);
        let mut portfolio = book_with(vec![long(), short()]);

        // Below the long stop, still inside the short's range
        let closed = monitor.scan(&mut portfolio, 48900.0, Utc::now()).await;

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].trade.side(), Side::Long);
        assert_eq!(closed[0].reason, ExitReason::StopLoss);
        assert_eq!(portfolio.ledger().count(), 1);
    }
}
