use uuid::Uuid;

use crate::error::TradeError;
use crate::models::Trade;

/// The set of currently open trades, bounded by `max_open_trades`
#[derive(Debug, Clone)]
pub struct TradeLedger {
    trades: Vec<Trade>,
    max_open_trades: usize,
}

impl TradeLedger {
    pub fn new(max_open_trades: usize) -> Self {
        Self {
            trades: Vec::new(),
            max_open_trades,
        }
    }

    /// Record a trade. Fails without side effects when full or when the venue
    /// order id is already tracked.
    pub fn open(&mut self, trade: Trade) -> Result<Uuid, TradeError> {
        if !self.has_capacity() {
            return Err(TradeError::AtCapacity {
                max: self.max_open_trades,
            });
        }
        if self
            .trades
            .iter()
            .any(|t| t.venue_order_id() == trade.venue_order_id())
        {
            return Err(TradeError::DuplicateOrderId(
                trade.venue_order_id().to_string(),
            ));
        }

        let id = trade.id();
        self.trades.push(trade);
        Ok(id)
    }

    /// Remove a trade by identity, returning it if it was still open
    pub fn remove(&mut self, trade_id: Uuid) -> Option<Trade> {
        let idx = self.trades.iter().position(|t| t.id() == trade_id)?;
        Some(self.trades.remove(idx))
    }

    pub fn get(&self, trade_id: Uuid) -> Option<&Trade> {
        self.trades.iter().find(|t| t.id() == trade_id)
    }

    pub fn count(&self) -> usize {
        self.trades.len()
    }

    pub fn max_open_trades(&self) -> usize {
        self.max_open_trades
    }

    pub fn has_capacity(&self) -> bool {
        self.trades.len() < self.max_open_trades
    }

    /// Open trades in the order they were opened
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use chrono::Utc;

    fn trade(order_id: &str) -> Trade {
        Trade::new(
            Side::Long,
            100.0,
            98.0,
            106.0,
            1.0,
            order_id.to_string(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_open_and_count() {
        let mut ledger = TradeLedger::new(2);
        let id = ledger.open(trade("a")).unwrap();

        assert_eq!(ledger.count(), 1);
        assert_eq!(ledger.get(id).unwrap().venue_order_id(), "a");
        assert!(ledger.has_capacity());
    }

    #[test]
    fn test_capacity_enforced() {
        let mut ledger = TradeLedger::new(2);
        ledger.open(trade("a")).unwrap();
        ledger.open(trade("b")).unwrap();

        let result = ledger.open(trade("c"));
        assert_eq!(result, Err(TradeError::AtCapacity { max: 2 }));
        assert_eq!(ledger.count(), 2);
    }

    #[test]
    fn test_duplicate_order_id_rejected() {
        let mut ledger = TradeLedger::new(3);
        ledger.open(trade("a")).unwrap();

        let result = ledger.open(trade("a"));
        assert_eq!(result, Err(TradeError::DuplicateOrderId("a".to_string())));
        assert_eq!(ledger.count(), 1);
    }

    #[test]
    fn test_remove_by_identity() {
        let mut ledger = TradeLedger::new(2);
        let a = ledger.open(trade("a")).unwrap();
        let b = ledger.open(trade("b")).unwrap();

        let removed = ledger.remove(a).unwrap();
        assert_eq!(removed.venue_order_id(), "a");
        assert_eq!(ledger.count(), 1);
        assert_eq!(ledger.trades()[0].id(), b);

        // Second removal is a no-op
        assert!(ledger.remove(a).is_none());
        assert_eq!(ledger.count(), 1);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut ledger = TradeLedger::new(2);
        let mut ids = Vec::new();

        for i in 0..20 {
            if i % 3 == 2 {
                if let Some(id) = ids.pop() {
                    ledger.remove(id);
                }
            } else if let Ok(id) = ledger.open(trade(&format!("order-{}", i))) {
                ids.push(id);
            }
            assert!(ledger.count() <= ledger.max_open_trades());
        }
    }
}
