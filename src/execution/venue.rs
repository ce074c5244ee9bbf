use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::models::OrderSide;

/// Market order sent to the execution venue
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub size: f64,
    /// Closing orders may only shrink an existing position
    pub reduce_only: bool,
}

/// Result of a market order, inspected by the caller rather than raised
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Filled { order_id: String },
    /// The venue has no position left to reduce. Only meaningful for closes.
    AlreadyClosed,
    Rejected { reason: String },
}

/// Order-execution capability
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    async fn place_market_order(&self, order: &OrderRequest) -> OrderOutcome;

    fn name(&self) -> &str {
        "venue"
    }
}

/// Place an order, turning a hung call into a rejection after `timeout`
pub async fn place_with_timeout(
    venue: &dyn ExecutionVenue,
    order: &OrderRequest,
    timeout: Duration,
) -> OrderOutcome {
    match tokio::time::timeout(timeout, venue.place_market_order(order)).await {
        Ok(outcome) => outcome,
        Err(_) => OrderOutcome::Rejected {
            reason: format!("{} order timed out after {:?}", venue.name(), timeout),
        },
    }
}

/// Positions smaller than this are treated as flat
const FLAT_EPSILON: f64 = 1e-12;

/// Simulated venue that fills every order at market
///
/// Tracks the net base-asset position so that a reduce-only order against a
/// flat (or same-direction) position reports `AlreadyClosed`.
#[derive(Debug, Default)]
pub struct PaperVenue {
    net_position: Mutex<f64>,
}

impl PaperVenue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signed net position in base units (positive = long)
    pub fn net_position(&self) -> f64 {
        self.net_position.lock().map(|p| *p).unwrap_or(0.0)
    }
}

#[async_trait]
impl ExecutionVenue for PaperVenue {
    async fn place_market_order(&self, order: &OrderRequest) -> OrderOutcome {
        if !order.size.is_finite() || order.size <= 0.0 {
            return OrderOutcome::Rejected {
                reason: format!("invalid order size {}", order.size),
            };
        }

        let mut net = match self.net_position.lock() {
            Ok(net) => net,
            Err(e) => {
                return OrderOutcome::Rejected {
                    reason: e.to_string(),
                }
            }
        };

        let signed = match order.side {
            OrderSide::Buy => order.size,
            OrderSide::Sell => -order.size,
        };

        if order.reduce_only {
            let reduces = net.abs() > FLAT_EPSILON && net.signum() != signed.signum();
            if !reduces {
                return OrderOutcome::AlreadyClosed;
            }
            // Never flip through zero on a reduce-only order
            let fill = signed.abs().min(net.abs()) * signed.signum();
            *net += fill;
            if net.abs() <= FLAT_EPSILON {
                *net = 0.0;
            }
        } else {
            *net += signed;
        }

        let order_id = format!("paper-{}", Uuid::new_v4());
        tracing::debug!(
            "Paper {} {} {:.6} (reduce_only={}) -> {} | net {:.6}",
            order.side,
            order.symbol,
            order.size,
            order.reduce_only,
            order_id,
            *net
        );
        OrderOutcome::Filled { order_id }
    }

    fn name(&self) -> &str {
        "paper"
    }
}
