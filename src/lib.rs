// Core modules
pub mod api;
pub mod backtest;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod features;
pub mod models;
pub mod notify;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use api::MarketData;
pub use classifier::Classifier;
pub use engine::{EngineSettings, TickReport, TradingEngine};
pub use error::{FetchError, StartupError, TickError, TradeError};
pub use execution::ExecutionVenue;
pub use models::*;
pub use notify::Notifier;
