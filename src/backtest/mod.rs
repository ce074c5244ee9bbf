pub mod metrics;
pub mod replay;
pub mod runner;
pub mod synthetic;

pub use metrics::{BacktestMetrics, FinalState, TradeRecord};
pub use replay::{load_bars_csv, read_bars, ReplayFeed};
pub use runner::BacktestRunner;
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
