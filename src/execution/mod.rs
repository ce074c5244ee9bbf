// Position bookkeeping and order execution
pub mod ledger;
pub mod monitor;
pub mod portfolio;
pub mod venue;

pub use ledger::TradeLedger;
pub use monitor::{exit_signal, TradeMonitor};
pub use portfolio::{Portfolio, PortfolioSnapshot};
pub use venue::{place_with_timeout, ExecutionVenue, OrderOutcome, OrderRequest, PaperVenue};
