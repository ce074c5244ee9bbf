// Trading signal module
pub mod signals;

pub use signals::{Decision, SignalEvaluation, SignalGenerator, DEFAULT_THRESHOLD};
