// Risk management module
pub mod sizing;

pub use sizing::{protective_levels, size_position, RiskParameters, SizingMode};
