//! Order-book state and derived liquidity indicators.

mod heatmap;
mod ladder;
mod liquidity;

pub use heatmap::Heatmap;
pub use ladder::Ladder;
pub use liquidity::Liquidity;
