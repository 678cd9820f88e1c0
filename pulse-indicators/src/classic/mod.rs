//! Classic bar-driven indicators.
//!
//! All three are pure functions of an admitted bar stream: one output (or
//! structured output) per key per bar, `None` during warm-up. Bars reject
//! `ts <= last_ts` — there is no same-timestamp overwrite for bar data.

mod adx;
mod macd;
mod rsi;

pub use adx::Adx;
pub use macd::Macd;
pub use rsi::Rsi;
