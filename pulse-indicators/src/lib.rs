//! # Pulse-Indicators
//! Incremental technical and market-microstructure indicators computed from a
//! continuous stream of market events (bars, trades, order-book snapshots and
//! updates).
//!
//! Every calculator keeps one independent state machine per
//! [`InstrumentKey`](state::InstrumentKey) (symbol, timeframe), created lazily
//! on the first event for a key and updated in O(1) memory per event. The
//! shared admission contract ([`sequence::Sequencer`]) drops out-of-order
//! events without mutating state, and session-scoped accumulators reset when
//! the UTC-day session key derived from the event timestamp rolls over.
//!
//! Data-quality problems (non-finite numbers, zero sizes, stale timestamps)
//! are never errors: the event is skipped and the calculator emits nothing.

/// Order-book state and the indicators derived from it (liquidity, heatmap).
pub mod book;

/// Classic bar-driven indicators (RSI, MACD, ADX).
pub mod classic;

pub mod error;

/// Typed market events consumed by the calculators. Pure data, no behaviour.
pub mod event;

/// Trade-flow indicators (VWAP, CVD, aggressor-classified order flow).
pub mod flow;

/// Structured indicator outputs.
pub mod output;

/// Price-level aggregation indicators (POC, session and rolling profiles).
pub mod profile;

pub mod quantize;
pub mod sequence;
pub mod session;
pub mod smoothing;
pub mod state;

pub use error::IndicatorError;
pub use event::{Bar, BookSide, BookSnapshot, BookUpdate, Level, Side, Trade};
pub use state::{InstrumentKey, KeyedState};
