use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// One OHLCV sample for a symbol over a fixed timeframe.
///
/// Produced externally once per (symbol, tf, ts); immutable once constructed.
#[derive(Debug, Clone, PartialEq, Constructor, Serialize, Deserialize)]
pub struct Bar {
    /// Epoch milliseconds.
    pub ts: i64,
    pub symbol: SmolStr,
    /// Timeframe string, eg. "1m", "5m", "1h".
    pub tf: SmolStr,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Typical price `(H + L + C) / 3`, used when a trade feed is unavailable.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Aggressor side of a trade: whether the initiator lifted the ask or hit the
/// bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

/// A single trade tick.
#[derive(Debug, Clone, PartialEq, Constructor, Serialize, Deserialize)]
pub struct Trade {
    /// Epoch milliseconds.
    pub ts: i64,
    pub symbol: SmolStr,
    pub price: f64,
    pub size: f64,
    /// Advisory aggressor side; absence triggers inference from quotes or the
    /// tick rule.
    pub side: Option<Side>,
    pub exchange: Option<SmolStr>,
}

/// One resting price level of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Constructor, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub size: f64,
}

/// Order-book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSide {
    Bid,
    Ask,
}

/// Full replacement of the book state for a symbol.
///
/// `bids` are expected best-first (descending price), `asks` ascending.
#[derive(Debug, Clone, PartialEq, Constructor, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub ts: i64,
    pub symbol: SmolStr,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

/// Incremental single-level book mutation. `size <= 0` deletes the level.
#[derive(Debug, Clone, PartialEq, Constructor, Serialize, Deserialize)]
pub struct BookUpdate {
    pub ts: i64,
    pub symbol: SmolStr,
    pub side: BookSide,
    pub price: f64,
    pub size: f64,
}
