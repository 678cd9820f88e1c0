//! Structured values emitted by the calculators.

use serde::{Deserialize, Serialize};

use crate::event::Level;

/// MACD line, signal line and histogram. `hist` is exactly
/// `macd - signal` at machine precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdOutput {
    pub macd: f64,
    pub signal: f64,
    pub hist: f64,
}

/// Directional-movement snapshot. All fields are clamped to `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdxOutput {
    pub plus_di: f64,
    pub minus_di: f64,
    pub dx: f64,
    pub adx: f64,
}

/// One bin of a volume profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceVolume {
    pub price: f64,
    pub volume: f64,
}

/// Session volume-profile snapshot: bins sorted by ascending price, only
/// levels with accumulated volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileOutput {
    pub poc: Option<f64>,
    pub total_volume: f64,
    pub bins: Vec<PriceVolume>,
}

/// Volume profile of one fixed time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketProfile {
    pub bucket_start: i64,
    pub total_volume: f64,
    pub poc: Option<f64>,
    pub bins: Vec<PriceVolume>,
}

/// Aggressor-classified flow totals since the last session reset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderFlowOutput {
    /// `buy - sell`.
    pub delta: f64,
    pub buy: f64,
    pub sell: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

/// Book-liquidity metrics over the best `depth_levels` prices per side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidityOutput {
    pub bids_depth: f64,
    pub asks_depth: f64,
    /// `(bids_depth - asks_depth) / (bids_depth + asks_depth)`, 0 when the
    /// book is empty.
    pub depth_imbalance: f64,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub bid_size: Option<f64>,
    pub ask_size: Option<f64>,
    /// Same imbalance formula restricted to the best `top_k` levels per side.
    pub top_imbalance: f64,
}

/// One sparse heatmap row: `[bucket_start, price, max_size]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatmapRow(pub i64, pub f64, pub f64);

/// Price×time liquidity frame: per-price maximum resting size observed within
/// the current time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapOutput {
    pub bucket_start: i64,
    pub bucket_ms: i64,
    pub tick_size: f64,
    pub rows: Vec<HeatmapRow>,
}

/// Truncated depth-of-book snapshot: bids best-first descending, asks
/// ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthOutput {
    pub ts: i64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}
