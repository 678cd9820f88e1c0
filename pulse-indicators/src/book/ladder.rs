use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    event::{BookSide, BookSnapshot, BookUpdate, Level},
    output::DepthOutput,
    quantize::{key_price, price_key},
};

/// Current best-known book for one symbol: resting size per price level on
/// each side.
///
/// Prices key on a fixed-point representation (see
/// [`price_key`](crate::quantize::price_key)) so that equality is exact and
/// the sides iterate in price order. Fed by full snapshots (replace) or
/// single-level updates (upsert; `size <= 0` deletes).
#[derive(Debug, Clone, Default)]
pub struct Ladder {
    ts: i64,
    bids: BTreeMap<i64, f64>,
    asks: BTreeMap<i64, f64>,
}

impl Ladder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ts(&self) -> i64 {
        self.ts
    }

    pub fn set_ts(&mut self, ts: i64) {
        self.ts = ts;
    }

    /// Replaces the whole book with the snapshot's levels. Levels with
    /// non-positive size or non-finite fields are discarded.
    pub fn apply_snapshot(&mut self, snapshot: &BookSnapshot) {
        self.ts = snapshot.ts;
        self.bids.clear();
        self.asks.clear();
        for level in &snapshot.bids {
            self.set_level(BookSide::Bid, level.price, level.size);
        }
        for level in &snapshot.asks {
            self.set_level(BookSide::Ask, level.price, level.size);
        }
        debug!(
            symbol = %snapshot.symbol,
            ts = snapshot.ts,
            bids = self.bids.len(),
            asks = self.asks.len(),
            "book snapshot applied"
        );
    }

    /// Upserts or deletes one level.
    pub fn apply_update(&mut self, update: &BookUpdate) {
        self.ts = update.ts;
        self.set_level(update.side, update.price, update.size);
    }

    /// Raw level mutation: `size <= 0` deletes the price level.
    pub fn set_level(&mut self, side: BookSide, price: f64, size: f64) {
        if !price.is_finite() || !size.is_finite() {
            return;
        }
        let book = match side {
            BookSide::Bid => &mut self.bids,
            BookSide::Ask => &mut self.asks,
        };
        let key = price_key(price);
        if size <= 0.0 {
            book.remove(&key);
        } else {
            book.insert(key, size);
        }
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    pub fn best_bid(&self) -> Option<Level> {
        self.bids
            .iter()
            .next_back()
            .map(|(k, s)| Level::new(key_price(*k), *s))
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.asks
            .iter()
            .next()
            .map(|(k, s)| Level::new(key_price(*k), *s))
    }

    pub fn mid(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }

    /// Bid levels, best (highest) first.
    pub fn bid_levels(&self) -> impl Iterator<Item = Level> + '_ {
        self.bids
            .iter()
            .rev()
            .map(|(k, s)| Level::new(key_price(*k), *s))
    }

    /// Ask levels, best (lowest) first.
    pub fn ask_levels(&self) -> impl Iterator<Item = Level> + '_ {
        self.asks
            .iter()
            .map(|(k, s)| Level::new(key_price(*k), *s))
    }

    /// Summed resting size across the best `levels` prices on one side.
    pub fn depth(&self, side: BookSide, levels: usize) -> f64 {
        match side {
            BookSide::Bid => self.bid_levels().take(levels).map(|l| l.size).sum(),
            BookSide::Ask => self.ask_levels().take(levels).map(|l| l.size).sum(),
        }
    }

    pub fn level_counts(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Truncated depth snapshot: at most `max_depth` levels per side.
    pub fn snapshot(&self, max_depth: usize) -> DepthOutput {
        DepthOutput {
            ts: self.ts,
            bids: self.bid_levels().take(max_depth).collect(),
            asks: self.ask_levels().take(max_depth).collect(),
        }
    }
}
