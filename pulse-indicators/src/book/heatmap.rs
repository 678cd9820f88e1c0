use fnv::{FnvHashMap, FnvHashSet};
use itertools::Itertools;

use crate::{
    book::Ladder,
    event::{BookSnapshot, BookUpdate},
    output::{HeatmapOutput, HeatmapRow},
    quantize::{price_key, round_to_tick, TickSizes},
    sequence::{Admission, Sequencer},
    state::{InstrumentKey, KeyedState},
};

/// Price×time liquidity heatmap.
///
/// Maintains the current book with prices quantized to the symbol tick, and
/// per fixed time bucket records the maximum resting size seen at every
/// level. A new bucket clears the accumulator before recording. Each admitted
/// event emits one sparse frame; `max_prices` optionally caps the frame to
/// the largest levels per side of the mid.
#[derive(Debug, Clone)]
pub struct Heatmap {
    ticks: TickSizes,
    bucket_ms: i64,
    max_prices: Option<usize>,
    states: KeyedState<HeatmapState>,
}

#[derive(Debug, Clone)]
struct HeatmapState {
    seq: Sequencer,
    ladder: Ladder,
    bucket: Option<i64>,
    /// price-key -> max size observed within the current bucket.
    acc: FnvHashMap<i64, f64>,
}

impl Default for HeatmapState {
    fn default() -> Self {
        Self {
            seq: Sequencer::new(Admission::Monotonic),
            ladder: Ladder::new(),
            bucket: None,
            acc: FnvHashMap::default(),
        }
    }
}

impl HeatmapState {
    fn touch_bucket(&mut self, ts: i64, bucket_ms: i64) {
        let bucket = if bucket_ms > 0 {
            ts.div_euclid(bucket_ms) * bucket_ms
        } else {
            ts
        };
        match self.bucket {
            Some(current) if current == bucket => {}
            Some(_) => {
                self.acc.clear();
                self.bucket = Some(bucket);
            }
            None => self.bucket = Some(bucket),
        }
    }

    /// Folds every currently-resting level into the bucket accumulator,
    /// keeping the maximum size per price.
    fn record_book(&mut self, max_prices: Option<usize>) {
        for level in self.ladder.bid_levels().chain(self.ladder.ask_levels()) {
            let entry = self.acc.entry(price_key(level.price)).or_insert(0.0);
            if level.size > *entry {
                *entry = level.size;
            }
        }

        let Some(cap) = max_prices.filter(|n| *n > 0) else {
            return;
        };
        let Some(mid) = self.ladder.mid() else {
            return;
        };
        let mid_key = price_key(mid);

        // keep the top `cap` levels per side of the mid, by size
        let (bid_side, ask_side): (Vec<(i64, f64)>, Vec<(i64, f64)>) = self
            .acc
            .iter()
            .map(|(k, v)| (*k, *v))
            .partition(|(k, _)| *k <= mid_key);
        let keep: FnvHashSet<i64> = bid_side
            .into_iter()
            .sorted_by(|a, b| b.1.total_cmp(&a.1))
            .take(cap)
            .chain(
                ask_side
                    .into_iter()
                    .sorted_by(|a, b| b.1.total_cmp(&a.1))
                    .take(cap),
            )
            .map(|(k, _)| k)
            .collect();
        self.acc.retain(|k, _| keep.contains(k));
    }

    fn frame(&self, tick: f64, bucket_ms: i64) -> HeatmapOutput {
        let bucket_start = self.bucket.unwrap_or(0);
        let rows = self
            .acc
            .iter()
            .sorted_by_key(|(k, _)| **k)
            .map(|(k, size)| HeatmapRow(bucket_start, crate::quantize::key_price(*k), *size))
            .collect();
        HeatmapOutput {
            bucket_start,
            bucket_ms,
            tick_size: tick,
            rows,
        }
    }
}

impl Heatmap {
    pub const DEFAULT_BUCKET_MS: i64 = 1_000;

    pub fn new(ticks: TickSizes, bucket_ms: i64, max_prices: Option<usize>) -> Self {
        Self {
            ticks,
            bucket_ms: bucket_ms.max(1),
            max_prices,
            states: KeyedState::new(),
        }
    }

    pub fn on_snapshot(&mut self, snapshot: &BookSnapshot) -> Option<HeatmapOutput> {
        if snapshot.ts <= 0 {
            return None;
        }
        let tick = self.ticks.resolve(&snapshot.symbol);
        let key = InstrumentKey::untimed(snapshot.symbol.clone());
        let (bucket_ms, max_prices) = (self.bucket_ms, self.max_prices);
        let state = self.states.state(&key);

        if !state.seq.admit(snapshot.ts) {
            return None;
        }

        state.ladder.clear();
        state.ladder.set_ts(snapshot.ts);
        for level in snapshot.bids.iter().filter(|l| l.size > 0.0) {
            state.ladder.set_level(
                crate::event::BookSide::Bid,
                round_to_tick(level.price, tick),
                level.size,
            );
        }
        for level in snapshot.asks.iter().filter(|l| l.size > 0.0) {
            state.ladder.set_level(
                crate::event::BookSide::Ask,
                round_to_tick(level.price, tick),
                level.size,
            );
        }

        state.touch_bucket(snapshot.ts, bucket_ms);
        state.record_book(max_prices);
        Some(state.frame(tick, bucket_ms))
    }

    pub fn on_update(&mut self, update: &BookUpdate) -> Option<HeatmapOutput> {
        if update.ts <= 0 || !update.price.is_finite() || !update.size.is_finite() {
            return None;
        }
        let tick = self.ticks.resolve(&update.symbol);
        let key = InstrumentKey::untimed(update.symbol.clone());
        let (bucket_ms, max_prices) = (self.bucket_ms, self.max_prices);
        let state = self.states.state(&key);

        if !state.seq.admit(update.ts) {
            return None;
        }

        state.touch_bucket(update.ts, bucket_ms);
        state.ladder.set_ts(update.ts);
        state
            .ladder
            .set_level(update.side, round_to_tick(update.price, tick), update.size);
        state.record_book(max_prices);
        Some(state.frame(tick, bucket_ms))
    }

    pub fn reset(&mut self, key: &InstrumentKey) {
        self.states.remove(key);
    }
}
