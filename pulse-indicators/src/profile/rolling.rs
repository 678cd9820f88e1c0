use std::collections::VecDeque;

use fnv::FnvHashMap;
use itertools::Itertools;
use smol_str::SmolStr;

use crate::{
    event::{Bar, Trade},
    output::{BucketProfile, PriceVolume},
    profile::{max_volume, tied_bins},
    quantize::{bin_of, price_of, TickSizes},
    sequence::{Admission, Sequencer},
    session::{bucket_start, timeframe_ms},
    state::{InstrumentKey, KeyedState},
};

/// Rolling volume profile: one histogram per fixed time bucket, with bounded
/// retention of the most recent buckets (oldest evicted first).
///
/// Per-bucket POC tie-break is simply the highest price among the max-volume
/// bins — no proximity rule.
#[derive(Debug, Clone)]
pub struct RollingProfile {
    ticks: TickSizes,
    bucket_ms: i64,
    max_buckets: usize,
    states: KeyedState<RollingState>,
}

#[derive(Debug, Clone)]
struct RollingState {
    seq: Sequencer,
    buckets: FnvHashMap<i64, Histogram>,
    order: VecDeque<i64>,
}

impl Default for RollingState {
    fn default() -> Self {
        Self {
            seq: Sequencer::new(Admission::Monotonic),
            buckets: FnvHashMap::default(),
            order: VecDeque::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Histogram {
    volumes: FnvHashMap<i64, f64>,
    total: f64,
}

impl Histogram {
    fn snapshot(&self, bucket: i64, tick: f64) -> BucketProfile {
        let bins = self
            .volumes
            .iter()
            .filter(|(_, v)| **v > 0.0)
            .map(|(bin, v)| PriceVolume {
                price: price_of(*bin, tick),
                volume: *v,
            })
            .sorted_by(|a, b| a.price.total_cmp(&b.price))
            .collect();
        // tie on equal volume: highest bin
        let poc = max_volume(&self.volumes)
            .and_then(|max| tied_bins(&self.volumes, max).into_iter().max())
            .map(|bin| price_of(bin, tick));
        BucketProfile {
            bucket_start: bucket,
            total_volume: self.total,
            poc,
            bins,
        }
    }
}

impl RollingProfile {
    /// `tf` is the bucket duration as a timeframe string (eg. `"1m"`).
    pub fn new(ticks: TickSizes, tf: &str, max_buckets: usize) -> Self {
        Self {
            ticks,
            bucket_ms: timeframe_ms(tf),
            max_buckets: max_buckets.max(1),
            states: KeyedState::new(),
        }
    }

    pub fn bucket_ms(&self) -> i64 {
        self.bucket_ms
    }

    pub fn on_trade(&mut self, trade: &Trade) -> Option<BucketProfile> {
        if !(trade.price.is_finite() && trade.size.is_finite()) || trade.size <= 0.0 {
            return None;
        }
        let key = InstrumentKey::untimed(trade.symbol.clone());
        self.accumulate(&key, &trade.symbol, trade.ts, trade.price, trade.size)
    }

    pub fn on_bar(&mut self, bar: &Bar) -> Option<BucketProfile> {
        let volume = if bar.volume.is_finite() { bar.volume } else { 0.0 };
        if volume <= 0.0 {
            return None;
        }
        if !(bar.high.is_finite() && bar.low.is_finite() && bar.close.is_finite()) {
            return None;
        }
        let key = InstrumentKey::new(bar.symbol.clone(), bar.tf.clone());
        self.accumulate(&key, &bar.symbol, bar.ts, bar.typical_price(), volume)
    }

    fn accumulate(
        &mut self,
        key: &InstrumentKey,
        symbol: &SmolStr,
        ts: i64,
        price: f64,
        volume: f64,
    ) -> Option<BucketProfile> {
        let tick = self.ticks.resolve(symbol);
        let (bucket_ms, max_buckets) = (self.bucket_ms, self.max_buckets);
        let state = self.states.state(key);

        if !state.seq.admit(ts) {
            return None;
        }

        let bucket = bucket_start(ts, bucket_ms);
        if !state.buckets.contains_key(&bucket) {
            state.buckets.insert(bucket, Histogram::default());
            state.order.push_back(bucket);
            while state.order.len() > max_buckets {
                if let Some(evicted) = state.order.pop_front() {
                    state.buckets.remove(&evicted);
                }
            }
        }

        let histogram = state.buckets.get_mut(&bucket)?;
        *histogram.volumes.entry(bin_of(price, tick)).or_insert(0.0) += volume;
        histogram.total += volume;

        Some(histogram.snapshot(bucket, tick))
    }

    /// Snapshot of a retained bucket, if it has not been evicted.
    pub fn bucket(&self, key: &InstrumentKey, bucket_ts: i64) -> Option<BucketProfile> {
        let tick = self.ticks.resolve(&key.symbol);
        self.states
            .get(key)?
            .buckets
            .get(&bucket_ts)
            .map(|h| h.snapshot(bucket_ts, tick))
    }
}
