use chrono::NaiveDate;
use fnv::FnvHashMap;
use itertools::Itertools;
use smol_str::SmolStr;

use crate::{
    event::{Bar, Trade},
    output::{PriceVolume, ProfileOutput},
    profile::{max_volume, tied_bins},
    quantize::{bin_of, price_of, TickSizes},
    sequence::{Admission, Sequencer},
    session::utc_day,
    state::{InstrumentKey, KeyedState},
};

/// Which bar price receives the bar's volume when no trade feed exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarMode {
    /// `(H + L + C) / 3`.
    #[default]
    Typical,
    Close,
}

/// Session volume profile with a developing point of control.
///
/// The developing-POC tie-break differs from [`crate::profile::Poc`]: on
/// equal maximum volume the most-recently-updated bin wins, then the highest
/// bin.
#[derive(Debug, Clone)]
pub struct SessionProfile {
    ticks: TickSizes,
    bar_mode: BarMode,
    top_n: usize,
    reset_daily: bool,
    reset_on_session_id: bool,
    states: KeyedState<SvpState>,
}

#[derive(Debug, Clone)]
struct SvpState {
    seq: Sequencer,
    day: Option<NaiveDate>,
    session_id: Option<SmolStr>,
    volumes: FnvHashMap<i64, f64>,
    total: f64,
    last_update_bin: Option<i64>,
    poc_bin: Option<i64>,
}

impl Default for SvpState {
    fn default() -> Self {
        Self {
            seq: Sequencer::new(Admission::Monotonic),
            day: None,
            session_id: None,
            volumes: FnvHashMap::default(),
            total: 0.0,
            last_update_bin: None,
            poc_bin: None,
        }
    }
}

impl SvpState {
    fn start_session(&mut self) {
        self.seq.reset();
        self.session_id = None;
        self.volumes.clear();
        self.total = 0.0;
        self.last_update_bin = None;
        self.poc_bin = None;
    }

    fn roll(
        &mut self,
        ts: i64,
        session_id: Option<&str>,
        reset_daily: bool,
        reset_on_session_id: bool,
    ) {
        if reset_daily {
            let day = utc_day(ts);
            if self.day.is_some_and(|d| d != day) {
                self.start_session();
            }
            self.day = Some(day);
        }
        if reset_on_session_id {
            if let Some(sid) = session_id {
                if self.session_id.as_deref().is_some_and(|s| s != sid) {
                    let day = self.day;
                    self.start_session();
                    self.day = day;
                }
                self.session_id = Some(SmolStr::new(sid));
            }
        }
    }

    /// Developing POC: most-recently-updated bin among the tied set, else the
    /// highest bin.
    fn choose_poc(&self) -> Option<i64> {
        let max = max_volume(&self.volumes)?;
        let candidates = tied_bins(&self.volumes, max);
        if candidates.len() == 1 {
            return candidates.first().copied();
        }
        if let Some(last) = self.last_update_bin {
            if candidates.contains(&last) {
                return Some(last);
            }
        }
        candidates.into_iter().max()
    }

    fn accumulate(&mut self, bin: i64, volume: f64) {
        *self.volumes.entry(bin).or_insert(0.0) += volume;
        self.total += volume;
        self.last_update_bin = Some(bin);
        self.poc_bin = self.choose_poc();
    }

    fn snapshot(&self, tick: f64) -> ProfileOutput {
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
        ProfileOutput {
            poc: self.poc_bin.map(|bin| price_of(bin, tick)),
            total_volume: self.total,
            bins,
        }
    }
}

impl SessionProfile {
    pub fn new(
        ticks: TickSizes,
        bar_mode: BarMode,
        top_n: usize,
        reset_daily: bool,
        reset_on_session_id: bool,
    ) -> Self {
        Self {
            ticks,
            bar_mode,
            top_n,
            reset_daily,
            reset_on_session_id,
            states: KeyedState::new(),
        }
    }

    pub fn on_trade(&mut self, trade: &Trade, session_id: Option<&str>) -> Option<ProfileOutput> {
        if !(trade.price.is_finite() && trade.size.is_finite()) || trade.size <= 0.0 {
            return None;
        }
        let tick = self.ticks.resolve(&trade.symbol);
        let key = InstrumentKey::untimed(trade.symbol.clone());
        let (daily, by_sid) = (self.reset_daily, self.reset_on_session_id);
        let state = self.states.state(&key);

        state.roll(trade.ts, session_id, daily, by_sid);
        if !state.seq.admit(trade.ts) {
            return None;
        }

        state.accumulate(bin_of(trade.price, tick), trade.size);
        Some(state.snapshot(tick))
    }

    pub fn on_bar(&mut self, bar: &Bar) -> Option<ProfileOutput> {
        let volume = if bar.volume.is_finite() { bar.volume } else { 0.0 };
        if volume <= 0.0 {
            return None;
        }
        let price = match self.bar_mode {
            BarMode::Close => bar.close,
            BarMode::Typical => {
                if !(bar.high.is_finite() && bar.low.is_finite()) {
                    return None;
                }
                bar.typical_price()
            }
        };
        if !price.is_finite() {
            return None;
        }

        let tick = self.ticks.resolve(&bar.symbol);
        let key = InstrumentKey::new(bar.symbol.clone(), bar.tf.clone());
        let (daily, by_sid) = (self.reset_daily, self.reset_on_session_id);
        let state = self.states.state(&key);

        state.roll(bar.ts, None, daily, by_sid);
        if !state.seq.admit(bar.ts) {
            return None;
        }

        state.accumulate(bin_of(price, tick), volume);
        Some(state.snapshot(tick))
    }

    /// Full profile for a key without mutating anything.
    pub fn profile(&self, key: &InstrumentKey) -> Option<ProfileOutput> {
        let tick = self.ticks.resolve(&key.symbol);
        self.states.get(key).map(|s| s.snapshot(tick))
    }

    /// The configured `top_n` bins by volume, descending. `top_n == 0`
    /// returns every bin.
    pub fn top(&self, key: &InstrumentKey) -> Vec<PriceVolume> {
        let Some(profile) = self.profile(key) else {
            return Vec::new();
        };
        let sorted = profile
            .bins
            .into_iter()
            .sorted_by(|a, b| b.volume.total_cmp(&a.volume));
        match self.top_n {
            0 => sorted.collect(),
            n => sorted.take(n).collect(),
        }
    }

    pub fn reset(&mut self, key: &InstrumentKey) {
        self.states.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MS_PER_DAY;

    const TS0: i64 = 1_700_000_000_000;

    fn svp() -> SessionProfile {
        SessionProfile::new(
            TickSizes::new(0.25).expect("valid tick"),
            BarMode::Typical,
            10,
            true,
            false,
        )
    }

    fn trade(ts: i64, price: f64, size: f64) -> Trade {
        Trade::new(ts, SmolStr::new("ES"), price, size, None, None)
    }

    #[test]
    fn bins_sorted_ascending_with_totals() {
        let mut profile = svp();
        profile.on_trade(&trade(TS0, 100.5, 1.0), None);
        profile.on_trade(&trade(TS0 + 1, 100.0, 2.0), None);
        let out = profile.on_trade(&trade(TS0 + 2, 100.25, 3.0), None).expect("admitted");

        assert_eq!(out.total_volume, 6.0);
        let prices: Vec<f64> = out.bins.iter().map(|b| b.price).collect();
        assert_eq!(prices, vec![100.0, 100.25, 100.5]);
        assert_eq!(out.poc, Some(100.25));
    }

    #[test]
    fn developing_poc_prefers_most_recent_update() {
        let mut profile = svp();
        profile.on_trade(&trade(TS0, 100.25, 2.0), None);
        // ties 100.0 with 100.25; 100.0 updated most recently
        let out = profile.on_trade(&trade(TS0 + 1, 100.0, 2.0), None).expect("admitted");
        assert_eq!(out.poc, Some(100.0));
    }

    #[test]
    fn tie_without_recent_candidate_takes_highest() {
        let mut profile = svp();
        profile.on_trade(&trade(TS0, 100.0, 2.0), None);
        profile.on_trade(&trade(TS0 + 1, 100.5, 2.0), None);
        // last update goes to a non-tied bin
        let out = profile.on_trade(&trade(TS0 + 2, 100.25, 1.0), None).expect("admitted");
        assert_eq!(out.poc, Some(100.5));
    }

    #[test]
    fn top_view_is_descending_by_volume() {
        let mut profile = svp();
        profile.on_trade(&trade(TS0, 100.0, 1.0), None);
        profile.on_trade(&trade(TS0 + 1, 100.25, 5.0), None);
        profile.on_trade(&trade(TS0 + 2, 100.5, 3.0), None);

        let top = profile.top(&InstrumentKey::untimed("ES"));
        let volumes: Vec<f64> = top.iter().map(|b| b.volume).collect();
        assert_eq!(volumes, vec![5.0, 3.0, 1.0]);
    }

    #[test]
    fn bar_feed_bins_typical_price() {
        let mut profile = svp();
        let bar = Bar::new(
            TS0,
            SmolStr::new("ES"),
            SmolStr::new("1m"),
            100.0,
            100.5,
            100.0,
            100.25,
            9.0,
        );
        let out = profile.on_bar(&bar).expect("bar volume accumulated");
        // typical = (100.5 + 100.0 + 100.25) / 3 = 100.25
        assert_eq!(out.poc, Some(100.25));
        assert_eq!(out.total_volume, 9.0);
    }

    #[test]
    fn day_roll_empties_profile() {
        let mut profile = svp();
        profile.on_trade(&trade(TS0, 100.0, 50.0), None);
        let out = profile
            .on_trade(&trade(TS0 + MS_PER_DAY, 101.0, 1.0), None)
            .expect("admitted");
        assert_eq!(out.total_volume, 1.0);
        assert_eq!(out.bins.len(), 1);
    }
}
