use chrono::NaiveDate;
use fnv::FnvHashMap;
use smol_str::SmolStr;

use crate::{
    event::Trade,
    profile::{max_volume, tied_bins},
    quantize::{bin_of, price_of, TickSizes},
    sequence::{Admission, Sequencer},
    session::utc_day,
    state::{InstrumentKey, KeyedState},
};

/// Session point of control: the tick-binned price level with the greatest
/// accumulated traded volume.
///
/// Ties resolve to the bin nearest the last traded price, then to the highest
/// bin.
#[derive(Debug, Clone)]
pub struct Poc {
    ticks: TickSizes,
    reset_daily: bool,
    reset_on_session_id: bool,
    states: KeyedState<PocState>,
}

#[derive(Debug, Clone)]
struct PocState {
    seq: Sequencer,
    day: Option<NaiveDate>,
    session_id: Option<SmolStr>,
    volumes: FnvHashMap<i64, f64>,
    last_trade_bin: Option<i64>,
    poc_bin: Option<i64>,
}

impl Default for PocState {
    fn default() -> Self {
        Self {
            seq: Sequencer::new(Admission::Monotonic),
            day: None,
            session_id: None,
            volumes: FnvHashMap::default(),
            last_trade_bin: None,
            poc_bin: None,
        }
    }
}

impl PocState {
    fn start_session(&mut self) {
        self.seq.reset();
        self.session_id = None;
        self.volumes.clear();
        self.last_trade_bin = None;
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

    fn choose_poc(&self) -> Option<i64> {
        let max = max_volume(&self.volumes)?;
        let candidates = tied_bins(&self.volumes, max);
        if candidates.len() == 1 {
            return candidates.first().copied();
        }

        // nearest to the last trade, then highest among equal distances
        let pool = match self.last_trade_bin {
            Some(last) => {
                let best = candidates.iter().map(|b| (b - last).abs()).min()?;
                candidates
                    .iter()
                    .filter(|b| (**b - last).abs() == best)
                    .copied()
                    .collect()
            }
            None => candidates,
        };
        pool.into_iter().max()
    }
}

impl Poc {
    pub fn new(ticks: TickSizes, reset_daily: bool, reset_on_session_id: bool) -> Self {
        Self {
            ticks,
            reset_daily,
            reset_on_session_id,
            states: KeyedState::new(),
        }
    }

    /// Accumulates one trade and returns the updated POC price.
    pub fn on_trade(&mut self, trade: &Trade, session_id: Option<&str>) -> Option<f64> {
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

        let bin = bin_of(trade.price, tick);
        *state.volumes.entry(bin).or_insert(0.0) += trade.size;
        state.last_trade_bin = Some(bin);
        state.poc_bin = state.choose_poc();

        state.poc_bin.map(|bin| price_of(bin, tick))
    }

    /// Current POC price for a key without mutating anything.
    pub fn value(&self, key: &InstrumentKey) -> Option<f64> {
        let tick = self.ticks.resolve(&key.symbol);
        self.states
            .get(key)
            .and_then(|s| s.poc_bin)
            .map(|bin| price_of(bin, tick))
    }

    /// Accumulated volume at the current POC.
    pub fn volume_at_poc(&self, key: &InstrumentKey) -> Option<f64> {
        let state = self.states.get(key)?;
        let bin = state.poc_bin?;
        state.volumes.get(&bin).copied()
    }

    pub fn reset(&mut self, key: &InstrumentKey) {
        self.states.remove(key);
    }
}
