use smol_str::SmolStr;

use crate::{
    event::{Bar, Trade},
    sequence::{Admission, Sequencer},
    session::utc_day,
    state::{InstrumentKey, KeyedState},
};

/// Session-cumulative volume-weighted average price.
///
/// Keeps `Σ(price·size)` and `Σ(size)` per key; both reset when the UTC-day
/// session key rolls (and optionally on an explicit session-id change).
/// Emits `pv / v` once any volume has accumulated.
#[derive(Debug, Clone)]
pub struct Vwap {
    reset_daily: bool,
    reset_on_session_id: bool,
    states: KeyedState<VwapState>,
}

#[derive(Debug, Clone)]
struct VwapState {
    seq: Sequencer,
    day: Option<chrono::NaiveDate>,
    session_id: Option<SmolStr>,
    pv_sum: f64,
    v_sum: f64,
}

impl Default for VwapState {
    fn default() -> Self {
        Self {
            seq: Sequencer::new(Admission::Monotonic),
            day: None,
            session_id: None,
            pv_sum: 0.0,
            v_sum: 0.0,
        }
    }
}

impl VwapState {
    /// Zeroes the accumulators and re-opens admission; the session roll also
    /// forgets the previous explicit session id.
    fn start_session(&mut self) {
        self.pv_sum = 0.0;
        self.v_sum = 0.0;
        self.seq.reset();
        self.session_id = None;
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

    fn value(&self) -> Option<f64> {
        (self.v_sum > 0.0).then(|| self.pv_sum / self.v_sum)
    }
}

impl Vwap {
    pub fn new(reset_daily: bool, reset_on_session_id: bool) -> Self {
        Self {
            reset_daily,
            reset_on_session_id,
            states: KeyedState::new(),
        }
    }

    pub fn on_trade(&mut self, trade: &Trade, session_id: Option<&str>) -> Option<f64> {
        if !(trade.price.is_finite() && trade.size.is_finite()) || trade.size <= 0.0 {
            return None;
        }
        let key = InstrumentKey::untimed(trade.symbol.clone());
        let (daily, by_sid) = (self.reset_daily, self.reset_on_session_id);
        let state = self.states.state(&key);

        state.roll(trade.ts, session_id, daily, by_sid);
        if !state.seq.admit(trade.ts) {
            return None;
        }

        state.pv_sum += trade.price * trade.size;
        state.v_sum += trade.size;
        state.value()
    }

    /// Bar fallback when no trade feed exists: typical price × bar volume.
    pub fn on_bar(&mut self, bar: &Bar) -> Option<f64> {
        if !(bar.high.is_finite() && bar.low.is_finite() && bar.close.is_finite()) {
            return None;
        }
        let key = InstrumentKey::new(bar.symbol.clone(), bar.tf.clone());
        let (daily, by_sid) = (self.reset_daily, self.reset_on_session_id);
        let state = self.states.state(&key);

        state.roll(bar.ts, None, daily, by_sid);
        if !state.seq.admit(bar.ts) {
            return None;
        }

        let volume = if bar.volume.is_finite() { bar.volume } else { 0.0 };
        state.pv_sum += bar.typical_price() * volume;
        state.v_sum += volume;
        state.value()
    }

    /// Latest VWAP for a key without mutating anything.
    pub fn value(&self, key: &InstrumentKey) -> Option<f64> {
        self.states.get(key).and_then(VwapState::value)
    }

    pub fn reset(&mut self, key: &InstrumentKey) {
        self.states.remove(key);
    }
}

impl Default for Vwap {
    fn default() -> Self {
        Self::new(true, false)
    }
}

/// Per-bar VWAP: accumulators reset whenever the bar timestamp changes, so
/// the emitted value is the VWAP of the current bar only.
#[derive(Debug, Clone, Default)]
pub struct VwapBar {
    states: KeyedState<VwapBarState>,
}

#[derive(Debug, Clone, Default)]
struct VwapBarState {
    current_ts: Option<i64>,
    tpv_sum: f64,
    v_sum: f64,
}

impl VwapBar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_bar(&mut self, bar: &Bar) -> Option<f64> {
        let key = InstrumentKey::new(bar.symbol.clone(), bar.tf.clone());
        let state = self.states.state(&key);

        if state.current_ts != Some(bar.ts) {
            state.current_ts = Some(bar.ts);
            state.tpv_sum = 0.0;
            state.v_sum = 0.0;
        }

        if !(bar.high.is_finite() && bar.low.is_finite() && bar.close.is_finite()) {
            return None;
        }
        let volume = if bar.volume.is_finite() { bar.volume } else { 0.0 };

        state.tpv_sum += bar.typical_price() * volume;
        state.v_sum += volume;
        (state.v_sum > 0.0).then(|| state.tpv_sum / state.v_sum)
    }
}
