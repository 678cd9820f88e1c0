use chrono::NaiveDate;

use crate::{
    event::Trade,
    flow::{classify_aggressor, Direction},
    sequence::{Admission, Sequencer},
    session::utc_day,
    state::{InstrumentKey, KeyedState},
};

/// Cumulative volume delta: running `Σ(±size)` with the sign taken from the
/// aggressor classification (see [`classify_aggressor`]).
///
/// Remembers the last traded price and direction per key so the tick rule can
/// resolve trades without quote context. Resets at the UTC-day boundary by
/// default.
#[derive(Debug, Clone)]
pub struct Cvd {
    reset_daily: bool,
    states: KeyedState<CvdState>,
}

#[derive(Debug, Clone)]
struct CvdState {
    seq: Sequencer,
    day: Option<NaiveDate>,
    last_price: Option<f64>,
    last_dir: Direction,
    cum: f64,
}

impl Default for CvdState {
    fn default() -> Self {
        Self {
            seq: Sequencer::new(Admission::Monotonic),
            day: None,
            last_price: None,
            last_dir: Direction::Unset,
            cum: 0.0,
        }
    }
}

impl Cvd {
    pub fn new(reset_daily: bool) -> Self {
        Self {
            reset_daily,
            states: KeyedState::new(),
        }
    }

    /// Processes one trade, optionally with the prevailing best bid/ask for
    /// aggressor inference. Returns the updated running delta.
    pub fn on_trade(
        &mut self,
        trade: &Trade,
        bid: Option<f64>,
        ask: Option<f64>,
    ) -> Option<f64> {
        if !(trade.price.is_finite() && trade.size.is_finite()) {
            return None;
        }
        let key = InstrumentKey::untimed(trade.symbol.clone());
        let reset_daily = self.reset_daily;
        let state = self.states.state(&key);

        if reset_daily {
            let day = utc_day(trade.ts);
            if state.day.is_some_and(|d| d != day) {
                state.seq.reset();
                state.last_price = None;
                state.last_dir = Direction::Unset;
                state.cum = 0.0;
            }
            state.day = Some(day);
        }

        if !state.seq.admit(trade.ts) {
            return None;
        }

        let dir = classify_aggressor(
            trade.price,
            trade.side,
            bid,
            ask,
            state.last_price,
            state.last_dir,
        );
        match dir {
            Direction::Buy => state.cum += trade.size,
            Direction::Sell => state.cum -= trade.size,
            Direction::Unset => {}
        }

        // direction memory advances only on a price change; a repeat price
        // keeps the previous direction
        if state.last_price.map_or(true, |p| p != trade.price) && dir != Direction::Unset {
            state.last_dir = dir;
        }
        state.last_price = Some(trade.price);

        Some(state.cum)
    }

    /// Running delta for a key; 0 before any trade.
    pub fn value(&self, key: &InstrumentKey) -> f64 {
        self.states.get(key).map_or(0.0, |s| s.cum)
    }

    pub fn reset(&mut self, key: &InstrumentKey) {
        self.states.remove(key);
    }
}

impl Default for Cvd {
    fn default() -> Self {
        Self::new(true)
    }
}
