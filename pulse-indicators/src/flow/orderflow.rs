use chrono::NaiveDate;
use smol_str::SmolStr;

use crate::{
    event::Trade,
    flow::{classify_aggressor, Direction},
    output::OrderFlowOutput,
    sequence::{Admission, Sequencer},
    session::utc_day,
    state::{InstrumentKey, KeyedState},
};

/// Aggressor order flow: separate buy/sell volume totals plus their delta,
/// with the latest best bid/ask tracked for classification.
///
/// Quotes arrive through [`OrderFlow::on_quote`]; trades accumulate through
/// [`OrderFlow::on_trade`]. Totals reset on the UTC-day roll and optionally
/// when an explicit session id changes.
#[derive(Debug, Clone)]
pub struct OrderFlow {
    reset_daily: bool,
    reset_on_session_id: bool,
    states: KeyedState<FlowState>,
}

#[derive(Debug, Clone)]
struct FlowState {
    seq: Sequencer,
    day: Option<NaiveDate>,
    session_id: Option<SmolStr>,
    bid: Option<f64>,
    ask: Option<f64>,
    buy: f64,
    sell: f64,
    last_price: Option<f64>,
    last_dir: Direction,
}

impl Default for FlowState {
    fn default() -> Self {
        Self {
            seq: Sequencer::new(Admission::Monotonic),
            day: None,
            session_id: None,
            bid: None,
            ask: None,
            buy: 0.0,
            sell: 0.0,
            last_price: None,
            last_dir: Direction::Unset,
        }
    }
}

impl FlowState {
    fn start_session(&mut self) {
        self.seq.reset();
        self.session_id = None;
        self.bid = None;
        self.ask = None;
        self.buy = 0.0;
        self.sell = 0.0;
        self.last_price = None;
        self.last_dir = Direction::Unset;
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

    fn snapshot(&self) -> OrderFlowOutput {
        OrderFlowOutput {
            delta: self.buy - self.sell,
            buy: self.buy,
            sell: self.sell,
            bid: self.bid,
            ask: self.ask,
        }
    }
}

impl OrderFlow {
    pub fn new(reset_daily: bool, reset_on_session_id: bool) -> Self {
        Self {
            reset_daily,
            reset_on_session_id,
            states: KeyedState::new(),
        }
    }

    /// Updates the tracked best bid/ask for a symbol.
    pub fn on_quote(
        &mut self,
        symbol: &SmolStr,
        ts: i64,
        bid: Option<f64>,
        ask: Option<f64>,
        session_id: Option<&str>,
    ) -> Option<OrderFlowOutput> {
        let key = InstrumentKey::untimed(symbol.clone());
        let (daily, by_sid) = (self.reset_daily, self.reset_on_session_id);
        let state = self.states.state(&key);

        state.roll(ts, session_id, daily, by_sid);
        if !state.seq.admit(ts) {
            return None;
        }

        state.bid = bid.filter(|b| b.is_finite());
        state.ask = ask.filter(|a| a.is_finite());
        Some(state.snapshot())
    }

    /// Accumulates one trade into the buy/sell totals.
    pub fn on_trade(&mut self, trade: &Trade, session_id: Option<&str>) -> Option<OrderFlowOutput> {
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

        let dir = classify_aggressor(
            trade.price,
            trade.side,
            state.bid,
            state.ask,
            state.last_price,
            state.last_dir,
        );
        match dir {
            Direction::Buy => state.buy += trade.size,
            Direction::Sell => state.sell += trade.size,
            Direction::Unset => {}
        }

        if state.last_price.map_or(true, |p| p != trade.price) && dir != Direction::Unset {
            state.last_dir = dir;
        }
        state.last_price = Some(trade.price);

        Some(state.snapshot())
    }

    /// Latest totals for a key without mutating anything.
    pub fn snapshot(&self, key: &InstrumentKey) -> Option<OrderFlowOutput> {
        self.states.get(key).map(FlowState::snapshot)
    }

    pub fn reset(&mut self, key: &InstrumentKey) {
        self.states.remove(key);
    }
}

impl Default for OrderFlow {
    fn default() -> Self {
        Self::new(true, false)
    }
}
