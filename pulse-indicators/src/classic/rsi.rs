use crate::{
    error::IndicatorError,
    event::Bar,
    sequence::{Admission, Sequencer, Warmup},
    smoothing::rma_step,
    state::{InstrumentKey, KeyedState},
};

/// Wilder RSI over bar closes.
///
/// The smoothed averages are seeded with the first raw gain/loss (RMA seed =
/// first value) and need `period + 1` bars before the first emission: one
/// seed bar plus `period` changes.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    states: KeyedState<RsiState>,
}

#[derive(Debug, Clone)]
struct RsiState {
    seq: Sequencer,
    warmup: Warmup,
    prev_close: Option<f64>,
    avg_gain: Option<f64>,
    avg_loss: Option<f64>,
}

impl RsiState {
    fn new(period: usize) -> Self {
        Self {
            seq: Sequencer::new(Admission::NewerOnly),
            warmup: Warmup::new(period + 1),
            prev_close: None,
            avg_gain: None,
            avg_loss: None,
        }
    }
}

impl Rsi {
    pub const DEFAULT_PERIOD: usize = 14;

    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        if period < 1 {
            return Err(IndicatorError::InvalidPeriod(period));
        }
        Ok(Self {
            period,
            states: KeyedState::new(),
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Processes one bar for its (symbol, tf) key. `None` while warming up or
    /// when the bar is stale/malformed.
    pub fn on_bar(&mut self, bar: &Bar) -> Option<f64> {
        let key = InstrumentKey::new(bar.symbol.clone(), bar.tf.clone());
        let period = self.period;
        let state = self.states.state_with(&key, || RsiState::new(period));

        if !state.seq.admit(bar.ts) || !bar.close.is_finite() {
            return None;
        }

        let Some(prev) = state.prev_close else {
            state.prev_close = Some(bar.close);
            state.warmup.tick();
            return None;
        };

        let change = bar.close - prev;
        state.prev_close = Some(bar.close);
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };

        state.avg_gain = Some(rma_step(state.avg_gain, gain, period));
        state.avg_loss = Some(rma_step(state.avg_loss, loss, period));

        if state.warmup.tick() {
            return None;
        }

        let avg_gain = state.avg_gain.unwrap_or(0.0);
        let avg_loss = state.avg_loss.unwrap_or(0.0);
        if avg_loss == 0.0 {
            // No losses in the window: saturated if anything was gained,
            // neutral on a flat series.
            return Some(if avg_gain > 0.0 { 100.0 } else { 50.0 });
        }

        let rs = avg_gain / avg_loss;
        Some((100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0))
    }

    /// Discards all state for `key`.
    pub fn reset(&mut self, key: &InstrumentKey) {
        self.states.remove(key);
    }
}

impl Default for Rsi {
    fn default() -> Self {
        Self {
            period: Self::DEFAULT_PERIOD,
            states: KeyedState::new(),
        }
    }
}
