use crate::{
    error::IndicatorError,
    event::Bar,
    output::MacdOutput,
    sequence::{Admission, Sequencer},
    smoothing::ema_step,
    state::{InstrumentKey, KeyedState},
};

/// MACD (EMA fast − EMA slow) with an EMA signal line.
///
/// Every EMA is seeded with its first input rather than an averaging window:
/// bar 1 seeds the fast/slow EMAs, bar 2 seeds the signal with the first MACD
/// value, and emission starts on bar 3.
#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    states: KeyedState<MacdState>,
}

#[derive(Debug, Clone)]
struct MacdState {
    seq: Sequencer,
    ema_fast: Option<f64>,
    ema_slow: Option<f64>,
    signal: Option<f64>,
}

impl Default for MacdState {
    fn default() -> Self {
        Self {
            seq: Sequencer::new(Admission::NewerOnly),
            ema_fast: None,
            ema_slow: None,
            signal: None,
        }
    }
}

impl Macd {
    pub const DEFAULT_FAST: usize = 12;
    pub const DEFAULT_SLOW: usize = 26;
    pub const DEFAULT_SIGNAL: usize = 9;

    pub fn new(fast: usize, slow: usize, signal: usize) -> Result<Self, IndicatorError> {
        if fast < 1 {
            return Err(IndicatorError::InvalidPeriod(fast));
        }
        if slow < 1 {
            return Err(IndicatorError::InvalidPeriod(slow));
        }
        if signal < 1 {
            return Err(IndicatorError::InvalidPeriod(signal));
        }
        if fast >= slow {
            return Err(IndicatorError::InvalidMacdPeriods { fast, slow });
        }
        Ok(Self {
            fast,
            slow,
            signal,
            states: KeyedState::new(),
        })
    }

    pub fn on_bar(&mut self, bar: &Bar) -> Option<MacdOutput> {
        let key = InstrumentKey::new(bar.symbol.clone(), bar.tf.clone());
        let (fast, slow, signal_period) = (self.fast, self.slow, self.signal);
        let state = self.states.state(&key);

        if !state.seq.admit(bar.ts) || !bar.close.is_finite() {
            return None;
        }

        if state.ema_fast.is_none() || state.ema_slow.is_none() {
            state.ema_fast = Some(bar.close);
            state.ema_slow = Some(bar.close);
            return None;
        }

        let ema_fast = ema_step(state.ema_fast, bar.close, fast);
        let ema_slow = ema_step(state.ema_slow, bar.close, slow);
        state.ema_fast = Some(ema_fast);
        state.ema_slow = Some(ema_slow);

        let macd = ema_fast - ema_slow;

        let Some(prev_signal) = state.signal else {
            // first MACD value seeds the signal line; emission starts on the
            // next bar
            state.signal = Some(macd);
            return None;
        };

        let signal = ema_step(Some(prev_signal), macd, signal_period);
        state.signal = Some(signal);

        Some(MacdOutput {
            macd,
            signal,
            hist: macd - signal,
        })
    }

    pub fn reset(&mut self, key: &InstrumentKey) {
        self.states.remove(key);
    }
}

impl Default for Macd {
    fn default() -> Self {
        Self {
            fast: Self::DEFAULT_FAST,
            slow: Self::DEFAULT_SLOW,
            signal: Self::DEFAULT_SIGNAL,
            states: KeyedState::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smol_str::SmolStr;

    fn bar(ts: i64, close: f64) -> Bar {
        Bar::new(
            ts,
            SmolStr::new("ES"),
            SmolStr::new("1m"),
            close,
            close,
            close,
            close,
            1.0,
        )
    }

    #[test]
    fn emits_from_third_bar() {
        let mut macd = Macd::default();
        assert_eq!(macd.on_bar(&bar(0, 100.0)), None);
        assert_eq!(macd.on_bar(&bar(60_000, 101.0)), None);
        assert!(macd.on_bar(&bar(120_000, 102.0)).is_some());
    }

    #[test]
    fn histogram_identity_holds() {
        let mut macd = Macd::default();
        let closes = [100.0, 101.5, 99.0, 103.0, 102.0, 104.5, 101.0, 100.25];
        for (i, close) in closes.iter().enumerate() {
            if let Some(out) = macd.on_bar(&bar(i as i64 * 60_000, *close)) {
                assert!(
                    (out.hist - (out.macd - out.signal)).abs() < 1e-9,
                    "hist {} != macd-signal {}",
                    out.hist,
                    out.macd - out.signal
                );
            }
        }
    }

    #[test]
    fn hand_computed_trajectory() {
        // fast 2 (alpha 2/3), slow 4 (alpha 2/5), signal 2 (alpha 2/3)
        let mut macd = Macd::new(2, 4, 2).expect("valid periods");
        assert_eq!(macd.on_bar(&bar(0, 10.0)), None);
        // bar 2: fast = 10 + 2/3*(12-10) = 34/3; slow = 10 + 2/5*2 = 10.8
        // macd = 34/3 - 10.8 seeds the signal
        assert_eq!(macd.on_bar(&bar(1, 12.0)), None);
        let out = macd.on_bar(&bar(2, 11.0)).expect("emits on third bar");

        let fast2 = 34.0 / 3.0;
        let slow2 = 10.8;
        let macd2 = fast2 - slow2;
        let fast3 = fast2 + 2.0 / 3.0 * (11.0 - fast2);
        let slow3 = slow2 + 2.0 / 5.0 * (11.0 - slow2);
        let macd3 = fast3 - slow3;
        let signal3 = macd2 + 2.0 / 3.0 * (macd3 - macd2);

        assert!((out.macd - macd3).abs() < 1e-12);
        assert!((out.signal - signal3).abs() < 1e-12);
        assert!((out.hist - (macd3 - signal3)).abs() < 1e-12);
    }

    #[test]
    fn rejects_inverted_periods() {
        assert!(matches!(
            Macd::new(26, 12, 9),
            Err(IndicatorError::InvalidMacdPeriods { fast: 26, slow: 12 })
        ));
    }

    #[test]
    fn duplicate_timestamp_is_dropped() {
        let mut macd = Macd::default();
        macd.on_bar(&bar(0, 100.0));
        macd.on_bar(&bar(60_000, 101.0));
        let out = macd.on_bar(&bar(120_000, 102.0));
        // same-ts bar must not advance any EMA
        assert_eq!(macd.on_bar(&bar(120_000, 500.0)), None);
        let next = macd.on_bar(&bar(180_000, 102.0));
        assert!(out.is_some() && next.is_some());
    }
}
