use crate::{
    error::IndicatorError,
    event::Bar,
    output::AdxOutput,
    sequence::{Admission, Sequencer},
    state::{InstrumentKey, KeyedState},
};

/// Wilder ADX with +DI/−DI.
///
/// Two-phase warm-up: the first `period` post-seed bars accumulate simple
/// TR/±DM sums that seed the Wilder-smoothed series, then the first `period`
/// DX values are averaged to seed the ADX itself. From there every component
/// follows the Wilder recurrences. All outputs are clamped to `[0, 100]` to
/// absorb float drift.
#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    states: KeyedState<AdxState>,
}

#[derive(Debug, Clone, Copy)]
struct Smoothed {
    tr: f64,
    plus: f64,
    minus: f64,
}

#[derive(Debug, Clone)]
struct AdxState {
    seq: Sequencer,
    /// Previous bar's (high, low, close).
    prev: Option<(f64, f64, f64)>,
    tr_sum: f64,
    plus_sum: f64,
    minus_sum: f64,
    seed_count: usize,
    smoothed: Option<Smoothed>,
    dx_buf: Vec<f64>,
    adx: Option<f64>,
}

impl Default for AdxState {
    fn default() -> Self {
        Self {
            seq: Sequencer::new(Admission::NewerOnly),
            prev: None,
            tr_sum: 0.0,
            plus_sum: 0.0,
            minus_sum: 0.0,
            seed_count: 0,
            smoothed: None,
            dx_buf: Vec::new(),
            adx: None,
        }
    }
}

fn clamp_pct(x: f64) -> f64 {
    x.clamp(0.0, 100.0)
}

fn calc_di(sm: Smoothed) -> (f64, f64) {
    if sm.tr <= 0.0 {
        return (0.0, 0.0);
    }
    (
        clamp_pct(100.0 * sm.plus / sm.tr),
        clamp_pct(100.0 * sm.minus / sm.tr),
    )
}

fn calc_dx(plus_di: f64, minus_di: f64) -> f64 {
    let denom = plus_di + minus_di;
    if denom <= 0.0 {
        return 0.0;
    }
    clamp_pct(100.0 * (plus_di - minus_di).abs() / denom)
}

impl Adx {
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

    pub fn on_bar(&mut self, bar: &Bar) -> Option<AdxOutput> {
        let key = InstrumentKey::new(bar.symbol.clone(), bar.tf.clone());
        let period = self.period;
        let state = self.states.state(&key);

        if !state.seq.admit(bar.ts) {
            return None;
        }
        let (h, l, c) = (bar.high, bar.low, bar.close);
        if !(h.is_finite() && l.is_finite() && c.is_finite()) {
            return None;
        }

        let Some((ph, pl, pc)) = state.prev else {
            state.prev = Some((h, l, c));
            return None;
        };
        state.prev = Some((h, l, c));

        let up = h - ph;
        let down = pl - l;
        let plus_dm = if up > 0.0 && up > down { up } else { 0.0 };
        let minus_dm = if down > 0.0 && down > up { down } else { 0.0 };
        let tr = (h - l).max((h - pc).abs()).max((l - pc).abs());

        let n = period as f64;

        let Some(mut sm) = state.smoothed else {
            // phase 1: simple sums seed the smoothed series
            state.tr_sum += tr;
            state.plus_sum += plus_dm;
            state.minus_sum += minus_dm;
            state.seed_count += 1;
            if state.seed_count < period {
                return None;
            }
            let sm = Smoothed {
                tr: state.tr_sum / n,
                plus: state.plus_sum / n,
                minus: state.minus_sum / n,
            };
            state.smoothed = Some(sm);
            let (plus_di, minus_di) = calc_di(sm);
            state.dx_buf.push(calc_dx(plus_di, minus_di));
            return None;
        };

        // Wilder sum-smoothing: prev - prev/n + x
        sm.tr = sm.tr - sm.tr / n + tr;
        sm.plus = sm.plus - sm.plus / n + plus_dm;
        sm.minus = sm.minus - sm.minus / n + minus_dm;
        state.smoothed = Some(sm);

        let (plus_di, minus_di) = calc_di(sm);
        let dx = calc_dx(plus_di, minus_di);

        let adx = match state.adx {
            None => {
                // phase 2: average the first `period` DX values
                state.dx_buf.push(dx);
                if state.dx_buf.len() < period {
                    return None;
                }
                let adx = clamp_pct(state.dx_buf.iter().sum::<f64>() / n);
                state.dx_buf = Vec::new();
                adx
            }
            Some(prev) => clamp_pct((prev * (n - 1.0) + dx) / n),
        };
        state.adx = Some(adx);

        Some(AdxOutput {
            plus_di,
            minus_di,
            dx,
            adx,
        })
    }

    pub fn reset(&mut self, key: &InstrumentKey) {
        self.states.remove(key);
    }
}

impl Default for Adx {
    fn default() -> Self {
        Self {
            period: Self::DEFAULT_PERIOD,
            states: KeyedState::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smol_str::SmolStr;

    fn bar(ts: i64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(
            ts,
            SmolStr::new("ES"),
            SmolStr::new("1m"),
            close,
            high,
            low,
            close,
            1.0,
        )
    }

    /// Steadily rising bars: +DM positive every bar, −DM always zero.
    fn rising(i: i64) -> Bar {
        let base = 100.0 + i as f64;
        bar(i * 60_000, base + 1.0, base, base + 0.5)
    }

    #[test]
    fn first_emission_after_two_warmup_phases() {
        // seed bar + period sum bars + (period - 1) dx bars = 2 * period
        let period = 3;
        let mut adx = Adx::new(period).expect("valid period");
        for i in 0..(2 * period as i64) - 1 {
            assert_eq!(adx.on_bar(&rising(i)), None, "bar {i} should warm up");
        }
        assert!(adx.on_bar(&rising(2 * period as i64 - 1)).is_some());
    }

    #[test]
    fn trending_market_pushes_plus_di_above_minus_di() {
        let mut adx = Adx::new(3).expect("valid period");
        let mut last = None;
        for i in 0..10 {
            if let Some(out) = adx.on_bar(&rising(i)) {
                last = Some(out);
            }
        }
        let out = last.expect("emitted");
        assert!(out.plus_di > out.minus_di);
        assert_eq!(out.minus_di, 0.0);
        // pure one-directional movement drives DX to 100
        assert!((out.dx - 100.0).abs() < 1e-9);
    }

    #[test]
    fn all_components_stay_in_bounds() {
        let mut adx = Adx::new(3).expect("valid period");
        let highs = [101.0, 103.0, 99.5, 104.0, 98.0, 105.5, 97.0, 106.0, 102.0, 103.5];
        for (i, high) in highs.iter().enumerate() {
            let low = high - 3.0;
            let close = high - 1.0;
            if let Some(out) = adx.on_bar(&bar(i as i64 * 60_000, *high, low, close)) {
                for v in [out.plus_di, out.minus_di, out.dx, out.adx] {
                    assert!((0.0..=100.0).contains(&v), "out of bounds: {v}");
                }
            }
        }
    }

    #[test]
    fn stale_bar_leaves_trajectory_unchanged() {
        let mut with_stale = Adx::new(3).expect("valid period");
        let mut without = Adx::new(3).expect("valid period");

        let mut a = None;
        let mut b = None;
        for i in 0..8 {
            a = with_stale.on_bar(&rising(i));
            if i == 4 {
                assert_eq!(with_stale.on_bar(&rising(1)), None);
            }
            b = without.on_bar(&rising(i));
        }
        assert_eq!(a, b);
    }

    #[test]
    fn flat_bars_emit_zero_dx() {
        let mut adx = Adx::new(2).expect("valid period");
        let mut last = None;
        for i in 0..6 {
            last = adx.on_bar(&bar(i * 60_000, 100.0, 100.0, 100.0));
        }
        // TR is zero throughout: DI cannot be computed, DX defaults to 0
        let out = last.expect("emitted after warmup");
        assert_eq!(out.plus_di, 0.0);
        assert_eq!(out.minus_di, 0.0);
        assert_eq!(out.dx, 0.0);
        assert_eq!(out.adx, 0.0);
    }
}
