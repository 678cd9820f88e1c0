//! Deterministic price quantization.
//!
//! Continuous prices are binned into integer tick indices so that volume
//! histograms and book levels key on exact integers rather than floats. The
//! reverse mapping re-rounds at a fixed epsilon (1e-10) to absorb binary
//! float error, eg. `7 * 0.25` printing as `1.7500000000000002`.

use fnv::FnvHashMap;
use smol_str::SmolStr;

use crate::error::IndicatorError;

/// Rounds at the fixed 1e-10 quantization epsilon.
pub fn round10(x: f64) -> f64 {
    (x * 1e10).round() / 1e10
}

/// Integer tick index of `price` for the given tick size.
pub fn bin_of(price: f64, tick: f64) -> i64 {
    (price / tick).round() as i64
}

/// Price of an integer tick index.
pub fn price_of(bin: i64, tick: f64) -> f64 {
    round10(bin as f64 * tick)
}

/// Quantizes `price` to the nearest multiple of `tick`. A non-positive tick
/// leaves the price untouched.
pub fn round_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    round10((price / tick).round() * tick)
}

/// Fixed-point key for exact price comparison in book maps (nano-price
/// resolution, covering every venue tick size in practice).
pub fn price_key(price: f64) -> i64 {
    (price * 1e9).round() as i64
}

/// Price represented by a fixed-point book key.
pub fn key_price(key: i64) -> f64 {
    round10(key as f64 * 1e-9)
}

/// Tick size per symbol: a default plus explicit overrides.
#[derive(Debug, Clone)]
pub struct TickSizes {
    default: f64,
    overrides: FnvHashMap<SmolStr, f64>,
}

impl TickSizes {
    pub fn new(default: f64) -> Result<Self, IndicatorError> {
        if default <= 0.0 || !default.is_finite() {
            return Err(IndicatorError::InvalidTickSize(default));
        }
        Ok(Self {
            default,
            overrides: FnvHashMap::default(),
        })
    }

    pub fn with_override(
        mut self,
        symbol: impl Into<SmolStr>,
        tick: f64,
    ) -> Result<Self, IndicatorError> {
        if tick <= 0.0 || !tick.is_finite() {
            return Err(IndicatorError::InvalidTickSize(tick));
        }
        self.overrides.insert(symbol.into(), tick);
        Ok(self)
    }

    pub fn resolve(&self, symbol: &str) -> f64 {
        self.overrides.get(symbol).copied().unwrap_or(self.default)
    }
}

impl Default for TickSizes {
    fn default() -> Self {
        Self {
            default: 0.01,
            overrides: FnvHashMap::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binning_is_deterministic() {
        let tick = 0.25;
        assert_eq!(bin_of(100.0, tick), 400);
        assert_eq!(bin_of(100.25, tick), 401);
        // values just off a tick land on the nearest bin
        assert_eq!(bin_of(100.2499999, tick), 401);
        assert_eq!(price_of(401, tick), 100.25);
    }

    #[test]
    fn round_to_tick_absorbs_float_error() {
        assert_eq!(round_to_tick(1.7500000000000002, 0.25), 1.75);
        assert_eq!(round_to_tick(100.13, 0.25), 100.25);
        assert_eq!(round_to_tick(100.12, 0.25), 100.0);
        // non-positive tick is a no-op
        assert_eq!(round_to_tick(100.13, 0.0), 100.13);
    }

    #[test]
    fn price_keys_round_trip() {
        for price in [0.00012345, 1.75, 4999.5, 100.125] {
            assert_eq!(key_price(price_key(price)), price);
        }
    }

    #[test]
    fn tick_sizes_resolve_overrides() {
        let ticks = TickSizes::new(0.01)
            .and_then(|t| t.with_override("ES", 0.25))
            .expect("valid ticks");
        assert_eq!(ticks.resolve("ES"), 0.25);
        assert_eq!(ticks.resolve("AAPL"), 0.01);
    }

    #[test]
    fn rejects_non_positive_tick() {
        assert!(TickSizes::new(0.0).is_err());
        assert!(TickSizes::new(-0.25).is_err());
        assert!(TickSizes::new(f64::NAN).is_err());
    }
}
