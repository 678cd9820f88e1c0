use std::collections::HashMap;

use serde::Deserialize;
use smol_str::SmolStr;

use pulse_indicators::{
    error::IndicatorError,
    quantize::TickSizes,
};

/// Complete configuration surface of the engine. Loading it from disk (or
/// anywhere else) is the embedder's job; defaults match the historical
/// deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default price quantization unit.
    pub tick_size: f64,
    /// Per-symbol tick-size overrides.
    pub tick_overrides: HashMap<SmolStr, f64>,

    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub adx_period: usize,

    /// Book levels per side summed into the depth metrics.
    pub depth_levels: usize,
    /// Levels per side in the top-of-book imbalance.
    pub top_k: usize,
    /// Levels per side in the emitted depth snapshot.
    pub max_depth: usize,

    pub heatmap_bucket_ms: i64,
    /// Optional cap on heatmap levels per side of the mid.
    pub heatmap_max_prices: Option<usize>,

    /// Rolling volume-profile bucket duration as a timeframe string.
    pub profile_tf: SmolStr,
    pub profile_max_buckets: usize,

    /// Bins returned by the session-profile top view (0 = all).
    pub svp_top_n: usize,

    /// Reset session-scoped accumulators at the UTC-day boundary.
    pub reset_daily: bool,
    /// Also reset when an explicit session id changes.
    pub reset_on_session_id: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_size: 0.01,
            tick_overrides: HashMap::new(),
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            adx_period: 14,
            depth_levels: 10,
            top_k: 1,
            max_depth: 10,
            heatmap_bucket_ms: 1_000,
            heatmap_max_prices: None,
            profile_tf: SmolStr::new("1m"),
            profile_max_buckets: 5,
            svp_top_n: 10,
            reset_daily: true,
            reset_on_session_id: false,
        }
    }
}

impl EngineConfig {
    /// Resolved per-symbol tick sizes.
    pub fn tick_sizes(&self) -> Result<TickSizes, IndicatorError> {
        let mut ticks = TickSizes::new(self.tick_size)?;
        for (symbol, tick) in &self.tick_overrides {
            ticks = ticks.with_override(symbol.clone(), *tick)?;
        }
        Ok(ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize_from_empty_object() {
        let cfg: EngineConfig = serde_json::from_str("{}").expect("valid config");
        assert_eq!(cfg.rsi_period, 14);
        assert_eq!(cfg.heatmap_bucket_ms, 1_000);
        assert!(cfg.reset_daily);
    }

    #[test]
    fn overrides_reach_the_tick_resolver() {
        let cfg: EngineConfig = serde_json::from_str(
            r#"{"tick_size": 0.01, "tick_overrides": {"ES": 0.25}}"#,
        )
        .expect("valid config");
        let ticks = cfg.tick_sizes().expect("valid ticks");
        assert_eq!(ticks.resolve("ES"), 0.25);
        assert_eq!(ticks.resolve("AAPL"), 0.01);
    }

    #[test]
    fn invalid_tick_surfaces_as_error() {
        let cfg = EngineConfig {
            tick_size: 0.0,
            ..Default::default()
        };
        assert!(cfg.tick_sizes().is_err());
    }
}
