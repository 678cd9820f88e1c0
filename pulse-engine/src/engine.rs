//! Event routing from typed/raw market events to the calculators.

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use tokio::sync::mpsc;
use tracing::warn;

use pulse_indicators::{
    book::{Heatmap, Liquidity},
    classic::{Adx, Macd, Rsi},
    error::IndicatorError,
    event::{Bar, BookSnapshot, BookUpdate, Trade},
    flow::{Cvd, OrderFlow, Vwap, VwapBar},
    profile::{BarMode, Poc, RollingProfile, SessionProfile},
    state::InstrumentKey,
};

use crate::{
    backend::AcceleratedBackend,
    config::EngineConfig,
    error::ParseError,
    parse,
    publish::{FlowFrameOutput, Output, OutputValue, Publisher},
};

/// Best-bid/ask update for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ts: i64,
    pub symbol: SmolStr,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

/// Aggregated order-flow window produced by an upstream aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowFrame {
    pub ts: i64,
    pub symbol: SmolStr,
    pub window_ms: i64,
    pub buy: f64,
    pub sell: f64,
    pub delta: f64,
}

/// Inbound event, routed by kind. The routing table is fixed here at
/// construction time — calculators are never probed per event.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Bar(Bar),
    Trade(Trade),
    Quote(Quote),
    BookSnapshot(BookSnapshot),
    BookUpdate(BookUpdate),
    FlowFrame(FlowFrame),
}

/// Owns one instance of every calculator and fans inbound events out to
/// them, collecting the resulting payloads.
///
/// Updates run to completion with no internal suspension; hosts dispatching
/// from multiple threads must keep all events of a key on one worker.
pub struct IndicatorEngine {
    max_depth: usize,
    rsi: Rsi,
    macd: Macd,
    adx: Adx,
    vwap: Vwap,
    vwap_bar: VwapBar,
    cvd: Cvd,
    orderflow: OrderFlow,
    poc: Poc,
    svp: SessionProfile,
    rolling: RollingProfile,
    liquidity: Liquidity,
    heatmap: Heatmap,
    /// Latest best bid/ask per symbol, fed by quotes and consumed by the CVD
    /// aggressor classification.
    bbo: FnvHashMap<SmolStr, (Option<f64>, Option<f64>)>,
    /// Running CVD accumulated from aggregated flow frames, per symbol.
    frame_cvd: FnvHashMap<SmolStr, f64>,
    backend: Option<Box<dyn AcceleratedBackend>>,
    rsi_name: SmolStr,
    adx_name: SmolStr,
}

const NO_TF: &str = "-";

impl IndicatorEngine {
    pub fn new(config: EngineConfig) -> Result<Self, IndicatorError> {
        let ticks = config.tick_sizes()?;
        Ok(Self {
            max_depth: config.max_depth,
            rsi: Rsi::new(config.rsi_period)?,
            macd: Macd::new(config.macd_fast, config.macd_slow, config.macd_signal)?,
            adx: Adx::new(config.adx_period)?,
            vwap: Vwap::new(config.reset_daily, config.reset_on_session_id),
            vwap_bar: VwapBar::new(),
            cvd: Cvd::new(config.reset_daily),
            orderflow: OrderFlow::new(config.reset_daily, config.reset_on_session_id),
            poc: Poc::new(ticks.clone(), config.reset_daily, config.reset_on_session_id),
            svp: SessionProfile::new(
                ticks.clone(),
                BarMode::Typical,
                config.svp_top_n,
                config.reset_daily,
                config.reset_on_session_id,
            ),
            rolling: RollingProfile::new(
                ticks.clone(),
                &config.profile_tf,
                config.profile_max_buckets,
            ),
            liquidity: Liquidity::new(config.depth_levels, config.top_k),
            heatmap: Heatmap::new(ticks, config.heatmap_bucket_ms, config.heatmap_max_prices),
            bbo: FnvHashMap::default(),
            frame_cvd: FnvHashMap::default(),
            backend: None,
            rsi_name: SmolStr::new(format!("rsi{}", config.rsi_period)),
            adx_name: SmolStr::new(format!("adx{}", config.adx_period)),
        })
    }

    /// Installs an accelerated backend; it is consulted first for VWAP, CVD,
    /// liquidity and heatmap, with the reference calculators as fallback.
    pub fn with_backend(mut self, backend: Box<dyn AcceleratedBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn on_event(&mut self, event: &MarketEvent) -> Vec<Output> {
        match event {
            MarketEvent::Bar(bar) => self.on_bar(bar),
            MarketEvent::Trade(trade) => self.on_trade(trade),
            MarketEvent::Quote(quote) => self.on_quote(quote),
            MarketEvent::BookSnapshot(snapshot) => self.on_book_snapshot(snapshot),
            MarketEvent::BookUpdate(update) => self.on_book_update(update),
            MarketEvent::FlowFrame(frame) => self.on_flow_frame(frame),
        }
    }

    pub fn on_bar(&mut self, bar: &Bar) -> Vec<Output> {
        let mut outputs = Vec::new();

        if let Some(value) = self.rsi.on_bar(bar) {
            outputs.push(Output::new(
                bar.symbol.clone(),
                bar.tf.clone(),
                self.rsi_name.clone(),
                bar.ts,
                OutputValue::Scalar(value),
            ));
        }
        if let Some(value) = self.macd.on_bar(bar) {
            outputs.push(Output::new(
                bar.symbol.clone(),
                bar.tf.clone(),
                "macd",
                bar.ts,
                OutputValue::Macd(value),
            ));
        }
        if let Some(value) = self.adx.on_bar(bar) {
            outputs.push(Output::new(
                bar.symbol.clone(),
                bar.tf.clone(),
                self.adx_name.clone(),
                bar.ts,
                OutputValue::Adx(value),
            ));
        }
        if let Some(value) = self.svp.on_bar(bar) {
            outputs.push(Output::new(
                bar.symbol.clone(),
                bar.tf.clone(),
                "svp",
                bar.ts,
                OutputValue::Profile(value),
            ));
        }
        if let Some(value) = self.rolling.on_bar(bar) {
            outputs.push(Output::new(
                bar.symbol.clone(),
                bar.tf.clone(),
                "volume_profile",
                bar.ts,
                OutputValue::Bucket(value),
            ));
        }
        if let Some(value) = self.vwap_bar.on_bar(bar) {
            outputs.push(Output::new(
                bar.symbol.clone(),
                bar.tf.clone(),
                "vwap_bar",
                bar.ts,
                OutputValue::Scalar(value),
            ));
        }

        outputs
    }

    pub fn on_trade(&mut self, trade: &Trade) -> Vec<Output> {
        let mut outputs = Vec::new();
        let (bid, ask) = self
            .bbo
            .get(&trade.symbol)
            .copied()
            .unwrap_or((None, None));

        // the reference calculators always run so their state stays valid for
        // fallback; an installed backend merely supplies the emitted value
        let vwap_reference = self.vwap.on_trade(trade, None);
        let vwap = match self.backend.as_mut() {
            Some(backend) => match backend.vwap(trade) {
                Ok(value) => value,
                Err(error) => {
                    warn!(%error, symbol = %trade.symbol, "accelerated vwap failed, using reference calculator");
                    vwap_reference
                }
            },
            None => vwap_reference,
        };
        if let Some(value) = vwap {
            outputs.push(Output::new(
                trade.symbol.clone(),
                SmolStr::new(NO_TF),
                "vwap",
                trade.ts,
                OutputValue::Scalar(value),
            ));
        }

        let cvd_reference = self.cvd.on_trade(trade, bid, ask);
        let cvd = match self.backend.as_mut() {
            Some(backend) => match backend.cvd(trade) {
                Ok(value) => value,
                Err(error) => {
                    warn!(%error, symbol = %trade.symbol, "accelerated cvd failed, using reference calculator");
                    cvd_reference
                }
            },
            None => cvd_reference,
        };
        if let Some(value) = cvd {
            outputs.push(Output::new(
                trade.symbol.clone(),
                SmolStr::new(NO_TF),
                "cvd",
                trade.ts,
                OutputValue::Scalar(value),
            ));
        }

        if let Some(value) = self.orderflow.on_trade(trade, None) {
            outputs.push(Output::new(
                trade.symbol.clone(),
                SmolStr::new(NO_TF),
                "orderflow",
                trade.ts,
                OutputValue::Flow(value),
            ));
        }
        if let Some(value) = self.poc.on_trade(trade, None) {
            outputs.push(Output::new(
                trade.symbol.clone(),
                SmolStr::new(NO_TF),
                "poc",
                trade.ts,
                OutputValue::Scalar(value),
            ));
        }

        outputs
    }

    /// Quotes update classification context; they emit nothing themselves.
    pub fn on_quote(&mut self, quote: &Quote) -> Vec<Output> {
        self.bbo
            .insert(quote.symbol.clone(), (quote.bid, quote.ask));
        self.orderflow
            .on_quote(&quote.symbol, quote.ts, quote.bid, quote.ask, None);
        Vec::new()
    }

    pub fn on_book_snapshot(&mut self, snapshot: &BookSnapshot) -> Vec<Output> {
        let mut outputs = Vec::new();

        let liquidity_reference = self.liquidity.on_snapshot(snapshot);
        let liquidity = match self.backend.as_mut() {
            Some(backend) => match backend.liquidity(snapshot) {
                Ok(value) => value,
                Err(error) => {
                    warn!(%error, symbol = %snapshot.symbol, "accelerated liquidity failed, using reference calculator");
                    liquidity_reference
                }
            },
            None => liquidity_reference,
        };
        if let Some(value) = liquidity {
            outputs.push(Output::new(
                snapshot.symbol.clone(),
                SmolStr::new(NO_TF),
                "liquidity",
                snapshot.ts,
                OutputValue::Liquidity(value),
            ));
        }

        let heatmap_reference = self.heatmap.on_snapshot(snapshot);
        let heatmap = match self.backend.as_mut() {
            Some(backend) => match backend.heatmap(snapshot) {
                Ok(value) => value,
                Err(error) => {
                    warn!(%error, symbol = %snapshot.symbol, "accelerated heatmap failed, using reference calculator");
                    heatmap_reference
                }
            },
            None => heatmap_reference,
        };
        if let Some(value) = heatmap {
            outputs.push(Output::new(
                snapshot.symbol.clone(),
                SmolStr::new(NO_TF),
                "heatmap",
                snapshot.ts,
                OutputValue::Heatmap(value),
            ));
        }

        if let Some(value) = self.depth_snapshot(&snapshot.symbol, liquidity_reference.is_some()) {
            outputs.push(Output::new(
                snapshot.symbol.clone(),
                SmolStr::new(NO_TF),
                "depth",
                snapshot.ts,
                OutputValue::Depth(value),
            ));
        }

        outputs
    }

    pub fn on_book_update(&mut self, update: &BookUpdate) -> Vec<Output> {
        let mut outputs = Vec::new();

        // single-level updates have no accelerated counterpart; reference only
        let liquidity = self.liquidity.on_update(update);
        if let Some(value) = liquidity {
            outputs.push(Output::new(
                update.symbol.clone(),
                SmolStr::new(NO_TF),
                "liquidity",
                update.ts,
                OutputValue::Liquidity(value),
            ));
        }
        if let Some(value) = self.heatmap.on_update(update) {
            outputs.push(Output::new(
                update.symbol.clone(),
                SmolStr::new(NO_TF),
                "heatmap",
                update.ts,
                OutputValue::Heatmap(value),
            ));
        }
        if let Some(value) = self.depth_snapshot(&update.symbol, liquidity.is_some()) {
            outputs.push(Output::new(
                update.symbol.clone(),
                SmolStr::new(NO_TF),
                "depth",
                update.ts,
                OutputValue::Depth(value),
            ));
        }

        outputs
    }

    pub fn on_flow_frame(&mut self, frame: &FlowFrame) -> Vec<Output> {
        let cvd = {
            let entry = self.frame_cvd.entry(frame.symbol.clone()).or_insert(0.0);
            *entry += frame.delta;
            *entry
        };
        vec![Output::new(
            frame.symbol.clone(),
            SmolStr::new(NO_TF),
            "oflow",
            frame.ts,
            OutputValue::FlowFrame(FlowFrameOutput {
                window_ms: frame.window_ms,
                buy: frame.buy,
                sell: frame.sell,
                delta: frame.delta,
                cvd,
            }),
        )]
    }

    fn depth_snapshot(&self, symbol: &SmolStr, admitted: bool) -> Option<pulse_indicators::output::DepthOutput> {
        if !admitted {
            return None;
        }
        let key = InstrumentKey::untimed(symbol.clone());
        self.liquidity
            .ladder(&key)
            .map(|ladder| ladder.snapshot(self.max_depth))
    }

    /// Raw-bar hook: malformed bars are logged and skipped, never surfaced.
    pub fn on_raw_bar(&mut self, raw: &Value) -> Vec<Output> {
        match parse::parse_bar(raw) {
            Ok(bar) => self.on_bar(&bar),
            Err(error) => {
                warn!(%error, "malformed bar skipped");
                Vec::new()
            }
        }
    }

    /// Raw-trade hook; aggregated `oflow_frame` payloads that arrive on the
    /// trade subject are redirected to the frame path.
    pub fn on_raw_trade(&mut self, raw: &Value) -> Vec<Output> {
        if raw.get("type").and_then(Value::as_str) == Some("oflow_frame") {
            return match parse::parse_flow_frame(raw) {
                Ok(frame) => self.on_flow_frame(&frame),
                Err(error) => {
                    warn!(%error, "malformed flow frame skipped");
                    Vec::new()
                }
            };
        }
        match parse::parse_trade(raw) {
            Ok(trade) => self.on_trade(&trade),
            Err(error) => {
                warn!(%error, "malformed trade skipped");
                Vec::new()
            }
        }
    }

    /// Raw-book hook. A malformed message is skipped like any other, but a
    /// shape matching none of the historically-supported book encodings is a
    /// contract break and is returned to the caller.
    pub fn on_raw_book(&mut self, raw: &Value) -> Result<Vec<Output>, ParseError> {
        if parse::is_book_update(raw) {
            return match parse::parse_book_update(raw) {
                Ok(update) => Ok(self.on_book_update(&update)),
                Err(error) => {
                    warn!(%error, "malformed book update skipped");
                    Ok(Vec::new())
                }
            };
        }
        match parse::parse_book_snapshot(raw) {
            Ok(snapshot) => Ok(self.on_book_snapshot(&snapshot)),
            Err(ParseError::UnknownBookShape) => Err(ParseError::UnknownBookShape),
            Err(error) => {
                warn!(%error, "malformed book skipped");
                Ok(Vec::new())
            }
        }
    }
}

/// Drives an engine from an inbound event channel, handing every payload to
/// the publisher. The transport owns both ends: it decodes into
/// [`MarketEvent`]s upstream and delivers [`Output`]s downstream.
pub async fn run<P: Publisher>(
    mut engine: IndicatorEngine,
    mut events: mpsc::UnboundedReceiver<MarketEvent>,
    mut publisher: P,
) {
    while let Some(event) = events.recv().await {
        for output in engine.on_event(&event) {
            publisher.publish(output).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> IndicatorEngine {
        let config = EngineConfig {
            tick_overrides: [(SmolStr::new("ES"), 0.25)].into_iter().collect(),
            ..Default::default()
        };
        IndicatorEngine::new(config).expect("valid config")
    }

    #[test]
    fn trade_fans_out_to_flow_indicators() {
        let mut engine = engine();
        let outputs = engine.on_raw_trade(&json!({
            "ts": 1_700_000_000_000_i64,
            "price": 100.0,
            "size": 2.0,
            "symbol": "ES",
            "side": "BUY"
        }));

        let names: Vec<&str> = outputs.iter().map(|o| o.indicator.as_str()).collect();
        assert_eq!(names, vec!["vwap", "cvd", "orderflow", "poc"]);
        assert!(outputs.iter().all(|o| o.tf == "-"));
    }

    #[test]
    fn malformed_trade_is_skipped_silently() {
        let mut engine = engine();
        assert!(engine.on_raw_trade(&json!({"ts": 1, "symbol": "ES"})).is_empty());
        assert!(engine.on_raw_trade(&json!({"ts": 2, "price": "abc", "size": 1, "symbol": "ES"})).is_empty());
    }

    #[test]
    fn unknown_book_shape_surfaces_to_caller() {
        let mut engine = engine();
        let result = engine.on_raw_book(&json!({"ts": 1_000, "symbol": "ES"}));
        assert_eq!(result, Err(ParseError::UnknownBookShape));
    }

    #[test]
    fn book_snapshot_emits_liquidity_heatmap_depth() {
        let mut engine = engine();
        let outputs = engine
            .on_raw_book(&json!({
                "ts": 1_700_000_000_000_i64,
                "symbol": "ES",
                "bids": [[4999.50, 5.0]],
                "asks": [[5000.00, 3.0]]
            }))
            .expect("recognized shape");
        let names: Vec<&str> = outputs.iter().map(|o| o.indicator.as_str()).collect();
        assert_eq!(names, vec!["liquidity", "heatmap", "depth"]);
    }

    #[test]
    fn quote_primes_cvd_classification() {
        let mut engine = engine();
        engine.on_quote(&Quote {
            ts: 1_700_000_000_000,
            symbol: SmolStr::new("ES"),
            bid: Some(99.99),
            ask: Some(100.0),
        });
        let outputs = engine.on_raw_trade(&json!({
            "ts": 1_700_000_000_001_i64,
            "price": 100.0,
            "size": 2.0,
            "symbol": "ES"
        }));
        let cvd = outputs
            .iter()
            .find(|o| o.indicator == "cvd")
            .expect("cvd emitted");
        // price crossed the ask => +2
        assert_eq!(cvd.value, OutputValue::Scalar(2.0));
    }

    #[test]
    fn flow_frames_accumulate_cvd() {
        let mut engine = engine();
        let first = engine.on_raw_trade(&json!({
            "type": "oflow_frame", "symbol": "SPY",
            "ts": 1_760_123_113_372_i64, "windowMs": 5_000,
            "buy": 10.0, "sell": 4.0, "delta": 6.0
        }));
        let second = engine.on_raw_trade(&json!({
            "type": "oflow_frame", "symbol": "SPY",
            "ts": 1_760_123_118_372_i64, "windowMs": 5_000,
            "buy": 1.0, "sell": 3.0, "delta": -2.0
        }));

        let get_cvd = |outputs: &[Output]| match &outputs[0].value {
            OutputValue::FlowFrame(frame) => frame.cvd,
            other => panic!("unexpected value {other:?}"),
        };
        assert_eq!(get_cvd(&first), 6.0);
        assert_eq!(get_cvd(&second), 4.0);
    }

    #[test]
    fn bar_outputs_carry_the_bar_timeframe() {
        let mut engine = engine();
        let outputs = engine.on_raw_bar(&json!({
            "ts": 1_700_000_000_000_i64, "symbol": "ES", "tf": "1m",
            "open": 100.0, "high": 101.0, "low": 99.0, "close": 100.5,
            "volume": 12.0
        }));
        // RSI/MACD/ADX warm up, but the volume-driven indicators emit at once
        let names: Vec<&str> = outputs.iter().map(|o| o.indicator.as_str()).collect();
        assert_eq!(names, vec!["svp", "volume_profile", "vwap_bar"]);
        assert!(outputs.iter().all(|o| o.tf == "1m"));
    }
}
