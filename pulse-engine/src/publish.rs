//! Outbound payloads and the publishing seam to the external transport.

use async_trait::async_trait;
use serde::Serialize;
use smol_str::SmolStr;
use tokio::sync::mpsc;
use tracing::debug;

use pulse_indicators::output::{
    AdxOutput, BucketProfile, DepthOutput, HeatmapOutput, LiquidityOutput, MacdOutput,
    OrderFlowOutput, ProfileOutput,
};

/// Cumulative-delta view of an aggregated order-flow frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlowFrameOutput {
    pub window_ms: i64,
    pub buy: f64,
    pub sell: f64,
    pub delta: f64,
    pub cvd: f64,
}

/// Structured value of one indicator emission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutputValue {
    Scalar(f64),
    Macd(MacdOutput),
    Adx(AdxOutput),
    Profile(ProfileOutput),
    Bucket(BucketProfile),
    Flow(OrderFlowOutput),
    FlowFrame(FlowFrameOutput),
    Liquidity(LiquidityOutput),
    Heatmap(HeatmapOutput),
    Depth(DepthOutput),
}

/// One successful calculator invocation, tagged for routing by the
/// transport: `(symbol, timeframe-or-"-", indicator, ts, value)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    pub symbol: SmolStr,
    pub tf: SmolStr,
    pub indicator: SmolStr,
    pub ts: i64,
    pub value: OutputValue,
}

impl Output {
    pub fn new(
        symbol: SmolStr,
        tf: SmolStr,
        indicator: impl Into<SmolStr>,
        ts: i64,
        value: OutputValue,
    ) -> Self {
        Self {
            symbol,
            tf,
            indicator: indicator.into(),
            ts,
            value,
        }
    }
}

/// External publishing collaborator. The engine hands over every payload and
/// moves on; delivery semantics belong to the transport.
#[async_trait]
pub trait Publisher: Send {
    async fn publish(&mut self, output: Output);
}

/// Publisher backed by an unbounded channel, for embedding and tests.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<Output>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Output>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Publisher for ChannelPublisher {
    async fn publish(&mut self, output: Output) {
        if self.tx.send(output).is_err() {
            debug!("output channel closed; payload dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_output_serializes_flat_value() {
        let output = Output::new(
            SmolStr::new("ES"),
            SmolStr::new("1m"),
            "rsi14",
            1_700_000_000_000,
            OutputValue::Scalar(55.5),
        );
        let json = serde_json::to_value(&output).expect("serializes");
        assert_eq!(json["indicator"], "rsi14");
        assert_eq!(json["value"], 55.5);
    }

    #[test]
    fn structured_output_serializes_nested_object() {
        let output = Output::new(
            SmolStr::new("ES"),
            SmolStr::new("1m"),
            "macd",
            0,
            OutputValue::Macd(MacdOutput {
                macd: 1.0,
                signal: 0.5,
                hist: 0.5,
            }),
        );
        let json = serde_json::to_value(&output).expect("serializes");
        assert_eq!(json["value"]["hist"], 0.5);
    }
}
