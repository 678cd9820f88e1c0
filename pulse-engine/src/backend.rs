//! Accelerated-backend seam for the hybrid dispatch.

use pulse_indicators::{
    event::{BookSnapshot, Trade},
    output::{HeatmapOutput, LiquidityOutput},
};

use crate::error::BackendError;

/// A drop-in, behaviour-equivalent implementation of the four hot-path
/// operations (eg. a native module).
///
/// The engine consults an installed backend first and must be able to fall
/// back to the reference calculators on any `Err` — so for the same input
/// sequence a backend is required to agree with the reference output within
/// floating-point tolerance. Fallback is an explicit branch on the returned
/// `Result`, never unwinding.
pub trait AcceleratedBackend: Send {
    fn vwap(&mut self, trade: &Trade) -> Result<Option<f64>, BackendError>;

    fn cvd(&mut self, trade: &Trade) -> Result<Option<f64>, BackendError>;

    fn liquidity(&mut self, snapshot: &BookSnapshot)
        -> Result<Option<LiquidityOutput>, BackendError>;

    fn heatmap(&mut self, snapshot: &BookSnapshot) -> Result<Option<HeatmapOutput>, BackendError>;
}
