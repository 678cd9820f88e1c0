//! Price-level aggregation: tick-binned volume histograms and their points
//! of control.
//!
//! The three variants answer different questions and deliberately resolve
//! volume ties differently:
//! - [`Poc`]: session histogram, tie goes to the bin nearest the last trade,
//!   then the highest bin;
//! - [`SessionProfile`]: developing POC, tie goes to the most-recently
//!   updated bin, then the highest;
//! - [`RollingProfile`]: per-time-bucket histograms, tie simply goes to the
//!   highest bin.
//!
//! The rules are preserved exactly as documented conventions; they are not
//! re-derived.

mod poc;
mod rolling;
mod session;

pub use poc::Poc;
pub use rolling::RollingProfile;
pub use session::{BarMode, SessionProfile};

use fnv::FnvHashMap;

/// Maximum accumulated volume across bins; `None` for an empty histogram.
fn max_volume(volumes: &FnvHashMap<i64, f64>) -> Option<f64> {
    volumes.values().copied().fold(None, |acc, v| {
        Some(match acc {
            None => v,
            Some(max) => max.max(v),
        })
    })
}

/// Bins holding exactly the maximum volume.
fn tied_bins(volumes: &FnvHashMap<i64, f64>, max: f64) -> Vec<i64> {
    volumes
        .iter()
        .filter(|(_, v)| **v == max)
        .map(|(bin, _)| *bin)
        .collect()
}
