//! Trade-flow indicators: VWAP variants, cumulative volume delta and
//! aggressor-classified order flow.

mod cvd;
mod orderflow;
mod vwap;

pub use cvd::Cvd;
pub use orderflow::OrderFlow;
pub use vwap::{Vwap, VwapBar};

use crate::event::Side;

/// Inferred trade direction. `Unset` marks a trade that could not be
/// classified; it accumulates nothing but preserves existing memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Buy,
    Sell,
    #[default]
    Unset,
}

impl From<Side> for Direction {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => Direction::Buy,
            Side::Sell => Direction::Sell,
        }
    }
}

/// Classifies a trade as buy- or sell-initiated.
///
/// Priority order:
/// 1. an explicit `side` on the trade;
/// 2. quote cross: `price >= ask` is a buy, `price <= bid` a sell;
/// 3. strictly inside the spread: the nearest side wins, an exact tie is a
///    buy (stable convention, not a derived fact);
/// 4. no usable quote: tick rule against the last traded price, an unchanged
///    price reuses the remembered direction;
/// 5. no reference at all: buy, seeding the direction memory.
pub fn classify_aggressor(
    price: f64,
    side: Option<Side>,
    bid: Option<f64>,
    ask: Option<f64>,
    last_price: Option<f64>,
    last_dir: Direction,
) -> Direction {
    if let Some(side) = side {
        return side.into();
    }
    if let Some(ask) = ask {
        if price >= ask {
            return Direction::Buy;
        }
    }
    if let Some(bid) = bid {
        if price <= bid {
            return Direction::Sell;
        }
    }
    if let (Some(bid), Some(ask)) = (bid, ask) {
        // strictly inside the spread
        let to_ask = (ask - price).abs();
        let to_bid = (price - bid).abs();
        return if to_ask <= to_bid {
            Direction::Buy
        } else {
            Direction::Sell
        };
    }
    if let Some(last) = last_price {
        if price > last {
            return Direction::Buy;
        }
        if price < last {
            return Direction::Sell;
        }
        return last_dir;
    }
    Direction::Buy
}
