use crate::{
    book::Ladder,
    event::{BookSide, BookSnapshot, BookUpdate},
    output::LiquidityOutput,
    sequence::{Admission, Sequencer},
    state::{InstrumentKey, KeyedState},
};

/// Depth and imbalance metrics over the best levels of the book.
///
/// Recomputed on every admitted book mutation. Depth spans the best
/// `depth_levels` prices per side; the top-of-book imbalance uses the same
/// formula restricted to the best `top_k` levels (default 1).
#[derive(Debug, Clone)]
pub struct Liquidity {
    depth_levels: usize,
    top_k: usize,
    states: KeyedState<LiquidityState>,
}

#[derive(Debug, Clone)]
struct LiquidityState {
    seq: Sequencer,
    ladder: Ladder,
}

impl Default for LiquidityState {
    fn default() -> Self {
        Self {
            seq: Sequencer::new(Admission::Monotonic),
            ladder: Ladder::new(),
        }
    }
}

fn imbalance(bids: f64, asks: f64) -> f64 {
    let denom = bids + asks;
    if denom > 0.0 {
        (bids - asks) / denom
    } else {
        0.0
    }
}

impl Liquidity {
    pub const DEFAULT_DEPTH_LEVELS: usize = 10;
    pub const DEFAULT_TOP_K: usize = 1;

    pub fn new(depth_levels: usize, top_k: usize) -> Self {
        Self {
            depth_levels: depth_levels.max(1),
            top_k: top_k.max(1),
            states: KeyedState::new(),
        }
    }

    pub fn on_snapshot(&mut self, snapshot: &BookSnapshot) -> Option<LiquidityOutput> {
        let key = InstrumentKey::untimed(snapshot.symbol.clone());
        let (depth_levels, top_k) = (self.depth_levels, self.top_k);
        let state = self.states.state(&key);

        if !state.seq.admit(snapshot.ts) {
            return None;
        }
        state.ladder.apply_snapshot(snapshot);
        Some(metrics(&state.ladder, depth_levels, top_k))
    }

    pub fn on_update(&mut self, update: &BookUpdate) -> Option<LiquidityOutput> {
        let key = InstrumentKey::untimed(update.symbol.clone());
        let (depth_levels, top_k) = (self.depth_levels, self.top_k);
        let state = self.states.state(&key);

        if !state.seq.admit(update.ts) {
            return None;
        }
        state.ladder.apply_update(update);
        Some(metrics(&state.ladder, depth_levels, top_k))
    }

    /// The maintained book for a symbol, if any events arrived.
    pub fn ladder(&self, key: &InstrumentKey) -> Option<&Ladder> {
        self.states.get(key).map(|s| &s.ladder)
    }

    pub fn reset(&mut self, key: &InstrumentKey) {
        self.states.remove(key);
    }
}

impl Default for Liquidity {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DEPTH_LEVELS, Self::DEFAULT_TOP_K)
    }
}

fn metrics(ladder: &Ladder, depth_levels: usize, top_k: usize) -> LiquidityOutput {
    let bids_depth = ladder.depth(BookSide::Bid, depth_levels);
    let asks_depth = ladder.depth(BookSide::Ask, depth_levels);

    let best_bid = ladder.best_bid();
    let best_ask = ladder.best_ask();

    let top_bids = ladder.depth(BookSide::Bid, top_k);
    let top_asks = ladder.depth(BookSide::Ask, top_k);

    LiquidityOutput {
        bids_depth,
        asks_depth,
        depth_imbalance: imbalance(bids_depth, asks_depth),
        best_bid: best_bid.map(|l| l.price),
        best_ask: best_ask.map(|l| l.price),
        bid_size: best_bid.map(|l| l.size),
        ask_size: best_ask.map(|l| l.size),
        top_imbalance: imbalance(top_bids, top_asks),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;
    use smol_str::SmolStr;

    fn snapshot(ts: i64) -> BookSnapshot {
        BookSnapshot::new(
            ts,
            SmolStr::new("ES"),
            vec![
                Level::new(4999.50, 5.0),
                Level::new(4999.25, 2.0),
                Level::new(4999.00, 1.0),
            ],
            vec![
                Level::new(5000.00, 3.0),
                Level::new(5000.25, 4.0),
                Level::new(5000.50, 2.0),
            ],
        )
    }

    #[test]
    fn depth_and_imbalance_over_best_levels() {
        let mut liq = Liquidity::new(2, 1);
        let out = liq.on_snapshot(&snapshot(1_000)).expect("admitted");

        assert_eq!(out.bids_depth, 7.0);
        assert_eq!(out.asks_depth, 7.0);
        assert!(out.depth_imbalance.abs() < 1e-12);
        assert_eq!(out.best_bid, Some(4999.50));
        assert_eq!(out.best_ask, Some(5000.00));
        assert_eq!(out.bid_size, Some(5.0));
        assert_eq!(out.ask_size, Some(3.0));
        // top-of-book: (5 - 3) / 8
        assert!((out.top_imbalance - 0.25).abs() < 1e-12);
    }

    #[test]
    fn update_shifts_the_imbalance() {
        let mut liq = Liquidity::new(1, 1);
        liq.on_snapshot(&BookSnapshot::new(
            1_000,
            SmolStr::new("ES"),
            vec![Level::new(4999.50, 5.0)],
            vec![Level::new(5000.00, 3.0)],
        ));
        let out = liq
            .on_update(&BookUpdate::new(
                1_500,
                SmolStr::new("ES"),
                BookSide::Ask,
                5000.00,
                10.0,
            ))
            .expect("admitted");

        assert_eq!(out.asks_depth, 10.0);
        assert!((out.depth_imbalance - (5.0 - 10.0) / 15.0).abs() < 1e-12);
        assert!((out.top_imbalance - (-5.0 / 15.0)).abs() < 1e-12);
    }

    #[test]
    fn empty_book_has_zero_imbalance() {
        let mut liq = Liquidity::default();
        let out = liq
            .on_snapshot(&BookSnapshot::new(
                1_000,
                SmolStr::new("ES"),
                Vec::new(),
                Vec::new(),
            ))
            .expect("admitted");
        assert_eq!(out.depth_imbalance, 0.0);
        assert_eq!(out.top_imbalance, 0.0);
        assert_eq!(out.best_bid, None);
        assert_eq!(out.best_ask, None);
    }

    #[test]
    fn stale_book_event_is_dropped() {
        let mut liq = Liquidity::new(2, 1);
        liq.on_snapshot(&snapshot(2_000));
        assert!(liq
            .on_update(&BookUpdate::new(
                1_000,
                SmolStr::new("ES"),
                BookSide::Bid,
                4999.50,
                50.0
            ))
            .is_none());
        // book unchanged
        let key = InstrumentKey::untimed("ES");
        let ladder = liq.ladder(&key).expect("book exists");
        assert_eq!(ladder.best_bid().map(|l| l.size), Some(5.0));
    }

    #[test]
    fn top_k_widens_the_top_imbalance_window() {
        let mut liq = Liquidity::new(3, 2);
        let out = liq.on_snapshot(&snapshot(1_000)).expect("admitted");
        // top 2: bids 7, asks 7
        assert!(out.top_imbalance.abs() < 1e-12);
    }
}
