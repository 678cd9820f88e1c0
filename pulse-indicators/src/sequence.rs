//! Shared temporal-admission and warm-up contract.

/// How a calculator treats an event whose timestamp equals the last admitted
/// one. Fixed per calculator type at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Reject `ts <= last_ts`. Bar streams: one bar per (symbol, tf, ts),
    /// no same-timestamp overwrite.
    NewerOnly,
    /// Reject only `ts < last_ts`. Trade/book streams: several events per
    /// millisecond are normal.
    Monotonic,
}

/// Per-key admission gate. Out-of-order events are dropped, never buffered or
/// reordered.
#[derive(Debug, Clone)]
pub struct Sequencer {
    admission: Admission,
    last_ts: Option<i64>,
}

impl Sequencer {
    pub fn new(admission: Admission) -> Self {
        Self {
            admission,
            last_ts: None,
        }
    }

    /// Returns false (and leaves the gate unchanged) if the event must be
    /// dropped; otherwise records `ts` as the new high-water mark.
    pub fn admit(&mut self, ts: i64) -> bool {
        if let Some(last) = self.last_ts {
            let stale = match self.admission {
                Admission::NewerOnly => ts <= last,
                Admission::Monotonic => ts < last,
            };
            if stale {
                return false;
            }
        }
        self.last_ts = Some(ts);
        true
    }

    /// Re-opens admission. Called when a session roll discards accumulated
    /// state, matching the original engine's behaviour of clearing the
    /// high-water mark together with the accumulators.
    pub fn reset(&mut self) {
        self.last_ts = None;
    }

    pub fn last_ts(&self) -> Option<i64> {
        self.last_ts
    }
}

/// Counts qualifying events until a calculator may emit its first value.
#[derive(Debug, Clone)]
pub struct Warmup {
    need: usize,
    seen: usize,
}

impl Warmup {
    pub fn new(need: usize) -> Self {
        Self { need, seen: 0 }
    }

    /// Registers one qualifying event; true while still warming up.
    pub fn tick(&mut self) -> bool {
        self.seen = self.seen.saturating_add(1);
        self.seen < self.need
    }

    /// Events still required before the first emission.
    pub fn remaining(&self) -> usize {
        self.need.saturating_sub(self.seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_only_rejects_equal_and_earlier() {
        let mut seq = Sequencer::new(Admission::NewerOnly);
        assert!(seq.admit(1_000));
        assert!(!seq.admit(1_000));
        assert!(!seq.admit(999));
        assert!(seq.admit(1_001));
    }

    #[test]
    fn monotonic_admits_equal_timestamps() {
        let mut seq = Sequencer::new(Admission::Monotonic);
        assert!(seq.admit(1_000));
        assert!(seq.admit(1_000));
        assert!(!seq.admit(999));
        assert_eq!(seq.last_ts(), Some(1_000));
    }

    #[test]
    fn rejection_keeps_high_water_mark() {
        let mut seq = Sequencer::new(Admission::Monotonic);
        assert!(seq.admit(5_000));
        assert!(!seq.admit(4_000));
        assert_eq!(seq.last_ts(), Some(5_000));
    }

    #[test]
    fn reset_reopens_admission() {
        let mut seq = Sequencer::new(Admission::Monotonic);
        assert!(seq.admit(5_000));
        seq.reset();
        assert!(seq.admit(1));
    }

    #[test]
    fn warmup_emits_after_need_events() {
        let mut wu = Warmup::new(3);
        assert!(wu.tick());
        assert!(wu.tick());
        assert_eq!(wu.remaining(), 1);
        assert!(!wu.tick());
        assert!(!wu.tick());
    }
}
