use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// Structured calculator-state key: (symbol, timeframe).
///
/// Trade- and book-scoped calculators that have no timeframe use the
/// placeholder `"-"` (see [`InstrumentKey::untimed`]). A structured tuple is
/// used rather than a formatted `"symbol|tf"` string so that symbols
/// containing the separator cannot collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentKey {
    pub symbol: SmolStr,
    pub tf: SmolStr,
}

impl InstrumentKey {
    pub fn new(symbol: impl Into<SmolStr>, tf: impl Into<SmolStr>) -> Self {
        Self {
            symbol: symbol.into(),
            tf: tf.into(),
        }
    }

    /// Key for calculators scoped to a symbol only.
    pub fn untimed(symbol: impl Into<SmolStr>) -> Self {
        Self::new(symbol, "-")
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.symbol, self.tf)
    }
}

/// Insert-on-first-use store mapping an [`InstrumentKey`] to one independent
/// state machine.
///
/// Owned exclusively by a single calculator type; state is never aliased
/// across keys. Updates run to completion on a single worker, so no interior
/// locking is required — hosts that fan events out across threads must route
/// all events for a key through one worker.
#[derive(Debug, Clone)]
pub struct KeyedState<S> {
    states: FnvHashMap<InstrumentKey, S>,
}

impl<S> KeyedState<S> {
    pub fn new() -> Self {
        Self {
            states: FnvHashMap::default(),
        }
    }

    /// State for `key`, created with `init` on the first event for that key.
    pub fn state_with(&mut self, key: &InstrumentKey, init: impl FnOnce() -> S) -> &mut S {
        self.states.entry(key.clone()).or_insert_with(init)
    }

    pub fn get(&self, key: &InstrumentKey) -> Option<&S> {
        self.states.get(key)
    }

    /// Discards the state for `key`, if any.
    pub fn remove(&mut self, key: &InstrumentKey) -> Option<S> {
        self.states.remove(key)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl<S: Default> KeyedState<S> {
    /// State for `key`, default-created on the first event for that key.
    pub fn state(&mut self, key: &InstrumentKey) -> &mut S {
        self.state_with(key, S::default)
    }
}

impl<S> Default for KeyedState<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_do_not_alias_across_timeframes() {
        let mut store = KeyedState::<u32>::new();
        *store.state(&InstrumentKey::new("ES", "1m")) += 1;
        *store.state(&InstrumentKey::new("ES", "5m")) += 10;

        assert_eq!(store.get(&InstrumentKey::new("ES", "1m")), Some(&1));
        assert_eq!(store.get(&InstrumentKey::new("ES", "5m")), Some(&10));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn structured_key_cannot_collide_like_formatted_strings() {
        // "A|B" + "C" vs "A" + "B|C" collide as "A|B|C" strings, but not as
        // structured keys.
        let a = InstrumentKey::new("A|B", "C");
        let b = InstrumentKey::new("A", "B|C");
        assert_ne!(a, b);
    }

    #[test]
    fn remove_discards_only_the_named_key() {
        let mut store = KeyedState::<u32>::new();
        *store.state(&InstrumentKey::untimed("ES")) = 7;
        *store.state(&InstrumentKey::untimed("NQ")) = 9;

        assert_eq!(store.remove(&InstrumentKey::untimed("ES")), Some(7));
        assert_eq!(store.get(&InstrumentKey::untimed("NQ")), Some(&9));
    }
}
