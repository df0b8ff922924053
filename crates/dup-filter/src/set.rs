use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::trace;

use crate::bloom::BloomFilter;

/// Registration parameters, one filter instance created lazily per distinct clause length (a
/// length-6 clause never collides with a length-2 clause's bits).
#[derive(Debug, Clone, Copy)]
pub struct DuplicateFilterSetup {
    pub expected_items_per_length: usize,
    pub bits_per_item:             u8,
}

/// A process- or solver-scoped approximate duplicate filter, partitioned by clause length.
///
/// Mirrors the clause database's lazy per-partition map: a filter for a given length is created
/// on first use and then reused for the lifetime of the set.
#[derive(Debug)]
pub struct DuplicateFilterSet {
    setup:   DuplicateFilterSetup,
    filters: RwLock<HashMap<usize, BloomFilter>>,
}

impl DuplicateFilterSet {
    #[must_use]
    pub fn new(setup: DuplicateFilterSetup) -> Self {
        Self { setup, filters: RwLock::new(HashMap::new()) }
    }

    /// Register `literals` (assumed already sorted) against the filter for their length.
    /// Returns `true` if the clause looks novel and should be admitted.
    pub fn register(&self, literals: &[i32]) -> bool {
        {
            let filters = self.filters.read();
            if let Some(filter) = filters.get(&literals.len()) {
                return filter.register(literals);
            }
        }
        let mut filters = self.filters.write();
        let filter = filters.entry(literals.len()).or_insert_with(|| {
            BloomFilter::new(self.setup.expected_items_per_length, self.setup.bits_per_item)
        });
        filter.register(literals)
    }

    /// Clear every length's filter immediately.
    pub fn clear(&self) {
        let filters = self.filters.read();
        for filter in filters.values() {
            filter.clear();
        }
    }

    /// Defer a clear of every length's filter to the next safe point.
    pub fn set_clear(&self) {
        let filters = self.filters.read();
        for filter in filters.values() {
            filter.set_clear();
        }
        trace!(lengths = filters.len(), "deferred clear requested for duplicate filter set");
    }

    /// Apply any pending deferred clear on every length's filter.
    pub fn clear_if_pending(&self) {
        let filters = self.filters.read();
        for filter in filters.values() {
            filter.clear_if_pending();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> DuplicateFilterSetup {
        DuplicateFilterSetup { expected_items_per_length: 64, bits_per_item: 10 }
    }

    #[test]
    fn different_lengths_do_not_collide() {
        let set = DuplicateFilterSet::new(setup());
        assert!(set.register(&[1]));
        assert!(set.register(&[1, 2]), "a different-length clause must not be rejected");
    }

    #[test]
    fn same_length_duplicate_is_flagged() {
        let set = DuplicateFilterSet::new(setup());
        assert!(set.register(&[1, 2]));
        assert!(!set.register(&[1, 2]));
    }

    #[test]
    fn clear_resets_all_lengths() {
        let set = DuplicateFilterSet::new(setup());
        set.register(&[1]);
        set.register(&[1, 2]);
        set.clear();
        assert!(set.register(&[1]));
        assert!(set.register(&[1, 2]));
    }
}
