use std::sync::atomic::{AtomicU64, Ordering};

/// A per-clause-length counter, used for the sharing manager's ambient observability surface
/// (`produced`/`failed-filter`/`admitted`/`dropped`/`returned` counts by clause length).
#[derive(Debug)]
pub struct ClauseHistogram {
    counts: Vec<AtomicU64>,
}

impl ClauseHistogram {
    #[must_use]
    pub fn new(max_clause_length: usize) -> Self {
        Self { counts: (0..=max_clause_length).map(|_| AtomicU64::new(0)).collect() }
    }

    pub fn increment(&self, clause_length: usize) {
        if let Some(slot) = self.counts.get(clause_length) {
            slot.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn get(&self, clause_length: usize) -> u64 {
        self.counts.get(clause_length).map_or(0, |slot| slot.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|slot| slot.load(Ordering::Relaxed)).sum()
    }
}
