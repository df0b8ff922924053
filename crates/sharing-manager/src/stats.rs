use std::sync::atomic::{AtomicU64, Ordering};

use crate::histogram::ClauseHistogram;

/// Running counters for the sharing manager's clause pipeline, exposed for the host's
/// statistics surface. Purely observational; never consulted for correctness.
#[derive(Debug)]
pub struct SharingStatistics {
    pub produced:              AtomicU64,
    pub failed_solver_filter:  AtomicU64,
    pub failed_process_filter: AtomicU64,
    pub admitted:              AtomicU64,
    pub dropped_capacity:      AtomicU64,
    pub returned:              AtomicU64,
    pub hist_produced:      ClauseHistogram,
    pub hist_failed_filter: ClauseHistogram,
    pub hist_admitted:      ClauseHistogram,
    pub hist_dropped:       ClauseHistogram,
}

impl SharingStatistics {
    #[must_use]
    pub fn new(max_clause_length: usize) -> Self {
        Self {
            produced:              AtomicU64::new(0),
            failed_solver_filter:  AtomicU64::new(0),
            failed_process_filter: AtomicU64::new(0),
            admitted:              AtomicU64::new(0),
            dropped_capacity:      AtomicU64::new(0),
            returned:              AtomicU64::new(0),
            hist_produced:      ClauseHistogram::new(max_clause_length),
            hist_failed_filter: ClauseHistogram::new(max_clause_length),
            hist_admitted:      ClauseHistogram::new(max_clause_length),
            hist_dropped:       ClauseHistogram::new(max_clause_length),
        }
    }

    pub(crate) fn record_produced(&self, len: usize) {
        self.produced.fetch_add(1, Ordering::Relaxed);
        self.hist_produced.increment(len);
    }

    pub(crate) fn record_failed_filter(&self, len: usize, was_solver_filter: bool) {
        if was_solver_filter {
            self.failed_solver_filter.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_process_filter.fetch_add(1, Ordering::Relaxed);
        }
        self.hist_failed_filter.increment(len);
    }

    pub(crate) fn record_admission(&self, len: usize, admitted: bool) {
        if admitted {
            self.admitted.fetch_add(1, Ordering::Relaxed);
            self.hist_admitted.increment(len);
        } else {
            self.dropped_capacity.fetch_add(1, Ordering::Relaxed);
            self.hist_dropped.increment(len);
        }
    }

    pub(crate) fn record_returned(&self, len: usize) {
        self.returned.fetch_add(1, Ordering::Relaxed);
        self.hist_produced.increment(len);
    }
}
