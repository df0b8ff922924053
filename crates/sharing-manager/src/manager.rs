use std::time::{Duration, Instant};

use clause_db::{Clause, ClauseDatabase, ClauseDatabaseSetup};
use dup_filter::{DuplicateFilterSet, DuplicateFilterSetup};
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::future_clauses::FutureClauseEntry;
use crate::host::SolverHost;
use crate::stats::SharingStatistics;

/// How often the process-wide and per-solver duplicate filters are cleared during
/// [`SharingManager::digest_sharing`], mirroring `clauseFilterClearInterval` in the original:
/// `0` meant "always", a positive value meant "every N seconds", negative meant "never".
#[derive(Debug, Clone, Copy)]
pub enum ClauseFilterClearInterval {
    Always,
    Periodic(Duration),
    Never,
}

/// Construction parameters for a [`SharingManager`].
#[derive(Debug, Clone, Copy)]
pub struct SharingManagerSetup {
    pub cdb:            ClauseDatabaseSetup,
    pub filter:         DuplicateFilterSetup,
    pub num_solvers:    usize,
    pub clear_interval: ClauseFilterClearInterval,
}

/// Orchestrates one job's clause production, import, and deferred admission: the glue between
/// the solver threads' learned clauses, the [`ClauseDatabase`], and the per-solver duplicate
/// filters. One instance per running job.
pub struct SharingManager {
    cdb:             ClauseDatabase,
    process_filter:  DuplicateFilterSet,
    solver_filters:  Vec<DuplicateFilterSet>,
    /// `None` means the solver is currently paused via `stop_clause_import`.
    solver_revisions: RwLock<Vec<Option<u32>>>,
    /// The sharing revision tag attached to outgoing/incoming buffers; distinct from any single
    /// solver's own live revision, which is queried through [`SolverHost::current_revision`].
    current_revision: RwLock<u32>,
    future_clauses:  Mutex<Vec<FutureClauseEntry>>,
    clear_interval:  ClauseFilterClearInterval,
    last_clear:      Mutex<Instant>,
    stats:           SharingStatistics,
}

impl SharingManager {
    #[must_use]
    pub fn new(setup: SharingManagerSetup) -> Self {
        let max_len = setup.cdb.strict_clause_length_limit as usize;
        Self {
            cdb: ClauseDatabase::new(setup.cdb),
            process_filter: DuplicateFilterSet::new(setup.filter),
            solver_filters: (0..setup.num_solvers)
                .map(|_| DuplicateFilterSet::new(setup.filter))
                .collect(),
            solver_revisions: RwLock::new(vec![Some(0); setup.num_solvers]),
            current_revision: RwLock::new(0),
            future_clauses: Mutex::new(Vec::new()),
            clear_interval: setup.clear_interval,
            last_clear: Mutex::new(Instant::now()),
            stats: SharingStatistics::new(max_len),
        }
    }

    #[must_use]
    pub fn statistics(&self) -> &SharingStatistics {
        &self.stats
    }

    #[must_use]
    pub fn clause_database(&self) -> &ClauseDatabase {
        &self.cdb
    }

    /// Advance the sharing revision that incoming buffers are checked against in
    /// [`SharingManager::digest_sharing`]. Called by the owning job when the solvers as a whole
    /// move to a new revision (e.g. after a restart on new assumptions).
    pub fn set_current_revision(&self, revision: u32) {
        *self.current_revision.write() = revision;
    }

    /// Called from a solver thread with a freshly learned clause. Discards the clause (silently,
    /// no statistic beyond "produced" is incremented) if `solver_revision` no longer matches the
    /// solver's tracked revision, which also covers a solver currently paused via
    /// [`SharingManager::stop_clause_import`].
    ///
    /// Returns whether the clause was ultimately admitted into the clause database.
    pub fn learned_clause_callback(
        &self,
        solver_id: usize,
        solver_revision: u32,
        mut literals: Vec<i32>,
        lbd: u32,
        cond_var_or_zero: i32,
    ) -> bool {
        if self.solver_revisions.read()[solver_id] != Some(solver_revision) {
            return false;
        }

        if cond_var_or_zero != 0 {
            literals.push(-cond_var_or_zero);
        }
        let len = literals.len();
        self.stats.record_produced(len);

        if !self.solver_filters[solver_id].register(&literals) {
            self.stats.record_failed_filter(len, true);
            return false;
        }
        if !self.process_filter.register(&literals) {
            self.stats.record_failed_filter(len, false);
            return false;
        }

        let clause = Clause::new(literals, lbd);
        let admitted = self.cdb.add_clause(solver_id as u32, clause);
        self.stats.record_admission(len, admitted);
        admitted
    }

    /// Export up to `literal_limit` literals' worth of clauses, in quality order, for outbound
    /// sharing.
    #[must_use]
    pub fn prepare_sharing(&self, literal_limit: usize) -> (Vec<i32>, usize) {
        self.cdb.export_buffer(literal_limit)
    }

    /// Digest an incoming packed clause buffer, importing into every solver that has caught up
    /// to the current sharing revision and deferring the rest. Periodically clears the
    /// process-wide and per-solver filters, per `clear_interval`.
    pub fn digest_sharing(&self, buf: &[i32], host: &dyn SolverHost) {
        self.digest_deferred_future_clauses(host);

        let clauses: Vec<Clause> = self.cdb.buffer_reader(buf).collect();
        let revision = *self.current_revision.read();

        let mut deferred: Option<FutureClauseEntry> = None;
        for solver_id in 0..self.solver_filters.len() {
            if host.current_revision(solver_id as u32) < revision {
                let entry = deferred.get_or_insert_with(|| {
                    FutureClauseEntry::new(revision, clauses.clone(), self.solver_filters.len())
                });
                entry.mark_involved(solver_id);
                continue;
            }
            for clause in &clauses {
                if self.solver_filters[solver_id].register(clause.literals()) {
                    host.import_clause(solver_id as u32, clause);
                }
            }
        }
        if let Some(entry) = deferred {
            trace!(revision, involved = ?entry.involved, "deferring sharing buffer for lagging solvers");
            self.future_clauses.lock().push(entry);
        }

        self.apply_periodic_filter_clear();
    }

    /// Replay entries from the deferred-clauses queue, importing into any solver that has since
    /// caught up to the entry's revision. Processing halts on the first pass that makes no
    /// progress at all, matching the original's "import once the whole list is eligible, not
    /// piecemeal forever" behavior.
    fn digest_deferred_future_clauses(&self, host: &dyn SolverHost) {
        let mut future_clauses = self.future_clauses.lock();
        let mut index = 0;
        while index < future_clauses.len() {
            let mut solvers_remaining = false;
            let mut progress = false;
            {
                let entry = &future_clauses[index];
                for solver_id in 0..self.solver_filters.len() {
                    if !entry.involved[solver_id] {
                        continue;
                    }
                    if host.current_revision(solver_id as u32) < entry.revision {
                        solvers_remaining = true;
                        continue;
                    }
                    for clause in &entry.clauses {
                        if self.solver_filters[solver_id].register(clause.literals()) {
                            host.import_clause(solver_id as u32, clause);
                        }
                    }
                    progress = true;
                }
            }
            if solvers_remaining {
                index += 1;
            } else {
                future_clauses.remove(index);
            }
            if !progress {
                break;
            }
        }
    }

    fn apply_periodic_filter_clear(&self) {
        let should_clear = match self.clear_interval {
            ClauseFilterClearInterval::Always => true,
            ClauseFilterClearInterval::Never => false,
            ClauseFilterClearInterval::Periodic(interval) => {
                let mut last_clear = self.last_clear.lock();
                if last_clear.elapsed() >= interval {
                    *last_clear = Instant::now();
                    true
                } else {
                    false
                }
            }
        };
        if should_clear {
            self.process_filter.clear();
            for filter in &self.solver_filters {
                filter.clear();
            }
        }
    }

    /// Re-insert clauses that a downstream step refused but which should be retried, subject
    /// only to the process-wide filter, under a virtual producer id distinct from any real
    /// solver (matching the original's use of the solver count as its "virtual producer").
    pub fn return_clauses(&self, buf: &[i32]) {
        let clauses: Vec<Clause> = self.cdb.buffer_reader(buf).collect();
        for clause in &clauses {
            self.stats.record_returned(clause.len());
        }
        let process_filter = &self.process_filter;
        self.cdb.bulk_add_clauses(
            self.solver_filters.len() as u32,
            clauses,
            |clause| process_filter.register(clause.literals()),
        );
    }

    /// Pause `solver_id`'s participation: its tracked revision becomes the sentinel "not
    /// participating" state, so any concurrently in-flight [`SharingManager::learned_clause_callback`]
    /// calls for it are discarded.
    pub fn stop_clause_import(&self, solver_id: usize) {
        self.solver_revisions.write()[solver_id] = None;
    }

    /// Resume `solver_id`'s participation at `revision`.
    pub fn continue_clause_import(&self, solver_id: usize, revision: u32) {
        self.solver_revisions.write()[solver_id] = Some(revision);
    }
}
