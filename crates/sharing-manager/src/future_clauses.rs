use clause_db::Clause;

/// A buffer that arrived via `digest_sharing` while one or more solvers had not yet caught up to
/// the revision it was tagged with. Held until every involved solver's live revision reaches
/// `revision`, at which point the clauses are imported for that solver and the entry is shrunk.
pub struct FutureClauseEntry {
    pub revision: u32,
    pub clauses: Vec<Clause>,
    /// `involved[solver_id]` is set the first time that solver is found to be behind `revision`
    /// for this entry. Once a solver has been imported into, its flag is left set: it is the
    /// presence of at least one *still-behind* solver (checked live against the host, not stored
    /// here) that keeps the entry alive.
    pub involved: Vec<bool>,
}

impl FutureClauseEntry {
    #[must_use]
    pub fn new(revision: u32, clauses: Vec<Clause>, num_solvers: usize) -> Self {
        Self { revision, clauses, involved: vec![false; num_solvers] }
    }

    pub fn mark_involved(&mut self, solver_id: usize) {
        self.involved[solver_id] = true;
    }
}
