use clause_db::Clause;

/// The solver-side half of the sharing manager: everything it needs to ask of, or hand clauses
/// to, the actual SAT solver instances it sits in front of.
///
/// A solver's "current revision" is its own live state, set by the solver engine itself whenever
/// it restarts on a new set of assumptions; it is distinct from the revision a caller attaches
/// to a particular [`crate::SharingManager::learned_clause_callback`] invocation, which is the
/// revision the *clause* was produced under.
pub trait SolverHost: Send + Sync {
    fn current_revision(&self, solver_id: u32) -> u32;

    /// Hand an admitted, filtered clause to `solver_id` for import into its clause database.
    fn import_clause(&self, solver_id: u32, clause: &Clause);
}
