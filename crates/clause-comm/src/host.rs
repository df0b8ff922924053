use std::sync::Arc;

use tree_allreduce::AllReduceTransport;

/// Everything a [`crate::Communicator`] needs from its owning job: message delivery for its two
/// per-epoch all-reduces, and the hooks into the job's own clause pipeline (backed by a
/// `SharingManager` in practice, kept behind a trait here so this crate stays decoupled from it).
pub trait CommunicatorHost: Send + Sync {
    fn clause_transport(&self, epoch: u32) -> Arc<dyn AllReduceTransport<Vec<i32>>>;
    fn filter_transport(&self, epoch: u32) -> Arc<dyn AllReduceTransport<Vec<u8>>>;

    /// The packed-buffer literal budget for a subtree of `num_aggregated` contributing workers.
    fn clause_buffer_limit(&self, num_aggregated: usize) -> usize;

    /// Export this worker's locally held clauses, up to `literal_limit` literals.
    fn prepare_local_clauses(&self, literal_limit: usize) -> Vec<i32>;

    /// Hand an epoch's final, filter-agreed packed buffer to the sharing manager for import (and,
    /// if clause history is enabled, to the history log under this same epoch number).
    fn digest_final_buffer(&self, epoch: u32, buf: &[i32]);
}
