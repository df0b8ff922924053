use clause_db::SlotLayout;
use dup_filter::{DuplicateFilterSet, DuplicateFilterSetup};
use tree_allreduce::{AllReduceMessage, BaseMsg, TreeTopology};

use crate::host::CommunicatorHost;
use crate::session::Session;

/// Drives one job's clause-sharing epochs: owns zero or more overlapping [`Session`]s (one per
/// in-flight epoch, since the tree all-reduce is asynchronous) plus this worker's own
/// duplicate-judgement filter, used each epoch to decide which merged clauses it refuses.
pub struct Communicator {
    topology: TreeTopology,
    job_id:   u32,
    revision: u32,
    /// Number of workers aggregated into this node's subtree (itself included), supplied by the
    /// owning job from the job tree's known shape. Drives the per-epoch literal budget: a node
    /// merging a larger subtree gets a proportionally larger buffer limit (spec §4.5).
    subtree_size: usize,
    current_epoch: u32,
    suspended: bool,
    layout: SlotLayout,
    refusal_filter: DuplicateFilterSet,
    sessions: Vec<Session>,
    /// Initiation messages that arrived before this worker's revision caught up, retried via
    /// [`Communicator::retry_deferred_initiations`].
    deferred_initiations: Vec<(u32, u32)>,
}

impl Communicator {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        topology:     TreeTopology,
        job_id:       u32,
        revision:     u32,
        subtree_size: usize,
        layout:       SlotLayout,
        filter_setup: DuplicateFilterSetup,
    ) -> Self {
        Self {
            topology,
            job_id,
            revision,
            subtree_size,
            current_epoch: 0,
            suspended: false,
            layout,
            refusal_filter: DuplicateFilterSet::new(filter_setup),
            sessions: Vec::new(),
            deferred_initiations: Vec::new(),
        }
    }

    #[must_use]
    pub fn current_epoch(&self) -> u32 {
        self.current_epoch
    }

    #[must_use]
    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Advance this worker's revision. Called by the owning job on a restart; retries any
    /// initiation messages that were deferred waiting for exactly this.
    pub fn set_revision(&mut self, revision: u32, host: &dyn CommunicatorHost) {
        self.revision = revision;
        self.retry_deferred_initiations(host);
    }

    /// Open a new sharing epoch. Only the tree root may initiate; other workers learn of a new
    /// epoch via [`Communicator::on_epoch_initiation`].
    ///
    /// # Panics
    /// Panics if this worker is not the tree root.
    pub fn initiate_epoch(&mut self, host: &dyn CommunicatorHost) -> u32 {
        assert!(self.topology.is_root(), "only the tree root may initiate a sharing epoch");
        let epoch = self.current_epoch;
        self.current_epoch += 1;
        self.open_session(self.revision, epoch, host);
        epoch
    }

    /// A non-root worker received an initiation message for `epoch` under `revision`. If this
    /// worker hasn't reached `revision` yet, the initiation is queued until it does.
    pub fn on_epoch_initiation(&mut self, revision: u32, epoch: u32, host: &dyn CommunicatorHost) {
        if self.suspended {
            return;
        }
        if revision != self.revision {
            self.deferred_initiations.push((revision, epoch));
            return;
        }
        self.current_epoch = self.current_epoch.max(epoch + 1);
        self.open_session(revision, epoch, host);
    }

    fn retry_deferred_initiations(&mut self, host: &dyn CommunicatorHost) {
        let pending = std::mem::take(&mut self.deferred_initiations);
        for (revision, epoch) in pending {
            self.on_epoch_initiation(revision, epoch, host);
        }
    }

    fn open_session(&mut self, revision: u32, epoch: u32, host: &dyn CommunicatorHost) {
        let clause_transport = host.clause_transport(epoch);
        let filter_transport = host.filter_transport(epoch);
        let limit = host.clause_buffer_limit(self.subtree_size);
        self.sessions.push(Session::new(
            self.topology, self.job_id, revision, epoch, self.layout, self.subtree_size, limit,
            clause_transport, filter_transport,
        ));
    }

    /// Drive every in-flight session forward one step, and drop any that have finished and are
    /// safe to destroy without blocking.
    pub fn advance(&mut self, host: &dyn CommunicatorHost) {
        for session in &mut self.sessions {
            session.advance(host, &self.refusal_filter);
        }
        self.sessions.retain(|session| !(session.is_done() && session.is_destructible()));
    }

    /// Route an incoming clause-reduction message to whichever session's identity it matches.
    pub fn receive_clause_message(&self, base_msg: BaseMsg, message: AllReduceMessage<Vec<i32>>) -> bool {
        self.sessions.iter().any(|session| session.receive_clause_message(base_msg, message.clone()))
    }

    /// Route an incoming filter-reduction message to whichever session's identity it matches.
    pub fn receive_filter_message(&self, base_msg: BaseMsg, message: AllReduceMessage<Vec<u8>>) -> bool {
        self.sessions.iter().any(|session| session.receive_filter_message(base_msg, message.clone()))
    }

    /// Stop initiating new epochs and cancel every in-flight session so the global all-reduces
    /// they belong to can still terminate without this worker.
    pub fn suspend(&mut self) {
        self.suspended = true;
        for session in &self.sessions {
            session.cancel();
        }
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }
}
