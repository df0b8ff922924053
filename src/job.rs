use std::sync::Arc;

use clause_comm::{Communicator, CommunicatorHost};
use clause_history::{ClauseHistory, SubscribeRequest, WorkerId};
use parking_lot::Mutex;
use sharing_manager::{SharingManager, SolverHost};
use tree_allreduce::{AllReduceMessage, AllReduceTransport, BaseMsg, TreeTopology};

use crate::config::Configuration;
use crate::error::SharingError;

/// Everything a [`Job`] needs to address its history-replay protocol messages to a specific
/// peer: subscribe/unsubscribe requests addressed upward to a parent, and completed-window
/// batches sent downward to a subscriber. Kept behind a trait for the same reason
/// [`CommunicatorHost`]'s transports are: this crate stays agnostic of the job's real message
/// bus.
pub trait HistoryTransport: Send + Sync {
    fn send_subscribe_request(&self, request: SubscribeRequest);
    fn send_unsubscribe(&self, to: WorkerId);
    fn send_batch(&self, to: WorkerId, epoch: u32, buf: Vec<i32>);
}

/// One running job's clause-sharing subsystem: the all-reduce protocol driver, the per-job
/// clause database and duplicate filters, and (optionally) the windowed history log, wired
/// together behind a single handle for the owning process to drive.
pub struct Job {
    config:      Configuration,
    manager:     SharingManager,
    communicator: Communicator,
    history:     Option<Mutex<ClauseHistory>>,
    history_transport: Option<Arc<dyn HistoryTransport>>,
    parent:      Option<WorkerId>,
    solver_host: Arc<dyn SolverHost>,
    clause_transport: Arc<dyn AllReduceTransport<Vec<i32>>>,
    filter_transport: Arc<dyn AllReduceTransport<Vec<u8>>>,
}

impl Job {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Configuration,
        topology: TreeTopology,
        subtree_size: usize,
        parent: Option<WorkerId>,
        solver_host: Arc<dyn SolverHost>,
        clause_transport: Arc<dyn AllReduceTransport<Vec<i32>>>,
        filter_transport: Arc<dyn AllReduceTransport<Vec<u8>>>,
        history_transport: Option<Arc<dyn HistoryTransport>>,
    ) -> Result<Self, SharingError> {
        config.validate()?;

        let manager = SharingManager::new(config.sharing_manager_setup());
        let communicator = Communicator::new(
            topology,
            config.job_id,
            0,
            subtree_size,
            config.layout(),
            config.duplicate_filter_setup(),
        );
        let history = config
            .collect_clause_history
            .then(|| Mutex::new(ClauseHistory::new(config.clause_history_setup())));

        Ok(Self {
            config, manager, communicator, history, history_transport, parent, solver_host,
            clause_transport, filter_transport,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    #[must_use]
    pub fn manager(&self) -> &SharingManager {
        &self.manager
    }

    /// Only the tree root may call this; see [`Communicator::initiate_epoch`].
    pub fn initiate_epoch(&mut self) -> u32 {
        let host = make_host(
            &self.config, &self.manager, self.solver_host.as_ref(), self.history.as_ref(),
            self.history_transport.as_ref(), self.parent, &self.clause_transport, &self.filter_transport,
        );
        self.communicator.initiate_epoch(&host)
    }

    pub fn on_epoch_initiation(&mut self, revision: u32, epoch: u32) {
        let host = make_host(
            &self.config, &self.manager, self.solver_host.as_ref(), self.history.as_ref(),
            self.history_transport.as_ref(), self.parent, &self.clause_transport, &self.filter_transport,
        );
        self.communicator.on_epoch_initiation(revision, epoch, &host);
    }

    pub fn advance(&mut self) {
        let host = make_host(
            &self.config, &self.manager, self.solver_host.as_ref(), self.history.as_ref(),
            self.history_transport.as_ref(), self.parent, &self.clause_transport, &self.filter_transport,
        );
        self.communicator.advance(&host);
        self.advance_history();
    }

    /// Send out any of this worker's history windows that have finished aggregating to whichever
    /// peers are currently subscribed to them. Called as part of [`Job::advance`]; a no-op
    /// unless `collectClauseHistory` is enabled and some peer has subscribed.
    fn advance_history(&self) {
        let (Some(history), Some(transport)) = (&self.history, &self.history_transport) else { return };
        history.lock().send_next_batches(|to, epoch, buf| transport.send_batch(to, epoch, buf));
    }

    pub fn receive_clause_message(&self, base_msg: BaseMsg, message: AllReduceMessage<Vec<i32>>) -> bool {
        self.communicator.receive_clause_message(base_msg, message)
    }

    pub fn receive_filter_message(&self, base_msg: BaseMsg, message: AllReduceMessage<Vec<u8>>) -> bool {
        self.communicator.receive_filter_message(base_msg, message)
    }

    /// A peer asked to receive this worker's history windows `[begin_index, end_index)`.
    pub fn on_history_subscribe(&self, from: WorkerId, begin_index: usize, end_index: usize) {
        if let Some(history) = &self.history {
            history.lock().on_subscribe(from, begin_index, end_index);
        }
    }

    /// A peer no longer wants its history subscription served.
    pub fn on_history_unsubscribe(&self, from: WorkerId) {
        if let Some(history) = &self.history {
            history.lock().on_unsubscribe(from);
        }
    }

    /// A subscribed-to parent sent a replayed, already fully-aggregated history window for
    /// `epoch`. If this still leaves a gap, forwards the resulting [`SubscribeRequest`] to our
    /// own parent over the history transport.
    pub fn on_history_batch(&self, epoch: u32, buf: Vec<i32>) {
        let Some(history) = &self.history else { return };
        let request = history.lock().add_epoch(epoch, buf, true, self.parent);
        self.forward_subscribe_request(request);
    }

    fn forward_subscribe_request(&self, request: Option<SubscribeRequest>) {
        if let (Some(request), Some(transport)) = (request, &self.history_transport) {
            transport.send_subscribe_request(request);
        }
    }

    /// Called from a solver thread with a freshly learned clause; see
    /// [`SharingManager::learned_clause_callback`].
    pub fn learned_clause_callback(
        &self,
        solver_id: usize,
        solver_revision: u32,
        literals: Vec<i32>,
        lbd: u32,
        cond_var_or_zero: i32,
    ) -> bool {
        self.manager.learned_clause_callback(solver_id, solver_revision, literals, lbd, cond_var_or_zero)
    }

    pub fn stop_clause_import(&self, solver_id: usize) {
        self.manager.stop_clause_import(solver_id);
    }

    pub fn continue_clause_import(&self, solver_id: usize, revision: u32) {
        self.manager.continue_clause_import(solver_id, revision);
    }

    /// Advance both the sharing revision and the all-reduce revision tag together, since a
    /// restart that invalidates one invalidates the other.
    pub fn set_revision(&mut self, revision: u32) {
        self.manager.set_current_revision(revision);
        let host = make_host(
            &self.config, &self.manager, self.solver_host.as_ref(), self.history.as_ref(),
            self.history_transport.as_ref(), self.parent, &self.clause_transport, &self.filter_transport,
        );
        self.communicator.set_revision(revision, &host);
    }

    /// Stop initiating and cancel in-flight epochs, and tear down any upward history
    /// subscription by notifying its parent.
    pub fn suspend(&mut self) {
        self.communicator.suspend();
        let unsubscribe_target = self.history.as_ref().and_then(|history| history.lock().on_suspend());
        if let (Some(target), Some(transport)) = (unsubscribe_target, &self.history_transport) {
            transport.send_unsubscribe(target);
        }
    }

    pub fn resume(&mut self) {
        self.communicator.resume();
    }
}

#[allow(clippy::too_many_arguments)]
fn make_host<'a>(
    config:      &'a Configuration,
    manager:     &'a SharingManager,
    solver_host: &'a dyn SolverHost,
    history:     Option<&'a Mutex<ClauseHistory>>,
    history_transport: Option<&'a Arc<dyn HistoryTransport>>,
    parent:      Option<WorkerId>,
    clause_transport: &'a Arc<dyn AllReduceTransport<Vec<i32>>>,
    filter_transport: &'a Arc<dyn AllReduceTransport<Vec<u8>>>,
) -> JobHost<'a> {
    JobHost {
        config, manager, solver_host, history, history_transport, parent,
        clause_transport, filter_transport,
    }
}

/// Transient adapter giving [`Communicator`] access to the rest of a [`Job`] without requiring
/// `Job` itself to implement [`CommunicatorHost`] (which would force every passthrough call to
/// borrow the whole struct at once instead of just the fields a given step needs). Built fresh
/// from individual `self.field` projections at each call site so the borrow checker treats it as
/// disjoint from `self.communicator`, which those same call sites also borrow mutably.
struct JobHost<'a> {
    config:      &'a Configuration,
    manager:     &'a SharingManager,
    solver_host: &'a dyn SolverHost,
    history:     Option<&'a Mutex<ClauseHistory>>,
    history_transport: Option<&'a Arc<dyn HistoryTransport>>,
    parent:      Option<WorkerId>,
    clause_transport: &'a Arc<dyn AllReduceTransport<Vec<i32>>>,
    filter_transport: &'a Arc<dyn AllReduceTransport<Vec<u8>>>,
}

impl CommunicatorHost for JobHost<'_> {
    fn clause_transport(&self, _epoch: u32) -> Arc<dyn AllReduceTransport<Vec<i32>>> {
        self.clause_transport.clone()
    }

    fn filter_transport(&self, _epoch: u32) -> Arc<dyn AllReduceTransport<Vec<u8>>> {
        self.filter_transport.clone()
    }

    fn clause_buffer_limit(&self, num_aggregated: usize) -> usize {
        self.config.clause_buffer_limit(num_aggregated)
    }

    fn prepare_local_clauses(&self, literal_limit: usize) -> Vec<i32> {
        self.manager.prepare_sharing(literal_limit).0
    }

    fn digest_final_buffer(&self, epoch: u32, buf: &[i32]) {
        self.manager.digest_sharing(buf, self.solver_host);
        if let Some(history) = self.history {
            let request = history.lock().add_epoch(epoch, buf.to_vec(), false, self.parent);
            if let (Some(request), Some(transport)) = (request, self.history_transport) {
                transport.send_subscribe_request(request);
            }
        }
    }
}
