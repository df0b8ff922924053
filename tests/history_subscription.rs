//! Exercises the history gap-recovery round trip through `Job`'s `HistoryTransport`: a worker
//! that joins in on epoch 1 without having seen epoch 0 must end up subscribing to its parent,
//! and the parent must actually serve the missing window back over the transport.

use std::sync::Arc;

use clause_history::{SubscribeRequest, WorkerId};
use sharing_job::{Configuration, HistoryTransport, Job};
use sharing_manager::SolverHost;
use tree_allreduce::{AllReduceMessage, AllReduceTransport, BaseMsg, TreeTopology};

struct NullTransport;

impl<T: Send + Sync + 'static> AllReduceTransport<T> for NullTransport {
    fn send_to_parent(&self, _base_msg: BaseMsg, _message: AllReduceMessage<T>) {}
    fn send_to_left_child(&self, _base_msg: BaseMsg, _message: AllReduceMessage<T>) {}
    fn send_to_right_child(&self, _base_msg: BaseMsg, _message: AllReduceMessage<T>) {}
}

struct NullSolverHost;

impl SolverHost for NullSolverHost {
    fn current_revision(&self, _solver_id: u32) -> u32 {
        0
    }
    fn import_clause(&self, _solver_id: u32, _clause: &clause_db::Clause) {}
}

/// Routes history-replay messages to whichever of this test's two jobs is named, standing in for
/// the job's real message bus.
struct RoutedHistoryTransport {
    to_parent_subscribe: crossbeam_channel::Sender<SubscribeRequest>,
    to_child_batch:      crossbeam_channel::Sender<(u32, Vec<i32>)>,
}

impl HistoryTransport for RoutedHistoryTransport {
    fn send_subscribe_request(&self, request: SubscribeRequest) {
        let _ = self.to_parent_subscribe.send(request);
    }
    fn send_unsubscribe(&self, _to: WorkerId) {}
    fn send_batch(&self, _to: WorkerId, epoch: u32, buf: Vec<i32>) {
        let _ = self.to_child_batch.send((epoch, buf));
    }
}

fn history_config() -> Configuration {
    Configuration { aggregation_factor: 1, ..Configuration::default().with_collect_clause_history(true) }
}

#[test]
fn late_joiner_subscribes_and_receives_the_missed_window() {
    let (subscribe_tx, subscribe_rx) = crossbeam_channel::unbounded::<SubscribeRequest>();
    let (batch_tx, batch_rx) = crossbeam_channel::unbounded::<(u32, Vec<i32>)>();

    let root_id = WorkerId(0);
    let child_id = WorkerId(1);

    let mut root = Job::new(
        history_config(),
        TreeTopology::root(),
        1,
        None,
        Arc::new(NullSolverHost),
        Arc::new(NullTransport),
        Arc::new(NullTransport),
        Some(Arc::new(RoutedHistoryTransport {
            to_parent_subscribe: subscribe_tx.clone(),
            to_child_batch: batch_tx.clone(),
        })),
    )
    .unwrap();

    let mut child = Job::new(
        history_config(),
        TreeTopology::root(),
        1,
        Some(root_id),
        Arc::new(NullSolverHost),
        Arc::new(NullTransport),
        Arc::new(NullTransport),
        Some(Arc::new(RoutedHistoryTransport {
            to_parent_subscribe: subscribe_tx,
            to_child_batch: batch_tx,
        })),
    )
    .unwrap();

    // Root alone produces and digests epoch 0, recording it in its own history.
    root.initiate_epoch();
    for _ in 0..50 {
        root.advance();
        std::thread::sleep(std::time::Duration::from_millis(1));
    }

    // Child joins straight at epoch 1, never having seen epoch 0: a gap should be recorded and a
    // subscription forwarded to root over the history transport.
    child.on_epoch_initiation(0, 1);
    for _ in 0..50 {
        child.advance();
        std::thread::sleep(std::time::Duration::from_millis(1));
    }

    let request = subscribe_rx.try_recv().expect("the missed window should trigger a subscribe request");
    assert_eq!(request.to, root_id);
    assert_eq!(request.begin_index, 0);

    root.on_history_subscribe(child_id, request.begin_index, request.end_index);

    // Root serves its completed window for epoch 0 once polled.
    let mut delivered = None;
    for _ in 0..50 {
        root.advance();
        if let Ok((epoch, buf)) = batch_rx.try_recv() {
            delivered = Some((epoch, buf));
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    let (epoch, buf) = delivered.expect("root should have replayed the completed window for epoch 0");
    assert_eq!(epoch, 0);

    // Handing that batch to the child should close its gap without raising a further request.
    child.on_history_batch(epoch, buf);
    assert!(
        subscribe_rx.try_recv().is_err(),
        "the gap is closed, so no further subscribe request should follow"
    );
}
