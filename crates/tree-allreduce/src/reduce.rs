use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use tracing::trace;

use crate::message::{AllReduceMessage, BaseMsg};
use crate::topology::TreeTopology;
use crate::transport::AllReduceTransport;

/// Where a [`TreeAllReduce`] instance currently stands in its lifecycle. Purely observational —
/// the instance's actual behavior is driven by the flags in [`Inner`], not by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllReducePhase {
    Idle,
    Producing,
    Gathering,
    ReducingUpward,
    Broadcasting,
    Finished,
    Cancelled,
}

struct Inner<T> {
    has_producer: bool,
    producing:        bool,
    produce_rx:       Option<Receiver<T>>,
    produce_handle:   Option<JoinHandle<()>>,
    local_elem:       Option<T>,

    child_elems:      Vec<T>,

    aggregating:      bool,
    aggregate_rx:     Option<Receiver<T>>,
    aggregate_handle: Option<JoinHandle<()>>,

    reduction_locally_done: bool,
    finished: bool,
    valid:    bool,
    result:   Option<T>,
}

impl<T> Default for Inner<T> {
    fn default() -> Self {
        Self {
            has_producer: false,
            producing: false,
            produce_rx: None,
            produce_handle: None,
            local_elem: None,
            child_elems: Vec::new(),
            aggregating: false,
            aggregate_rx: None,
            aggregate_handle: None,
            reduction_locally_done: false,
            finished: false,
            valid: true,
            result: None,
        }
    }
}

/// One instance of a tree all-reduce: aggregates a local contribution with every child's
/// contribution, bottom-up, then broadcasts the aggregated value back down the tree.
///
/// Drives itself forward from [`TreeAllReduce::receive`] and from repeated calls to
/// [`TreeAllReduce::advance`] (the owning job is expected to call `advance` periodically, since
/// local production and aggregation run on background threads).
pub struct TreeAllReduce<T> {
    topology:        TreeTopology,
    base_msg:        BaseMsg,
    neutral_element: T,
    aggregator:      Arc<dyn Fn(Vec<T>) -> T + Send + Sync>,
    transport:       Arc<dyn AllReduceTransport<T>>,
    inner:           Mutex<Inner<T>>,
}

impl<T> TreeAllReduce<T>
where
    T: Clone + Send + 'static,
{
    #[must_use]
    pub fn new(
        topology:        TreeTopology,
        base_msg:        BaseMsg,
        neutral_element: T,
        aggregator:      impl Fn(Vec<T>) -> T + Send + Sync + 'static,
        transport:       Arc<dyn AllReduceTransport<T>>,
    ) -> Self {
        Self {
            topology,
            base_msg,
            neutral_element,
            aggregator: Arc::new(aggregator),
            transport,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Set the function computing this worker's local contribution. Runs on a background
    /// thread, started immediately.
    ///
    /// # Panics
    /// Panics if a producer has already been set for this instance.
    pub fn produce(&self, local_producer: impl FnOnce() -> T + Send + 'static) {
        let mut inner = self.inner.lock();
        assert!(!inner.has_producer, "produce() called twice on the same all-reduce instance");
        inner.has_producer = true;
        inner.producing = true;

        let (tx, rx) = bounded(1);
        let handle = thread::spawn(move || {
            let _ = tx.send(local_producer());
        });
        inner.produce_rx = Some(rx);
        inner.produce_handle = Some(handle);
    }

    /// Process an incoming message, if it matches this instance's `(job, revision, epoch, tag)`.
    /// Returns whether the message was accepted.
    pub fn receive(&self, base_msg: BaseMsg, message: AllReduceMessage<T>) -> bool {
        if base_msg != self.base_msg {
            return false;
        }
        let mut inner = self.inner.lock();
        match message {
            AllReduceMessage::Reduction(elem) => {
                if !inner.aggregating {
                    inner.child_elems.push(elem);
                    drop(inner);
                    self.advance();
                }
            }
            AllReduceMessage::Broadcast(elem) => {
                self.receive_and_forward_final_elem(&mut inner, elem);
            }
        }
        true
    }

    /// Advance the state machine: pick up a finished local production, start aggregating once
    /// every child's element and the local element are present, and pick up a finished
    /// aggregation. The owning job should call this whenever it has reason to believe progress
    /// might be possible (a message arrived, or a periodic tick).
    pub fn advance(&self) {
        let mut inner = self.inner.lock();
        if inner.finished {
            return;
        }

        if let Some(rx) = &inner.produce_rx {
            if let Ok(elem) = rx.try_recv() {
                if let Some(handle) = inner.produce_handle.take() {
                    let _ = handle.join();
                }
                inner.local_elem = Some(elem);
                inner.producing = false;
                inner.produce_rx = None;
            }
        }

        if inner.child_elems.len() == self.topology.num_expected_children()
            && inner.local_elem.is_some()
            && !inner.producing
            && !inner.aggregating
            && inner.aggregate_rx.is_none()
            && !inner.reduction_locally_done
        {
            let mut all = Vec::with_capacity(inner.child_elems.len() + 1);
            all.push(inner.local_elem.clone().expect("just checked is_some"));
            all.extend(inner.child_elems.iter().cloned());

            inner.aggregating = true;
            let (tx, rx) = bounded(1);
            let aggregator = Arc::clone(&self.aggregator);
            let handle = thread::spawn(move || {
                let _ = tx.send(aggregator(all));
            });
            inner.aggregate_rx = Some(rx);
            inner.aggregate_handle = Some(handle);
        }

        if inner.aggregating {
            let ready = inner.aggregate_rx.as_ref().and_then(|rx| rx.try_recv().ok());
            if let Some(aggregated) = ready {
                if let Some(handle) = inner.aggregate_handle.take() {
                    let _ = handle.join();
                }
                inner.aggregating = false;
                inner.aggregate_rx = None;
                inner.reduction_locally_done = true;

                if self.topology.is_root() {
                    self.receive_and_forward_final_elem(&mut inner, aggregated);
                } else {
                    trace!(base_msg = ?self.base_msg, "forwarding reduction to parent");
                    self.transport.send_to_parent(self.base_msg, AllReduceMessage::Reduction(aggregated));
                }
            }
        }
    }

    fn receive_and_forward_final_elem(&self, inner: &mut Inner<T>, elem: T) {
        inner.finished = true;

        if self.topology.has_left_child {
            self.transport.send_to_left_child(
                self.base_msg,
                AllReduceMessage::Broadcast(elem.clone()),
            );
        }
        if self.topology.has_right_child {
            self.transport.send_to_right_child(self.base_msg, AllReduceMessage::Broadcast(elem.clone()));
        }
        inner.result = Some(elem);
    }

    /// Abort this instance. Before the upward reduction locally completes, the neutral element
    /// is sent to the parent so the global reduction still terminates without this worker.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        if inner.finished {
            return;
        }
        if !inner.reduction_locally_done && self.topology.has_parent {
            self.transport.send_to_parent(
                self.base_msg,
                AllReduceMessage::Reduction(self.neutral_element.clone()),
            );
        }
        inner.finished = true;
        inner.valid = false;
    }

    #[must_use]
    pub fn has_producer(&self) -> bool {
        self.inner.lock().has_producer
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.lock().valid
    }

    #[must_use]
    pub fn has_result(&self) -> bool {
        let inner = self.inner.lock();
        inner.finished && inner.valid
    }

    /// Take the final result. May only be called once `has_result()` is `true`, and only once.
    ///
    /// # Panics
    /// Panics if `has_result()` is `false`.
    pub fn extract_result(&self) -> T {
        let mut inner = self.inner.lock();
        assert!(inner.finished && inner.valid, "extract_result() called without a ready result");
        inner.valid = false;
        inner.result.take().expect("result is set whenever finished && valid")
    }

    /// Whether this instance can be dropped right now without blocking on a background thread.
    #[must_use]
    pub fn is_destructible(&self) -> bool {
        let inner = self.inner.lock();
        !inner.producing && !inner.aggregating
    }

    #[must_use]
    pub fn phase(&self) -> AllReducePhase {
        let inner = self.inner.lock();
        if inner.finished {
            return if inner.valid { AllReducePhase::Finished } else { AllReducePhase::Cancelled };
        }
        if inner.reduction_locally_done {
            return AllReducePhase::Broadcasting;
        }
        if inner.aggregating {
            return AllReducePhase::ReducingUpward;
        }
        if inner.has_producer {
            return if inner.producing { AllReducePhase::Producing } else { AllReducePhase::Gathering };
        }
        AllReducePhase::Idle
    }
}

impl<T> Drop for TreeAllReduce<T> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if let Some(handle) = inner.produce_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = inner.aggregate_handle.take() {
            let _ = handle.join();
        }
    }
}
