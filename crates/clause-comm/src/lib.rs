//! Drives one job's clause-sharing epochs on top of the clause database, duplicate filter, and
//! tree all-reduce primitives.
//!
//! A [`Communicator`] opens a [`Session`] per epoch. Each session runs a clause all-reduce (merge
//! every worker's exported buffer), judges which of the merged clauses this worker already knows
//! about, runs a filter all-reduce (OR-combine every worker's refusals), and finally applies the
//! agreed refusal bitmap before handing the buffer off for import.

mod communicator;
mod host;
mod message;
mod session;
mod stage;

pub use communicator::Communicator;
pub use host::CommunicatorHost;
pub use message::{TAG_ALLREDUCE_CLAUSES, TAG_ALLREDUCE_FILTER};
pub use session::Session;
pub use stage::SessionStage;

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use clause_db::{BufferMerger, BufferReader, Clause, SlotLayout};
    use dup_filter::DuplicateFilterSetup;
    use tree_allreduce::{AllReduceMessage, AllReduceTransport, BaseMsg, TreeTopology};

    use super::*;

    /// Routes all-reduce messages between a fixed set of nodes over unbounded channels, standing
    /// in for the job's real message-passing substrate.
    struct ChannelTransport<T> {
        to_parent: Option<crossbeam_channel::Sender<(BaseMsg, AllReduceMessage<T>)>>,
        to_left:   Option<crossbeam_channel::Sender<(BaseMsg, AllReduceMessage<T>)>>,
        to_right:  Option<crossbeam_channel::Sender<(BaseMsg, AllReduceMessage<T>)>>,
    }

    impl<T: Send + Sync + 'static> AllReduceTransport<T> for ChannelTransport<T> {
        fn send_to_parent(&self, base_msg: BaseMsg, message: AllReduceMessage<T>) {
            if let Some(tx) = &self.to_parent {
                let _ = tx.send((base_msg, message));
            }
        }
        fn send_to_left_child(&self, base_msg: BaseMsg, message: AllReduceMessage<T>) {
            if let Some(tx) = &self.to_left {
                let _ = tx.send((base_msg, message));
            }
        }
        fn send_to_right_child(&self, base_msg: BaseMsg, message: AllReduceMessage<T>) {
            if let Some(tx) = &self.to_right {
                let _ = tx.send((base_msg, message));
            }
        }
    }

    struct FakeHost {
        local_clauses: Vec<i32>,
        clause_transport: Arc<ChannelTransport<Vec<i32>>>,
        filter_transport: Arc<ChannelTransport<Vec<u8>>>,
        digested: Mutex<Option<Vec<i32>>>,
        seen_num_aggregated: Mutex<Vec<usize>>,
    }

    impl CommunicatorHost for FakeHost {
        fn clause_transport(&self, _epoch: u32) -> Arc<dyn AllReduceTransport<Vec<i32>>> {
            self.clause_transport.clone()
        }
        fn filter_transport(&self, _epoch: u32) -> Arc<dyn AllReduceTransport<Vec<u8>>> {
            self.filter_transport.clone()
        }
        fn clause_buffer_limit(&self, num_aggregated: usize) -> usize {
            self.seen_num_aggregated.lock().unwrap().push(num_aggregated);
            1000
        }
        fn prepare_local_clauses(&self, _literal_limit: usize) -> Vec<i32> {
            self.local_clauses.clone()
        }
        fn digest_final_buffer(&self, _epoch: u32, buf: &[i32]) {
            *self.digested.lock().unwrap() = Some(buf.to_vec());
        }
    }

    fn layout() -> SlotLayout {
        SlotLayout { strict_clause_length_limit: 10, max_lbd_partitioned_size: 10, group_by_length_lbd_sum: false }
    }

    fn unit_clause_buffer(layout: SlotLayout, lits: &[i32]) -> Vec<i32> {
        let clauses: Vec<Clause> = lits.iter().map(|&lit| Clause::new(vec![lit], 1)).collect();
        clause_db::encode(&layout, |slot| if slot == layout.slot_for(1, 1) { &clauses } else { &[] })
    }

    fn literals_in(layout: SlotLayout, buf: &[i32]) -> Vec<i32> {
        let mut lits: Vec<i32> = BufferReader::new(layout, buf).map(|c| c.literals()[0]).collect();
        lits.sort_unstable();
        lits
    }

    /// Drains every pending channel message and routes it to the matching communicator, then
    /// calls `advance` on both, until each host has digested its final buffer (these all-reduces
    /// never block on real I/O, so a handful of rounds always suffices once the background
    /// aggregation threads finish).
    #[allow(clippy::too_many_arguments)]
    fn drive_two_nodes(
        root: &mut Communicator,
        root_host: &FakeHost,
        root_clause_rx: &crossbeam_channel::Receiver<(BaseMsg, AllReduceMessage<Vec<i32>>)>,
        root_filter_rx: &crossbeam_channel::Receiver<(BaseMsg, AllReduceMessage<Vec<u8>>)>,
        child: &mut Communicator,
        child_host: &FakeHost,
        child_clause_rx: &crossbeam_channel::Receiver<(BaseMsg, AllReduceMessage<Vec<i32>>)>,
        child_filter_rx: &crossbeam_channel::Receiver<(BaseMsg, AllReduceMessage<Vec<u8>>)>,
    ) {
        for _ in 0..500 {
            root.advance(root_host);
            child.advance(child_host);

            while let Ok((base_msg, message)) = root_clause_rx.try_recv() {
                root.receive_clause_message(base_msg, message);
            }
            while let Ok((base_msg, message)) = root_filter_rx.try_recv() {
                root.receive_filter_message(base_msg, message);
            }
            while let Ok((base_msg, message)) = child_clause_rx.try_recv() {
                child.receive_clause_message(base_msg, message);
            }
            while let Ok((base_msg, message)) = child_filter_rx.try_recv() {
                child.receive_filter_message(base_msg, message);
            }

            if root_host.digested.lock().unwrap().is_some() && child_host.digested.lock().unwrap().is_some() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        panic!("two-node sharing epoch never completed");
    }

    /// Spec scenario 1: root produces {1, 2}, child produces {2, 3}. After the clause all-reduce
    /// merges them into one buffer and the filter all-reduce runs over a session that has never
    /// seen any of these clauses before, nobody refuses anything — both workers receive the full
    /// {1, 2, 3} and it's left to the sharing manager's own per-solver filters to decide, on
    /// import, that root only needs {3} and the child only needs {1}.
    #[test]
    fn two_node_tree_one_epoch_merges_with_no_refusals() {
        let layout = layout();
        let (root_to_child_clause_tx, child_clause_rx) = crossbeam_channel::unbounded();
        let (child_to_root_clause_tx, root_clause_rx) = crossbeam_channel::unbounded();
        let (root_to_child_filter_tx, child_filter_rx) = crossbeam_channel::unbounded();
        let (child_to_root_filter_tx, root_filter_rx) = crossbeam_channel::unbounded();

        let root_clause_transport = Arc::new(ChannelTransport {
            to_parent: None, to_left: Some(root_to_child_clause_tx), to_right: None,
        });
        let root_filter_transport = Arc::new(ChannelTransport {
            to_parent: None, to_left: Some(root_to_child_filter_tx), to_right: None,
        });
        let child_clause_transport = Arc::new(ChannelTransport {
            to_parent: Some(child_to_root_clause_tx), to_left: None, to_right: None,
        });
        let child_filter_transport = Arc::new(ChannelTransport {
            to_parent: Some(child_to_root_filter_tx), to_left: None, to_right: None,
        });

        let root_host = FakeHost {
            local_clauses: unit_clause_buffer(layout, &[1, 2]),
            clause_transport: root_clause_transport,
            filter_transport: root_filter_transport,
            digested: Mutex::new(None),
            seen_num_aggregated: Mutex::new(Vec::new()),
        };
        let child_host = FakeHost {
            local_clauses: unit_clause_buffer(layout, &[2, 3]),
            clause_transport: child_clause_transport,
            filter_transport: child_filter_transport,
            digested: Mutex::new(None),
            seen_num_aggregated: Mutex::new(Vec::new()),
        };

        let filter_setup = DuplicateFilterSetup { expected_items_per_length: 64, bits_per_item: 10 };
        let mut root = Communicator::new(
            TreeTopology { has_parent: false, has_left_child: true, has_right_child: false },
            1, 0, 2, layout, filter_setup,
        );
        let mut child = Communicator::new(
            TreeTopology { has_parent: true, has_left_child: false, has_right_child: false },
            1, 0, 1, layout, filter_setup,
        );

        root.initiate_epoch(&root_host);
        child.on_epoch_initiation(0, 0, &child_host);

        drive_two_nodes(
            &mut root, &root_host, &root_clause_rx, &root_filter_rx,
            &mut child, &child_host, &child_clause_rx, &child_filter_rx,
        );

        let root_final = root_host.digested.lock().unwrap().clone().unwrap();
        let child_final = child_host.digested.lock().unwrap().clone().unwrap();

        assert_eq!(literals_in(layout, &root_final), vec![1, 2, 3]);
        assert_eq!(literals_in(layout, &child_final), vec![1, 2, 3]);

        // Root's subtree has 2 workers (itself + the child); the child's subtree is just itself.
        assert!(root_host.seen_num_aggregated.lock().unwrap().iter().all(|&n| n == 2));
        assert!(child_host.seen_num_aggregated.lock().unwrap().iter().all(|&n| n == 1));
    }

    #[test]
    fn duplicate_clause_across_three_workers_merges_into_one_copy() {
        let layout = layout();
        let clause = Clause::new(vec![1, 2, 3], 2);
        let buf = clause_db::encode(&layout, |slot| {
            if slot == layout.slot_for(3, 2) { std::slice::from_ref(&clause) } else { &[] }
        });
        let merger = BufferMerger::new(layout);
        let (merged, excess) = merger.merge(&[&buf, &buf, &buf], 1000);
        assert!(excess.is_empty());
        let clauses: Vec<Clause> = BufferReader::new(layout, &merged).collect();
        assert_eq!(clauses.len(), 1, "three identical productions should merge into one clause");
    }

    /// The communicator-level refusal filter is the "same duplicate-filter contract" used across
    /// epochs, not per-epoch production state: a clause merged in epoch 0 is registered while
    /// computing that epoch's bitmap, so an identical clause merged again in epoch 1 is refused.
    #[test]
    fn refusal_filter_remembers_a_clause_merged_in_an_earlier_epoch() {
        let layout = layout();
        let clause_transport = Arc::new(ChannelTransport::<Vec<i32>> { to_parent: None, to_left: None, to_right: None });
        let filter_transport = Arc::new(ChannelTransport::<Vec<u8>> { to_parent: None, to_left: None, to_right: None });
        let host = FakeHost {
            local_clauses: unit_clause_buffer(layout, &[42]),
            clause_transport,
            filter_transport,
            digested: Mutex::new(None),
            seen_num_aggregated: Mutex::new(Vec::new()),
        };
        let filter_setup = DuplicateFilterSetup { expected_items_per_length: 64, bits_per_item: 10 };
        let mut root = Communicator::new(TreeTopology::root(), 1, 0, 1, layout, filter_setup);

        root.initiate_epoch(&host);
        for _ in 0..500 {
            root.advance(&host);
            if host.digested.lock().unwrap().is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        let epoch0_final = host.digested.lock().unwrap().take().unwrap();
        assert_eq!(literals_in(layout, &epoch0_final), vec![42], "first sighting must not be refused");

        root.initiate_epoch(&host);
        for _ in 0..500 {
            root.advance(&host);
            if host.digested.lock().unwrap().is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        let epoch1_final = host.digested.lock().unwrap().take().unwrap();
        assert!(
            literals_in(layout, &epoch1_final).is_empty(),
            "the same clause merged again should now be refused by the communicator's own filter"
        );
    }
}
