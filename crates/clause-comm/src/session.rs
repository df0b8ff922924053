use std::collections::BTreeMap;
use std::sync::Arc;

use clause_db::{encode, BufferMerger, BufferReader, Clause, ClauseSlot, SlotLayout};
use dup_filter::DuplicateFilterSet;
use tracing::trace;
use tree_allreduce::{AllReduceMessage, AllReducePhase, BaseMsg, TreeAllReduce, TreeTopology};

use crate::host::CommunicatorHost;
use crate::message::{TAG_ALLREDUCE_CLAUSES, TAG_ALLREDUCE_FILTER};
use crate::stage::SessionStage;

/// One sharing epoch's state: a clause all-reduce, followed by a filter all-reduce over the
/// clauses the merged buffer contains, followed by handing the filter-agreed buffer off for
/// import. See [`SessionStage`] for the state machine this walks through.
pub struct Session {
    epoch:  u32,
    layout: SlotLayout,
    /// Number of workers aggregated into this node's subtree, passed through to
    /// [`CommunicatorHost::clause_buffer_limit`] for this worker's own local-production call so
    /// it scales with subtree size exactly as the merge cap computed at construction did.
    num_aggregated: usize,
    allreduce_clauses: TreeAllReduce<Vec<i32>>,
    allreduce_filter:  TreeAllReduce<Vec<u8>>,
    merged_clauses: Option<Vec<i32>>,
    final_buffer:   Option<Vec<i32>>,
}

impl Session {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        topology: TreeTopology,
        job_id:   u32,
        revision: u32,
        epoch:    u32,
        layout:   SlotLayout,
        num_aggregated: usize,
        clause_buffer_limit: usize,
        clause_transport: Arc<dyn tree_allreduce::AllReduceTransport<Vec<i32>>>,
        filter_transport: Arc<dyn tree_allreduce::AllReduceTransport<Vec<u8>>>,
    ) -> Self {
        let clause_base_msg = BaseMsg { job_id, revision, epoch, tag: TAG_ALLREDUCE_CLAUSES };
        let filter_base_msg = BaseMsg { job_id, revision, epoch, tag: TAG_ALLREDUCE_FILTER };

        let allreduce_clauses = TreeAllReduce::new(
            topology,
            clause_base_msg,
            Vec::new(),
            move |elems: Vec<Vec<i32>>| {
                let merger = BufferMerger::new(layout);
                let refs: Vec<&[i32]> = elems.iter().map(Vec::as_slice).collect();
                let (merged, excess) = merger.merge(&refs, clause_buffer_limit);
                if !excess.is_empty() {
                    trace!(epoch, dropped = excess.len(), "epoch merge exceeded its buffer limit");
                }
                merged
            },
            clause_transport,
        );

        let allreduce_filter = TreeAllReduce::new(
            topology,
            filter_base_msg,
            Vec::new(),
            |elems: Vec<Vec<u8>>| {
                let max_len = elems.iter().map(Vec::len).max().unwrap_or(0);
                let mut combined = vec![0_u8; max_len];
                for elem in &elems {
                    for (i, &byte) in elem.iter().enumerate() {
                        combined[i] |= byte;
                    }
                }
                combined
            },
            filter_transport,
        );

        Self {
            epoch, layout, num_aggregated, allreduce_clauses, allreduce_filter,
            merged_clauses: None, final_buffer: None,
        }
    }

    #[must_use]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    #[must_use]
    pub fn stage(&self) -> SessionStage {
        if self.final_buffer.is_some() {
            return SessionStage::Done;
        }
        if self.merged_clauses.is_none() {
            return match self.allreduce_clauses.phase() {
                AllReducePhase::Broadcasting => SessionStage::WaitingForClauseBcast,
                _ => SessionStage::PreparingClauses,
            };
        }
        match self.allreduce_filter.phase() {
            AllReducePhase::Broadcasting => SessionStage::WaitingForFilterBcast,
            _ => SessionStage::PreparingFilter,
        }
    }

    /// Drive this session one step: start local production if not yet started, poll the clause
    /// all-reduce, judge refusals and start the filter all-reduce once the merged buffer is
    /// ready, and hand off the final agreed buffer once the filter all-reduce completes.
    pub fn advance(&mut self, host: &dyn CommunicatorHost, refusal_filter: &DuplicateFilterSet) {
        if !self.allreduce_clauses.has_producer() {
            let limit = host.clause_buffer_limit(self.num_aggregated);
            let local = host.prepare_local_clauses(limit);
            self.allreduce_clauses.produce(move || local);
        }
        self.allreduce_clauses.advance();

        if self.merged_clauses.is_none() && self.allreduce_clauses.has_result() {
            let merged = self.allreduce_clauses.extract_result();
            let bitmap = Self::compute_refusal_bitmap(self.layout, &merged, refusal_filter);
            self.merged_clauses = Some(merged);
            self.allreduce_filter.produce(move || bitmap);
        }

        self.allreduce_filter.advance();

        if self.final_buffer.is_none() {
            if let (Some(merged), true) = (&self.merged_clauses, self.allreduce_filter.has_result()) {
                let bitmap = self.allreduce_filter.extract_result();
                let final_buf = Self::apply_refusal_bitmap(self.layout, merged, &bitmap);
                host.digest_final_buffer(self.epoch, &final_buf);
                self.final_buffer = Some(final_buf);
            }
        }
    }

    /// Using this worker's own duplicate-judgement filter (distinct from any solver's or the
    /// sharing manager's), mark which clauses in the merged buffer, by position, are already
    /// known here and should be refused.
    fn compute_refusal_bitmap(layout: SlotLayout, merged: &[i32], filter: &DuplicateFilterSet) -> Vec<u8> {
        let mut bitmap = Vec::new();
        for (i, clause) in BufferReader::new(layout, merged).enumerate() {
            let byte_index = i / 8;
            if bitmap.len() <= byte_index {
                bitmap.resize(byte_index + 1, 0);
            }
            if !filter.register(clause.literals()) {
                bitmap[byte_index] |= 1 << (i % 8);
            }
        }
        bitmap
    }

    /// Rebuild the merged buffer without the clauses the OR-combined bitmap marks as refused.
    fn apply_refusal_bitmap(layout: SlotLayout, merged: &[i32], bitmap: &[u8]) -> Vec<i32> {
        let mut by_slot: BTreeMap<ClauseSlot, Vec<Clause>> = BTreeMap::new();
        for (i, clause) in BufferReader::new(layout, merged).enumerate() {
            let refused = bitmap.get(i / 8).is_some_and(|byte| byte & (1 << (i % 8)) != 0);
            if !refused {
                let slot = layout.slot_for(clause.len() as u32, clause.lbd());
                by_slot.entry(slot).or_default().push(clause);
            }
        }
        encode(&layout, |slot| by_slot.get(&slot).map(Vec::as_slice).unwrap_or(&[]))
    }

    pub fn receive_clause_message(&self, base_msg: BaseMsg, message: AllReduceMessage<Vec<i32>>) -> bool {
        self.allreduce_clauses.receive(base_msg, message)
    }

    pub fn receive_filter_message(&self, base_msg: BaseMsg, message: AllReduceMessage<Vec<u8>>) -> bool {
        self.allreduce_filter.receive(base_msg, message)
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.final_buffer.is_some()
    }

    #[must_use]
    pub fn is_destructible(&self) -> bool {
        self.allreduce_clauses.is_destructible() && self.allreduce_filter.is_destructible()
    }

    pub fn cancel(&self) {
        self.allreduce_clauses.cancel();
        self.allreduce_filter.cancel();
    }
}
