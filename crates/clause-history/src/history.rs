use clause_db::{BufferMerger, SlotLayout};
use tracing::trace;

use crate::entry::HistoryEntry;
use crate::ids::WorkerId;
use crate::subscription::{SubscribeRequest, Subscription};

/// Construction parameters for a [`ClauseHistory`].
#[derive(Debug, Clone, Copy)]
pub struct ClauseHistorySetup {
    /// Number of epochs merged into a single history window.
    pub aggregation_factor:    usize,
    /// How many of the most recent windows are kept at the larger "short-term" buffer size
    /// before being shrunk to the long-term size.
    pub num_shortterm_slots:   usize,
    pub shortterm_buffer_size: usize,
    pub longterm_buffer_size:  usize,
    pub layout:                SlotLayout,
}

/// A windowed replay log of exported clause buffers.
///
/// Every `aggregation_factor` epochs collapse into one [`HistoryEntry`], merged and
/// size-capped once complete. Gaps in received epochs are tracked so that a missing window can
/// be requested from this worker's parent via a [`Subscription`]; other workers may in turn
/// subscribe to windows held here.
pub struct ClauseHistory {
    setup:         ClauseHistorySetup,
    history:       Vec<HistoryEntry>,
    missing_epoch_ranges: Vec<(u32, u32)>,
    latest_epoch:  Option<u32>,
    subscribers:   Vec<Subscription>,
    subscription:  Option<Subscription>,
}

impl ClauseHistory {
    #[must_use]
    pub fn new(setup: ClauseHistorySetup) -> Self {
        Self {
            setup,
            history: Vec::new(),
            missing_epoch_ranges: Vec::new(),
            latest_epoch: None,
            subscribers: Vec::new(),
            subscription: None,
        }
    }

    fn epoch_to_index_and_offset(&self, epoch: u32) -> (usize, usize) {
        let factor = self.setup.aggregation_factor as u32;
        ((epoch / factor) as usize, (epoch % factor) as usize)
    }

    fn index_to_first_epoch(&self, index: usize) -> u32 {
        (index * self.setup.aggregation_factor) as u32
    }

    fn is_shortterm_memory(&self, index: usize) -> bool {
        let Some(latest) = self.latest_epoch else { return true };
        let (latest_index, _) = self.epoch_to_index_and_offset(latest);
        latest_index.saturating_sub(index) <= self.setup.num_shortterm_slots
    }

    fn is_batch_complete(&self, index: usize) -> bool {
        self.history.get(index).is_some_and(HistoryEntry::is_complete)
    }

    fn is_epoch_present(&self, epoch: u32) -> bool {
        let (index, offset) = self.epoch_to_index_and_offset(epoch);
        self.history.get(index).is_some_and(|entry| entry.is_aggregated(offset))
    }

    /// Send every subscriber's next window once it has finished aggregating, oldest first.
    /// Call periodically; not too often, so downstream nodes have time to digest each batch.
    pub fn send_next_batches(&mut self, mut send: impl FnMut(WorkerId, u32, Vec<i32>)) {
        let mut i = 0;
        while i < self.subscribers.len() {
            let next_index = self.subscribers[i].next_index;
            if !self.is_batch_complete(next_index) {
                i += 1;
                continue;
            }
            let epoch = self.index_to_first_epoch(next_index);
            let buf = self.history[next_index].clauses[0].clone();
            send(self.subscribers[i].corresponding, epoch, buf);

            self.subscribers[i].next_index += 1;
            if self.subscribers[i].next_index == self.subscribers[i].end_index {
                trace!(rank = ?self.subscribers[i].corresponding, "subscription finished");
                self.subscribers.remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Record a received window of clauses for `epoch`. `entire_index` means the sender already
    /// held a fully-aggregated window (so every constituent epoch counts as present at once).
    ///
    /// Returns a [`SubscribeRequest`] if this call caused this worker to open (or re-open) a
    /// subscription to `parent` for a still-missing range of windows.
    pub fn add_epoch(
        &mut self,
        epoch:         u32,
        clauses:       Vec<i32>,
        entire_index:  bool,
        parent:        Option<WorkerId>,
    ) -> Option<SubscribeRequest> {
        let (index, offset) = self.epoch_to_index_and_offset(epoch);

        if !self.is_epoch_present(epoch) {
            while index >= self.history.len() {
                self.history.push(HistoryEntry::new(self.setup.aggregation_factor));
            }
            self.history[index].clauses.push(clauses);
            if entire_index {
                self.history[index].mark_entirely_aggregated();
            } else {
                self.history[index].mark_aggregated(offset);
            }

            if self.is_batch_complete(index) {
                let limit = if self.is_shortterm_memory(index) {
                    self.setup.shortterm_buffer_size
                } else {
                    self.setup.longterm_buffer_size
                };
                self.merge_window(index, limit);
            }
        }

        self.shrink_missing_ranges();

        let next_expected = self.latest_epoch.map_or(0, |e| e + 1);
        if epoch > next_expected {
            if let Some(last) = self.missing_epoch_ranges.last_mut().filter(|r| r.1 == next_expected) {
                last.1 = epoch + 1;
            } else {
                self.missing_epoch_ranges.push((next_expected, epoch + 1));
            }
        }

        if let Some(sub) = &mut self.subscription {
            sub.next_index = index + 1;
            if sub.next_index == sub.end_index {
                self.subscription = None;
            }
        }

        let mut request = None;
        if self.subscription.is_none() {
            if let (Some(&(from, to)), Some(parent)) = (self.missing_epoch_ranges.first(), parent) {
                let next_index = self.epoch_to_index_and_offset(from).0;
                let end_index = self.epoch_to_index_and_offset(to).0;
                self.subscription = Some(Subscription { corresponding: parent, next_index, end_index });
                request = Some(SubscribeRequest { to: parent, begin_index: next_index, end_index });
            }
        }

        let prev_latest = self.latest_epoch;
        self.latest_epoch = Some(self.latest_epoch.map_or(epoch, |latest| latest.max(epoch)));

        if self.latest_epoch != prev_latest {
            self.shrink_stale_shortterm_window();
        }

        request
    }

    fn merge_window(&mut self, index: usize, limit: usize) {
        let merger = BufferMerger::new(self.setup.layout);
        let refs: Vec<&[i32]> = self.history[index].clauses.iter().map(Vec::as_slice).collect();
        let (merged, excess) = merger.merge(&refs, limit);
        if !excess.is_empty() {
            trace!(index, dropped = excess.len(), "history window merge exceeded its size limit");
        }
        self.history[index].clauses = vec![merged];
    }

    fn shrink_missing_ranges(&mut self) {
        let mut ranges = std::mem::take(&mut self.missing_epoch_ranges);
        ranges.retain_mut(|(from, to)| {
            while *from < *to && self.is_epoch_present(*from) {
                *from += 1;
            }
            while *from < *to && self.is_epoch_present(*to - 1) {
                *to -= 1;
            }
            *from < *to
        });
        self.missing_epoch_ranges = ranges;
    }

    fn shrink_stale_shortterm_window(&mut self) {
        let Some(latest) = self.latest_epoch else { return };
        let (latest_index, _) = self.epoch_to_index_and_offset(latest);
        if latest_index < self.setup.num_shortterm_slots {
            return;
        }
        let index_to_reduce = latest_index - self.setup.num_shortterm_slots;
        if !self.is_batch_complete(index_to_reduce) {
            return;
        }
        let merged_len = self.history[index_to_reduce].clauses[0].len();
        if merged_len > self.setup.longterm_buffer_size {
            self.merge_window(index_to_reduce, self.setup.longterm_buffer_size);
        }
    }

    /// A peer asked to receive windows `[begin_index, end_index)`.
    pub fn on_subscribe(&mut self, source: WorkerId, begin_index: usize, end_index: usize) {
        self.subscribers.push(Subscription { corresponding: source, next_index: begin_index, end_index });
    }

    /// A peer no longer wants its subscription served.
    pub fn on_unsubscribe(&mut self, source: WorkerId) {
        self.subscribers.retain(|sub| sub.corresponding != source);
    }

    /// Called when the owning job suspends. Returns the peer to notify (if this worker had an
    /// active upward subscription), so the caller can send it an unsubscribe message.
    pub fn on_suspend(&mut self) -> Option<WorkerId> {
        self.subscription.take().map(|sub| sub.corresponding)
    }
}
