use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{trace, warn};

use crate::buffer::{encode, BufferMerger, BufferReader};
use crate::chunk::{Chunk, FreeChunkPool};
use crate::clause::Clause;
use crate::slot::{ClauseSlot, SlotLayout};


/// Construction parameters for a [`ClauseDatabase`], named after the configuration keys in
/// the sharing subsystem's configuration (`strictClauseLengthLimit`, `maxLbdPartitioningSize`,
/// `numChunksForExport`, `groupClausesByLengthLbdSum`).
#[derive(Debug, Clone, Copy)]
pub struct ClauseDatabaseSetup {
    pub strict_clause_length_limit: u32,
    pub max_lbd_partitioned_size:   u32,
    pub group_by_length_lbd_sum:    bool,
    pub num_chunks:                 usize,
    pub chunk_capacity_literals:    usize,
}

impl ClauseDatabaseSetup {
    fn layout(&self) -> SlotLayout {
        SlotLayout {
            strict_clause_length_limit: self.strict_clause_length_limit,
            max_lbd_partitioned_size:   self.max_lbd_partitioned_size,
            group_by_length_lbd_sum:    self.group_by_length_lbd_sum,
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    /// Chunks currently owned by this slot, oldest first.
    chunks: VecDeque<Chunk>,
}

/// Running counters, exposed for the host's statistics surface. Never consulted for
/// correctness; purely observational.
#[derive(Debug, Default)]
pub struct ClauseDatabaseStats {
    pub admitted: AtomicU64,
    pub dropped_capacity: AtomicU64,
    pub evicted_clauses: AtomicU64,
}

/// Bounded, multi-producer clause database, slotted by `(length, LBD)`.
///
/// See the module-level documentation of [`crate`] for the wire format used by
/// [`ClauseDatabase::export_buffer`] and [`ClauseDatabase::buffer_reader`].
pub struct ClauseDatabase {
    layout:     SlotLayout,
    slots:      RwLock<HashMap<ClauseSlot, Mutex<SlotState>>>,
    free_pool:  FreeChunkPool,
    chunk_capacity_literals: usize,
    stats:      ClauseDatabaseStats,
}

impl ClauseDatabase {
    #[must_use]
    pub fn new(setup: ClauseDatabaseSetup) -> Self {
        Self {
            layout:    setup.layout(),
            slots:     RwLock::new(HashMap::new()),
            free_pool: FreeChunkPool::new(setup.num_chunks, setup.chunk_capacity_literals),
            chunk_capacity_literals: setup.chunk_capacity_literals,
            stats:     ClauseDatabaseStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> &ClauseDatabaseStats {
        &self.stats
    }

    #[must_use]
    pub fn layout(&self) -> SlotLayout {
        self.layout
    }

    fn slot_for(&self, clause: &Clause) -> ClauseSlot {
        self.layout.slot_for(clause.len() as u32, clause.lbd())
    }

    fn with_slot<R>(&self, slot: ClauseSlot, f: impl FnOnce(&mut SlotState) -> R) -> R {
        {
            let slots = self.slots.read();
            if let Some(state) = slots.get(&slot) {
                return f(&mut state.lock());
            }
        }
        let mut slots = self.slots.write();
        let state = slots.entry(slot).or_default();
        let result = f(&mut state.lock());
        result
    }

    /// Insert `clause` into its slot. Per `producerId`, calls are serialized by the per-slot
    /// lock; different producers may contend on the same slot but never corrupt it.
    ///
    /// Returns `false` (and counts a capacity drop) if the database had no room: the slot's
    /// current chunk was full, the free pool was empty, and no worse slot could be evicted from.
    #[must_use]
    #[tracing::instrument(skip(self, clause), fields(len = clause.len(), lbd = clause.lbd()))]
    pub fn add_clause(&self, _producer_id: u32, clause: Clause) -> bool {
        let slot = self.slot_for(&clause);
        let inserted = self.with_slot(slot, |state| Self::insert_into_slot(state, clause, &self.free_pool));

        let inserted = match inserted {
            Ok(()) => true,
            Err(clause) => self.try_evict_and_insert(slot, clause),
        };

        if inserted {
            self.stats.admitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.dropped_capacity.fetch_add(1, Ordering::Relaxed);
        }
        inserted
    }

    fn insert_into_slot(
        state:     &mut SlotState,
        clause:    Clause,
        free_pool: &FreeChunkPool,
    ) -> Result<(), Clause> {
        if let Some(chunk) = state.chunks.back_mut() {
            match chunk.try_push(clause) {
                Ok(()) => return Ok(()),
                Err(clause) => {
                    if let Some(mut fresh) = free_pool.try_get() {
                        fresh.try_push(clause).expect("fresh chunk always has room");
                        state.chunks.push_back(fresh);
                        return Ok(());
                    }
                    return Err(clause);
                }
            }
        }
        let Some(mut fresh) = free_pool.try_get() else { return Err(clause) };
        fresh.try_push(clause).expect("fresh chunk always has room");
        state.chunks.push_back(fresh);
        Ok(())
    }

    /// Evict one chunk from the worst slot holding at least two chunks, freeing it up for
    /// `slot`, then retries the insertion once.
    fn try_evict_and_insert(&self, slot: ClauseSlot, clause: Clause) -> bool {
        let worst = self.find_evictable_slot();
        let Some(worst_slot) = worst else { return false };

        let freed = self.with_slot(worst_slot, |state| {
            state.chunks.pop_front().map(|mut chunk| {
                let dropped = chunk.drain_all();
                self.stats.evicted_clauses.fetch_add(dropped.len() as u64, Ordering::Relaxed);
                warn!(?worst_slot, dropped = dropped.len(), "evicted chunk to make room");
                chunk
            })
        });

        let Some(mut chunk) = freed else { return false };
        chunk.try_push(clause).expect("freshly-cleared chunk always has room");
        self.with_slot(slot, |state| state.chunks.push_back(chunk));
        true
    }

    fn find_evictable_slot(&self) -> Option<ClauseSlot> {
        let slots = self.slots.read();
        self.layout.canonical_slots().into_iter().rev().find(|slot| {
            slots.get(slot).is_some_and(|state| state.lock().chunks.len() >= 2)
        })
    }

    /// Insert each clause in `clauses` under `virtual_producer_id`, but only those accepted by
    /// `admit` (typically the process-wide duplicate filter).
    pub fn bulk_add_clauses(
        &self,
        virtual_producer_id: u32,
        clauses:             Vec<Clause>,
        mut admit:           impl FnMut(&Clause) -> bool,
    ) {
        for clause in clauses {
            if admit(&clause) {
                let _ = self.add_clause(virtual_producer_id, clause);
            }
        }
    }

    /// Drain clauses from slots in quality order until the literal budget `total_literal_limit`
    /// is reached; whatever does not fit stays in the database. Returns the packed buffer and
    /// the number of clauses it contains.
    #[tracing::instrument(skip(self))]
    pub fn export_buffer(&self, total_literal_limit: usize) -> (Vec<i32>, usize) {
        let mut budget = total_literal_limit;
        let mut drained: HashMap<ClauseSlot, Vec<Clause>> = HashMap::new();
        let mut total_count = 0_usize;

        for slot in self.layout.canonical_slots() {
            if budget == 0 {
                break;
            }
            let taken = self.with_slot(slot, |state| {
                let mut taken = Vec::new();
                while let Some(chunk) = state.chunks.front_mut() {
                    while budget > 0 {
                        let Some(clause) = Self::pop_if_affordable(chunk, budget) else { break };
                        budget -= clause.len();
                        taken.push(clause);
                    }
                    if chunk.is_empty() {
                        let spent = state.chunks.pop_front().expect("front just observed Some");
                        self.free_pool.release(spent);
                    } else {
                        break;
                    }
                    if budget == 0 {
                        break;
                    }
                }
                taken
            });
            total_count += taken.len();
            drained.insert(slot, taken);
        }

        trace!(exported = total_count, "exported clause buffer");
        let buf = encode(&self.layout, |slot| {
            drained.get(&slot).map(Vec::as_slice).unwrap_or(&[])
        });
        (buf, total_count)
    }

    /// Pop the first clause from `chunk` if it fits within `budget` literals, by rebuilding the
    /// chunk without it (chunks are small, bounded by `chunk_capacity_literals`, so this is
    /// cheap relative to the lock already held).
    fn pop_if_affordable(chunk: &mut Chunk, budget: usize) -> Option<Clause> {
        let first_len = chunk.clauses().first()?.len();
        if first_len > budget {
            return None;
        }
        let mut rest = chunk.drain_all();
        let clause = rest.remove(0);
        for remaining in rest {
            chunk.try_push(remaining).expect("chunk had room for its own prior contents");
        }
        Some(clause)
    }

    #[must_use]
    pub fn buffer_reader<'a>(&self, data: &'a [i32]) -> BufferReader<'a> {
        BufferReader::new(self.layout, data)
    }

    #[must_use]
    pub fn buffer_merger(&self) -> BufferMerger {
        BufferMerger::new(self.layout)
    }

    #[must_use]
    pub fn chunk_capacity_literals(&self) -> usize {
        self.chunk_capacity_literals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> ClauseDatabaseSetup {
        ClauseDatabaseSetup {
            strict_clause_length_limit: 10,
            max_lbd_partitioned_size:   10,
            group_by_length_lbd_sum:    false,
            num_chunks:                 4,
            chunk_capacity_literals:    16,
        }
    }

    #[test]
    fn add_and_export_round_trips() {
        let db = ClauseDatabase::new(setup());
        assert!(db.add_clause(0, Clause::new(vec![1, 2], 2)));
        assert!(db.add_clause(0, Clause::new(vec![3], 1)));

        let (buf, count) = db.export_buffer(100);
        assert_eq!(count, 2);
        let mut reader = db.buffer_reader(&buf);
        let clauses: Vec<_> = std::iter::from_fn(|| reader.next_clause()).collect();
        assert_eq!(clauses.len(), 2);
    }

    #[test]
    fn export_respects_literal_budget_and_leaves_remainder() {
        let db = ClauseDatabase::new(setup());
        for _ in 0..3 {
            assert!(db.add_clause(0, Clause::new(vec![1], 1)));
        }
        let (_, count) = db.export_buffer(2);
        assert_eq!(count, 2, "only two unit clauses fit in a 2-literal budget");
        let (_, count2) = db.export_buffer(100);
        assert_eq!(count2, 1, "remaining clause should still be in the database");
    }

    #[test]
    fn eviction_frees_a_chunk_from_the_worst_slot() {
        let setup = ClauseDatabaseSetup {
            num_chunks: 2,
            chunk_capacity_literals: 2,
            ..setup()
        };
        let db = ClauseDatabase::new(setup);
        // Fill both chunks with the worst (highest length/lbd) slot first.
        assert!(db.add_clause(0, Clause::new(vec![1, 2, 3, 4], 4)));
        assert!(db.add_clause(0, Clause::new(vec![5, 6, 7, 8], 4)));
        assert_eq!(db.stats().evicted_clauses.load(Ordering::Relaxed), 0);

        // A higher-quality (shorter) clause should evict from the full, worse slot.
        assert!(db.add_clause(0, Clause::new(vec![9], 1)));
        assert!(db.stats().evicted_clauses.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn full_db_with_no_evictable_slot_rejects() {
        let setup = ClauseDatabaseSetup {
            num_chunks: 1,
            chunk_capacity_literals: 1,
            ..setup()
        };
        let db = ClauseDatabase::new(setup);
        assert!(db.add_clause(0, Clause::new(vec![1], 1)));
        // Only one chunk total and it's the sole holder of its slot: nothing to evict from.
        assert!(!db.add_clause(0, Clause::new(vec![2], 1)));
        assert_eq!(db.stats().dropped_capacity.load(Ordering::Relaxed), 1);
    }
}
