//! Slot partitioning for the clause database.
//!
//! Clauses up to `max_lbd_partitioned_size` literals get one slot per exact `(length, lbd)`
//! pair. Longer clauses either get one slot per `length` (any LBD), or, when
//! `group_by_length_lbd_sum` is set, are bucketed purely by `length + lbd` across lengths — this
//! is the `groupClausesByLengthLbdSum` knob. Slots are produced in descending quality order
//! (best first): shorter/lower-LBD slots before longer/higher-LBD or higher-sum ones.

/// Identifies one partition of the clause database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClauseSlot {
    /// All clauses of exactly `length` literals and exactly `lbd`.
    ExactLengthLbd { length: u32, lbd: u32 },
    /// All clauses of exactly `length` literals, any valid LBD. Used above
    /// `max_lbd_partitioned_size` when not grouping by sum.
    LengthOnly { length: u32 },
    /// All clauses whose `length + lbd == sum`, regardless of length. Used above
    /// `max_lbd_partitioned_size` when grouping by sum.
    SumBucket { sum: u32 },
}

impl ClauseSlot {
    /// A rough quality key: smaller sorts better. Used only to order the canonical slot list;
    /// actual encode/decode never compares slots by this key.
    fn quality_key(self) -> (u8, u32, u32) {
        match self {
            Self::ExactLengthLbd { length, lbd } => (0, length, lbd),
            Self::LengthOnly { length }          => (1, length, 0),
            Self::SumBucket { sum }              => (1, sum, 0),
        }
    }
}

/// Shared parameters governing how clauses are assigned to slots, and in which order slots are
/// iterated (for export, eviction, and buffer decoding).
#[derive(Debug, Clone, Copy)]
pub struct SlotLayout {
    pub strict_clause_length_limit: u32,
    pub max_lbd_partitioned_size:   u32,
    pub group_by_length_lbd_sum:    bool,
}

impl SlotLayout {
    /// The slot a clause of the given `length`/`lbd` belongs to.
    #[must_use]
    pub fn slot_for(&self, length: u32, lbd: u32) -> ClauseSlot {
        if length <= self.max_lbd_partitioned_size {
            ClauseSlot::ExactLengthLbd { length, lbd }
        } else if self.group_by_length_lbd_sum {
            ClauseSlot::SumBucket { sum: length + lbd }
        } else {
            ClauseSlot::LengthOnly { length }
        }
    }

    /// Every slot that can possibly hold a clause obeying `strict_clause_length_limit`, in
    /// descending quality order (best first). Both the writer and reader of a packed buffer
    /// iterate slots in this exact order, which is what lets the wire format omit an explicit
    /// slot identifier per slot header.
    #[must_use]
    pub fn canonical_slots(&self) -> Vec<ClauseSlot> {
        let mut slots = Vec::new();

        let partitioned_limit = self.max_lbd_partitioned_size.min(self.strict_clause_length_limit);
        for length in 1..=partitioned_limit {
            let lbd_range = if length == 1 { 1..=1 } else { 2..=length };
            for lbd in lbd_range {
                slots.push(ClauseSlot::ExactLengthLbd { length, lbd });
            }
        }

        if self.strict_clause_length_limit > self.max_lbd_partitioned_size {
            if self.group_by_length_lbd_sum {
                let min_sum = self.max_lbd_partitioned_size + 1 + 2;
                let max_sum = 2 * self.strict_clause_length_limit;
                for sum in min_sum..=max_sum {
                    slots.push(ClauseSlot::SumBucket { sum });
                }
            } else {
                for length in (self.max_lbd_partitioned_size + 1)..=self.strict_clause_length_limit {
                    slots.push(ClauseSlot::LengthOnly { length });
                }
            }
        }

        slots.sort_by_key(|slot| slot.quality_key());
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_slots_obey_lbd_invariant() {
        let layout = SlotLayout {
            strict_clause_length_limit: 5,
            max_lbd_partitioned_size:   5,
            group_by_length_lbd_sum:    false,
        };
        let slots = layout.canonical_slots();
        assert!(slots.contains(&ClauseSlot::ExactLengthLbd { length: 1, lbd: 1 }));
        assert!(!slots.iter().any(|s| matches!(s, ClauseSlot::ExactLengthLbd { length: 1, lbd } if *lbd != 1)));
        assert!(slots.contains(&ClauseSlot::ExactLengthLbd { length: 3, lbd: 2 }));
        assert!(slots.contains(&ClauseSlot::ExactLengthLbd { length: 3, lbd: 3 }));
    }

    #[test]
    fn quality_order_is_ascending() {
        let layout = SlotLayout {
            strict_clause_length_limit: 4,
            max_lbd_partitioned_size:   2,
            group_by_length_lbd_sum:    true,
        };
        let slots = layout.canonical_slots();
        // Exact slots (length <= 2) come first.
        let first_sum_idx = slots.iter().position(|s| matches!(s, ClauseSlot::SumBucket { .. }));
        let last_exact_idx = slots.iter().rposition(|s| matches!(s, ClauseSlot::ExactLengthLbd { .. }));
        assert!(last_exact_idx < first_sum_idx);
    }

    #[test]
    fn slot_for_respects_partitioning_threshold() {
        let layout = SlotLayout {
            strict_clause_length_limit: 10,
            max_lbd_partitioned_size:   3,
            group_by_length_lbd_sum:    true,
        };
        assert_eq!(layout.slot_for(2, 2), ClauseSlot::ExactLengthLbd { length: 2, lbd: 2 });
        assert_eq!(layout.slot_for(5, 3), ClauseSlot::SumBucket { sum: 8 });
    }
}
