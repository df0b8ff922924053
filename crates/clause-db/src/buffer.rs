//! The packed clause buffer wire format: a quality-slotted, self-delimiting sequence of
//! non-zero literals with an implicit slot grid shared by writer and reader (see [`SlotLayout`]).
//!
//! For each slot, in descending quality order: a clause-count header, then that many clauses.
//! A clause is `lbd` (omitted for unit clauses) followed by its literals; the slot already fixes
//! either the clause's exact length (`ExactLengthLbd`/`LengthOnly`) or its `length + lbd` sum
//! (`SumBucket`, in which case `length = sum - lbd`), so no explicit length field is ever written.

use std::collections::HashSet;

use crate::clause::Clause;
use crate::slot::{ClauseSlot, SlotLayout};


/// Encode clauses (already bucketed by slot) into a packed buffer, visiting slots in the
/// canonical quality order given by `layout`.
#[must_use]
pub fn encode<'a>(
    layout:        &SlotLayout,
    slot_contents: impl Fn(ClauseSlot) -> &'a [Clause],
) -> Vec<i32> {
    let mut out = Vec::new();
    for slot in layout.canonical_slots() {
        let clauses = slot_contents(slot);
        out.push(clauses.len() as i32);
        for clause in clauses {
            if clause.len() >= 2 {
                out.push(clause.lbd() as i32);
            }
            out.extend_from_slice(clause.literals());
        }
    }
    out
}

/// Reads clauses out of a packed buffer in quality order (best first).
pub struct BufferReader<'a> {
    data:   &'a [i32],
    pos:    usize,
    slots:  std::vec::IntoIter<ClauseSlot>,
    current_slot: Option<(ClauseSlot, u32)>,
}

impl<'a> BufferReader<'a> {
    #[must_use]
    pub fn new(layout: SlotLayout, data: &'a [i32]) -> Self {
        Self {
            slots: layout.canonical_slots().into_iter(),
            data,
            pos: 0,
            current_slot: None,
        }
    }

    /// Read the next clause, or `None` once the buffer is exhausted.
    ///
    /// # Panics
    /// Panics if the buffer is malformed (a zero literal appears mid-clause, or the buffer
    /// truncates mid-clause): this subsystem treats a malformed buffer as a fatal invariant
    /// violation, per the "zero is a reserved sentinel" rule.
    pub fn next_clause(&mut self) -> Option<Clause> {
        loop {
            if let Some((slot, remaining)) = self.current_slot {
                if remaining == 0 {
                    self.current_slot = None;
                    continue;
                }
                self.current_slot = Some((slot, remaining - 1));
                return Some(self.read_one_clause(slot));
            }

            let slot = self.slots.next()?;
            let count = self.take_int("slot clause-count header");
            assert!(count >= 0, "negative clause count in packed buffer");
            self.current_slot = Some((slot, count as u32));
        }
    }

    fn take_int(&mut self, what: &str) -> i32 {
        let value = *self.data.get(self.pos)
            .unwrap_or_else(|| panic!("packed buffer truncated while reading {what}"));
        self.pos += 1;
        value
    }

    fn read_one_clause(&mut self, slot: ClauseSlot) -> Clause {
        let (length, lbd) = match slot {
            ClauseSlot::ExactLengthLbd { length, lbd } => {
                if length >= 2 {
                    let wire_lbd = self.take_int("clause LBD") as u32;
                    debug_assert_eq!(wire_lbd, lbd, "LBD on the wire disagreed with its slot");
                }
                (length, lbd)
            }
            ClauseSlot::LengthOnly { length } => {
                let lbd = if length >= 2 { self.take_int("clause LBD") as u32 } else { 1 };
                (length, lbd)
            }
            ClauseSlot::SumBucket { sum } => {
                let lbd = self.take_int("clause LBD") as u32;
                let length = sum - lbd;
                (length, lbd)
            }
        };

        let mut literals = Vec::with_capacity(length as usize);
        for _ in 0..length {
            let lit = self.take_int("clause literal");
            assert_ne!(lit, 0, "zero literal encountered mid-clause");
            literals.push(lit);
        }
        Clause::from_sorted(literals, lbd)
    }
}

impl<'a> Iterator for BufferReader<'a> {
    type Item = Clause;

    fn next(&mut self) -> Option<Clause> {
        self.next_clause()
    }
}

/// Merges several packed buffers into one, preserving quality order and discarding duplicate
/// clauses (by sorted-literal identity), bounded by a caller-supplied total packed-size limit.
pub struct BufferMerger {
    layout: SlotLayout,
}

/// Clauses that did not fit within a merge's size limit, in the order they were dropped.
pub type ExcessClauses = Vec<Clause>;

impl BufferMerger {
    #[must_use]
    pub fn new(layout: SlotLayout) -> Self {
        Self { layout }
    }

    /// Merge `buffers`, keeping at most `size_limit` packed ints of output. Duplicate clauses
    /// (identical sorted literal sequence) are kept only once, preferring the earliest buffer
    /// that contributed them.
    #[must_use]
    pub fn merge(&self, buffers: &[&[i32]], size_limit: usize) -> (Vec<i32>, ExcessClauses) {
        let mut by_slot: std::collections::BTreeMap<ClauseSlot, Vec<Clause>> =
            std::collections::BTreeMap::new();
        let mut seen: HashSet<Vec<i32>> = HashSet::new();

        for buf in buffers {
            let mut reader = BufferReader::new(self.layout, buf);
            while let Some(clause) = reader.next_clause() {
                if seen.insert(clause.literals().to_vec()) {
                    let slot = self.layout.slot_for(clause.len() as u32, clause.lbd());
                    by_slot.entry(slot).or_default().push(clause);
                }
            }
        }

        let mut out = Vec::new();
        let mut excess = Vec::new();
        for slot in self.layout.canonical_slots() {
            let clauses = by_slot.remove(&slot).unwrap_or_default();
            let count_pos = out.len();
            out.push(0_i32); // placeholder header, patched below
            let mut kept = 0_i32;
            let mut clauses = clauses.into_iter();
            for clause in clauses.by_ref() {
                let encoded_len = if clause.len() >= 2 { clause.len() + 1 } else { clause.len() };
                if out.len() + encoded_len > size_limit {
                    excess.push(clause);
                    continue;
                }
                if clause.len() >= 2 {
                    out.push(clause.lbd() as i32);
                }
                out.extend_from_slice(clause.literals());
                kept += 1;
            }
            excess.extend(clauses);
            out[count_pos] = kept;
        }

        (out, excess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> SlotLayout {
        SlotLayout {
            strict_clause_length_limit: 10,
            max_lbd_partitioned_size:   10,
            group_by_length_lbd_sum:    false,
        }
    }

    #[test]
    fn round_trip_single_clause() {
        let layout = layout();
        let clause = Clause::new(vec![3, -1, 2], 2);
        let by_slot = |slot: ClauseSlot| -> &[Clause] {
            if slot == layout.slot_for(3, 2) {
                std::slice::from_ref(&clause)
            } else {
                &[]
            }
        };
        let buf = encode(&layout, by_slot);
        let mut reader = BufferReader::new(layout, &buf);
        let read_back = reader.next_clause().expect("one clause");
        assert_eq!(read_back.literals(), &[-1, 2, 3]);
        assert_eq!(read_back.lbd(), 2);
        assert!(reader.next_clause().is_none());
    }

    #[test]
    fn unit_clause_has_no_lbd_field() {
        let layout = layout();
        let clause = Clause::new(vec![5], 1);
        let buf = encode(&layout, |slot| {
            if slot == layout.slot_for(1, 1) { std::slice::from_ref(&clause) } else { &[] }
        });
        // header(1) + literal(5), no LBD word, for the unit slot; every other slot's header is 0.
        let nonzero_payload: Vec<i32> = buf.iter().copied().filter(|&x| x != 0).collect();
        assert_eq!(nonzero_payload, vec![1, 5]);
    }

    #[test]
    fn merge_deduplicates_and_respects_limit() {
        let layout = layout();
        let a = Clause::new(vec![1, 2, 3], 2);
        let b = Clause::new(vec![1, 2, 3], 2); // duplicate of a
        let c = Clause::new(vec![4, 5], 2);

        let buf_a = encode(&layout, |slot| {
            if slot == layout.slot_for(3, 2) { std::slice::from_ref(&a) } else { &[] }
        });
        let buf_b = encode(&layout, |slot| {
            if slot == layout.slot_for(3, 2) { std::slice::from_ref(&b) }
            else if slot == layout.slot_for(2, 2) { std::slice::from_ref(&c) }
            else { &[] }
        });

        let merger = BufferMerger::new(layout);
        let (merged, excess) = merger.merge(&[&buf_a, &buf_b], usize::MAX);
        assert!(excess.is_empty());
        let mut reader = BufferReader::new(layout, &merged);
        let clauses: Vec<_> = std::iter::from_fn(|| reader.next_clause()).collect();
        assert_eq!(clauses.len(), 2, "duplicate should have been merged away");
    }
}
