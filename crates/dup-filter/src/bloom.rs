//! A concurrently-registerable Bloom filter over clause literal sequences.
//!
//! The hash function is the LevelDB/anchored-sstable Bloom hash, adapted to operate directly on
//! `i32` literal words instead of a byte buffer (a clause's literals are already fixed-width
//! words, so no byte-chunking step is needed). Unlike a batch-built filter, bits are set with
//! atomic fetch-or so that [`BloomFilter::register`] can run from any number of solver threads
//! at once without external locking.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const WORD_BITS: u32 = u64::BITS;

fn literal_hash(literals: &[i32]) -> u32 {
    let seed: u32 = 0x_bc9f_1d34;
    let multiplier: u32 = 0x_c6a4_a793;

    let mut hash = seed ^ (literals.len() as u32).wrapping_mul(multiplier);
    for &lit in literals {
        let word = lit as u32;
        hash = hash.wrapping_add(word).wrapping_mul(multiplier);
        hash ^= hash >> 16;
    }
    hash
}

/// A fixed-size, atomically-updated Bloom filter keyed by a clause's (sorted) literal sequence.
///
/// # Invariants
/// - `num_bits` is always a multiple of [`WORD_BITS`].
/// - False positives (`register` returning `false` for a genuinely novel clause) are possible
///   and tolerated; false negatives never occur.
#[derive(Debug)]
pub struct BloomFilter {
    words:         Vec<AtomicU64>,
    num_bits:      u32,
    num_hashes:    u32,
    pending_clear: AtomicBool,
}

impl BloomFilter {
    /// Size the filter for roughly `expected_items` registrations at `bits_per_item` bits each
    /// (10 bits/item gives a false-positive rate just under 1%, matching the teacher's default).
    #[must_use]
    pub fn new(expected_items: usize, bits_per_item: u8) -> Self {
        let num_hashes = ((f32::from(bits_per_item) * std::f32::consts::LN_2) as u32).clamp(1, 30);

        let unadjusted_bits = expected_items.saturating_mul(bits_per_item as usize).max(64);
        let num_words = unadjusted_bits.div_ceil(WORD_BITS as usize).max(1);
        let num_bits = (num_words as u32) * WORD_BITS;

        Self {
            words: (0..num_words).map(|_| AtomicU64::new(0)).collect(),
            num_bits,
            num_hashes,
            pending_clear: AtomicBool::new(false),
        }
    }

    /// Register `literals` (the clause's sorted literals). Returns `true` if at least one of
    /// this registration's bits was not already set — i.e. the clause is novel with high
    /// confidence. Returns `false` if every bit was already set, meaning the clause is probably
    /// (not certainly) a duplicate.
    pub fn register(&self, literals: &[i32]) -> bool {
        let mut hash = literal_hash(literals);
        let delta = hash.rotate_right(17);
        let mut novel = false;

        for _ in 0..self.num_hashes {
            let bit = hash % self.num_bits;
            let word_idx = (bit / WORD_BITS) as usize;
            let bit_in_word = bit % WORD_BITS;
            let mask = 1_u64 << bit_in_word;

            let previous = self.words[word_idx].fetch_or(mask, Ordering::Relaxed);
            if previous & mask == 0 {
                novel = true;
            }
            hash = hash.wrapping_add(delta);
        }

        novel
    }

    /// Clear every bit immediately.
    pub fn clear(&self) {
        for word in &self.words {
            word.store(0, Ordering::Relaxed);
        }
        self.pending_clear.store(false, Ordering::Relaxed);
    }

    /// Defer a clear to the next call to [`BloomFilter::clear_if_pending`], rather than
    /// invalidating in-flight registrations immediately.
    pub fn set_clear(&self) {
        self.pending_clear.store(true, Ordering::Relaxed);
    }

    /// Perform the clear requested by a prior [`BloomFilter::set_clear`], if any. Called from a
    /// safe point between registration bursts (the sharing manager's periodic interval).
    pub fn clear_if_pending(&self) {
        if self.pending_clear.swap(false, Ordering::Relaxed) {
            self.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registration_is_always_novel() {
        let filter = BloomFilter::new(100, 10);
        assert!(filter.register(&[1, -2, 3]));
    }

    #[test]
    fn repeated_registration_is_detected() {
        let filter = BloomFilter::new(100, 10);
        assert!(filter.register(&[1, -2, 3]));
        assert!(!filter.register(&[1, -2, 3]), "identical literals should be flagged a duplicate");
    }

    #[test]
    fn clear_resets_membership() {
        let filter = BloomFilter::new(100, 10);
        filter.register(&[5, 6]);
        filter.clear();
        assert!(filter.register(&[5, 6]), "after clear, the same clause should look novel again");
    }

    #[test]
    fn set_clear_defers_until_applied() {
        let filter = BloomFilter::new(100, 10);
        filter.register(&[7, 8]);
        filter.set_clear();
        assert!(!filter.register(&[7, 8]), "clear is deferred, so the clause still reads as seen");
        filter.clear_if_pending();
        assert!(filter.register(&[7, 8]), "after the deferred clear runs, it should look novel");
    }
}
