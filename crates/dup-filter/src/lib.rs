//! Approximate, concurrency-safe duplicate filtering for shared clauses.
//!
//! A [`DuplicateFilterSet`] holds one [`BloomFilter`] per clause length, since two clauses of
//! different lengths can never be identical. False positives (treating a novel clause as a
//! duplicate) are tolerated at the filter's configured rate; false negatives never occur.

mod bloom;
mod set;

pub use bloom::BloomFilter;
pub use set::{DuplicateFilterSet, DuplicateFilterSetup};
