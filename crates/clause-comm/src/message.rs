/// Message tags distinguishing the two tree all-reduces a [`crate::Session`] drives.
pub const TAG_ALLREDUCE_CLAUSES: u32 = 0;
pub const TAG_ALLREDUCE_FILTER: u32 = 1;
