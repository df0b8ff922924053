/// Configuration-time errors. Once a [`crate::Job`] is running, no clause-sharing outcome is
/// ever surfaced as a `Result` to the caller: capacity failures, filter rejections, and revision
/// mismatches are all folded into [`sharing_manager::SharingStatistics`] counters, and invariant
/// violations (e.g. a malformed LBD) panic rather than propagate, matching the original's
/// "no error aborts the job" policy.
#[derive(Debug, thiserror::Error)]
pub enum SharingError {
    #[error("clauseBufferDiscountFactor must be in (0, 1], got {0}")]
    InvalidDiscountFactor(f64),
    #[error("qualityClauseLengthLimit ({quality}) must not exceed strictClauseLengthLimit ({strict})")]
    QualityLengthExceedsStrictLimit { quality: u32, strict: u32 },
    #[error("qualityLbdLimit ({quality}) must not exceed strictLbdLimit ({strict})")]
    QualityLbdExceedsStrictLimit { quality: u32, strict: u32 },
    #[error("maxLbdPartitioningSize ({max_lbd_partitioned}) must not exceed strictClauseLengthLimit ({strict})")]
    PartitioningSizeExceedsStrictLimit { max_lbd_partitioned: u32, strict: u32 },
    #[error("numSolvers must be at least 1")]
    NoSolvers,
}
