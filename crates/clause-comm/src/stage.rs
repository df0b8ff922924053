/// One session's position in the per-epoch sharing state machine. Computed from the two
/// underlying all-reduces' own phases rather than tracked independently, so it can never drift
/// out of sync with what the session is actually doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    PreparingClauses,
    Merging,
    WaitingForClauseBcast,
    PreparingFilter,
    WaitingForFilterBcast,
    Done,
}
