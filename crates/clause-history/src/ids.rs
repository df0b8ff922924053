/// Identifies a peer worker in the job tree (the rank that clauses, subscriptions, and
/// unsubscriptions are addressed to or received from).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct WorkerId(pub u32);
