/// One history window: the clauses exported for every epoch in the window, until the window is
/// complete, at which point they collapse into a single merged buffer.
#[derive(Debug, Clone, Default)]
pub struct HistoryEntry {
    /// One packed buffer per constituent epoch received so far; collapses to exactly one
    /// element once [`HistoryEntry::num_aggregated`] reaches the window's aggregation factor.
    pub clauses:    Vec<Vec<i32>>,
    aggregated: Vec<bool>,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(aggregation_factor: usize) -> Self {
        Self { clauses: Vec::new(), aggregated: vec![false; aggregation_factor] }
    }

    #[must_use]
    pub fn num_aggregated(&self) -> usize {
        self.aggregated.iter().filter(|&&b| b).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_aggregated() == 0
    }

    pub fn mark_aggregated(&mut self, offset: usize) {
        self.aggregated[offset] = true;
    }

    #[must_use]
    pub fn is_aggregated(&self, offset: usize) -> bool {
        self.aggregated[offset]
    }

    pub fn mark_entirely_aggregated(&mut self) {
        self.aggregated.iter_mut().for_each(|flag| *flag = true);
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.num_aggregated() == self.aggregated.len()
    }
}
