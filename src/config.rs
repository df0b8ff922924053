use std::time::Duration;

use clause_db::ClauseDatabaseSetup;
use clause_history::ClauseHistorySetup;
use dup_filter::DuplicateFilterSetup;
use sharing_manager::{ClauseFilterClearInterval, SharingManagerSetup};

use crate::error::SharingError;

/// Every recognized configuration option for one job's clause-sharing subsystem, deserializable
/// from whatever config format the owning process uses (grounded on the options-builder pattern
/// in `inner_leveldb/builder.rs`, adapted here to a flat `serde`-deserializable struct since there
/// is no generics-over-backend axis to build against).
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Configuration {
    pub worker_id: u32,
    pub job_id:    u32,
    pub num_solvers: usize,

    pub aggregation_factor:      usize,
    pub history_short_term_slots: usize,
    pub collect_clause_history:  bool,

    pub clause_buffer_base_size:      usize,
    pub clause_buffer_discount_factor: f64,

    pub strict_clause_length_limit:  u32,
    pub strict_lbd_limit:            u32,
    pub quality_clause_length_limit: u32,
    pub quality_lbd_limit:           u32,
    pub max_lbd_partitioning_size:   u32,
    pub group_clauses_by_length_lbd_sum: bool,

    pub num_chunks_for_export:      usize,
    pub chunk_capacity_literals:    usize,

    /// Seconds between duplicate-filter clears; `0` means every epoch, negative means never.
    pub clause_filter_clear_interval_secs: i64,

    pub use_checksums: bool,

    pub filter_expected_items_per_length: usize,
    pub filter_bits_per_item:             u8,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            worker_id: 0,
            job_id:    0,
            num_solvers: 1,

            aggregation_factor: 4,
            history_short_term_slots: 2,
            collect_clause_history: false,

            clause_buffer_base_size: 1500,
            clause_buffer_discount_factor: 0.25,

            strict_clause_length_limit: 50,
            strict_lbd_limit: 50,
            quality_clause_length_limit: 8,
            quality_lbd_limit: 8,
            max_lbd_partitioning_size: 8,
            group_clauses_by_length_lbd_sum: false,

            num_chunks_for_export: 256,
            chunk_capacity_literals: 1024,

            clause_filter_clear_interval_secs: 0,

            use_checksums: false,

            filter_expected_items_per_length: 10_000,
            filter_bits_per_item: 10,
        }
    }
}

impl Configuration {
    /// Builder-style setter, mirroring `inner_leveldb/builder.rs`'s fluent options pattern.
    #[must_use]
    pub fn with_num_solvers(mut self, num_solvers: usize) -> Self {
        self.num_solvers = num_solvers;
        self
    }

    #[must_use]
    pub fn with_worker_id(mut self, worker_id: u32) -> Self {
        self.worker_id = worker_id;
        self
    }

    #[must_use]
    pub fn with_job_id(mut self, job_id: u32) -> Self {
        self.job_id = job_id;
        self
    }

    #[must_use]
    pub fn with_collect_clause_history(mut self, collect: bool) -> Self {
        self.collect_clause_history = collect;
        self
    }

    pub fn validate(&self) -> Result<(), SharingError> {
        if self.num_solvers == 0 {
            return Err(SharingError::NoSolvers);
        }
        if !(0.0 < self.clause_buffer_discount_factor && self.clause_buffer_discount_factor <= 1.0) {
            return Err(SharingError::InvalidDiscountFactor(self.clause_buffer_discount_factor));
        }
        if self.quality_clause_length_limit > self.strict_clause_length_limit {
            return Err(SharingError::QualityLengthExceedsStrictLimit {
                quality: self.quality_clause_length_limit,
                strict:  self.strict_clause_length_limit,
            });
        }
        if self.quality_lbd_limit > self.strict_lbd_limit {
            return Err(SharingError::QualityLbdExceedsStrictLimit {
                quality: self.quality_lbd_limit,
                strict:  self.strict_lbd_limit,
            });
        }
        if self.max_lbd_partitioning_size > self.strict_clause_length_limit {
            return Err(SharingError::PartitioningSizeExceedsStrictLimit {
                max_lbd_partitioned: self.max_lbd_partitioning_size,
                strict:              self.strict_clause_length_limit,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn clause_database_setup(&self) -> ClauseDatabaseSetup {
        ClauseDatabaseSetup {
            strict_clause_length_limit: self.strict_clause_length_limit,
            max_lbd_partitioned_size:   self.max_lbd_partitioning_size,
            group_by_length_lbd_sum:    self.group_clauses_by_length_lbd_sum,
            num_chunks:                 self.num_chunks_for_export,
            chunk_capacity_literals:    self.chunk_capacity_literals,
        }
    }

    #[must_use]
    pub fn layout(&self) -> clause_db::SlotLayout {
        clause_db::SlotLayout {
            strict_clause_length_limit: self.strict_clause_length_limit,
            max_lbd_partitioned_size:   self.max_lbd_partitioning_size,
            group_by_length_lbd_sum:    self.group_clauses_by_length_lbd_sum,
        }
    }

    #[must_use]
    pub fn duplicate_filter_setup(&self) -> DuplicateFilterSetup {
        DuplicateFilterSetup {
            expected_items_per_length: self.filter_expected_items_per_length,
            bits_per_item:             self.filter_bits_per_item,
        }
    }

    #[must_use]
    pub fn clear_interval(&self) -> ClauseFilterClearInterval {
        match self.clause_filter_clear_interval_secs {
            0 => ClauseFilterClearInterval::Always,
            n if n < 0 => ClauseFilterClearInterval::Never,
            n => ClauseFilterClearInterval::Periodic(Duration::from_secs(n as u64)),
        }
    }

    #[must_use]
    pub fn sharing_manager_setup(&self) -> SharingManagerSetup {
        SharingManagerSetup {
            cdb:            self.clause_database_setup(),
            filter:         self.duplicate_filter_setup(),
            num_solvers:    self.num_solvers,
            clear_interval: self.clear_interval(),
        }
    }

    #[must_use]
    pub fn clause_history_setup(&self) -> ClauseHistorySetup {
        ClauseHistorySetup {
            aggregation_factor:    self.aggregation_factor,
            num_shortterm_slots:   self.history_short_term_slots,
            shortterm_buffer_size: self.clause_buffer_base_size,
            longterm_buffer_size:  self.clause_buffer_base_size / 4,
            layout: self.layout(),
        }
    }

    /// The packed-buffer literal budget for a subtree of `num_aggregated` contributing workers:
    /// the base size, plus a geometrically-discounted allowance per additional worker beyond the
    /// first (`clauseBufferDiscountFactor` damps how much each extra worker adds).
    #[must_use]
    pub fn clause_buffer_limit(&self, num_aggregated: usize) -> usize {
        let extra = num_aggregated.saturating_sub(1) as f64;
        let allowance = self.clause_buffer_base_size as f64 * self.clause_buffer_discount_factor * extra;
        self.clause_buffer_base_size + allowance.round() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Configuration::default().validate().unwrap();
    }

    #[test]
    fn quality_limit_above_strict_limit_is_rejected() {
        let config = Configuration { quality_clause_length_limit: 100, ..Configuration::default() };
        assert!(matches!(config.validate(), Err(SharingError::QualityLengthExceedsStrictLimit { .. })));
    }

    #[test]
    fn discount_factor_out_of_range_is_rejected() {
        let config = Configuration { clause_buffer_discount_factor: 0.0, ..Configuration::default() };
        assert!(matches!(config.validate(), Err(SharingError::InvalidDiscountFactor(_))));
        let config = Configuration { clause_buffer_discount_factor: 1.5, ..Configuration::default() };
        assert!(matches!(config.validate(), Err(SharingError::InvalidDiscountFactor(_))));
    }

    #[test]
    fn buffer_limit_grows_with_tree_size() {
        let config = Configuration::default();
        let solo = config.clause_buffer_limit(1);
        let grown = config.clause_buffer_limit(4);
        assert_eq!(solo, config.clause_buffer_base_size);
        assert!(grown > solo, "a larger aggregated subtree should get a larger budget");
    }

    #[test]
    fn deserializes_from_partial_json() {
        let config: Configuration = serde_json::from_str(r#"{"numSolvers": 4, "workerId": 2}"#).unwrap();
        assert_eq!(config.num_solvers, 4);
        assert_eq!(config.worker_id, 2);
        assert_eq!(config.aggregation_factor, Configuration::default().aggregation_factor);
    }
}
