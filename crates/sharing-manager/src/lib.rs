//! Per-job clause sharing orchestration.
//!
//! A [`SharingManager`] sits between solver threads (which feed it learned clauses via
//! [`SharingManager::learned_clause_callback`]) and the sharing protocol that periodically
//! exports ([`SharingManager::prepare_sharing`]) and imports
//! ([`SharingManager::digest_sharing`]) packed clause buffers across the job.

mod future_clauses;
mod histogram;
mod host;
mod manager;
mod stats;

pub use histogram::ClauseHistogram;
pub use host::SolverHost;
pub use manager::{ClauseFilterClearInterval, SharingManager, SharingManagerSetup};
pub use stats::SharingStatistics;
