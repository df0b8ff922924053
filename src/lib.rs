//! Wires the clause database, duplicate filters, tree all-reduce, sharing manager, clause
//! history, and epoch communicator into a single per-job handle.
//!
//! A [`Job`] is the unit the owning process drives: it feeds solver-learned clauses in via
//! [`Job::learned_clause_callback`], periodically opens sharing epochs via [`Job::initiate_epoch`]
//! (root only) or [`Job::on_epoch_initiation`] (everyone else), and is polled with
//! [`Job::advance`] until the epoch's agreed buffer is imported back into the solvers.

mod config;
mod error;
mod job;

pub use config::Configuration;
pub use error::SharingError;
pub use job::{HistoryTransport, Job};
