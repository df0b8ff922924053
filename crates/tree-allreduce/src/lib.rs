//! Dynamic binary-tree all-reduce over a job's worker processes.
//!
//! A [`TreeAllReduce`] combines every worker's local contribution into one aggregated value
//! (reduce), then hands that value back down to every worker (broadcast). Aggregation and local
//! production run on background threads; the owning job drives the state machine forward by
//! calling [`TreeAllReduce::advance`] and [`TreeAllReduce::receive`].

mod message;
mod reduce;
mod topology;
mod transport;

pub use message::{AllReduceMessage, BaseMsg};
pub use reduce::{AllReducePhase, TreeAllReduce};
pub use topology::TreeTopology;
pub use transport::AllReduceTransport;
