//! Windowed replay log of exported clause buffers.
//!
//! Every [`ClauseHistorySetup::aggregation_factor`] epochs of clauses collapse into one merged
//! window. A [`ClauseHistory`] tracks which windows it is missing (to subscribe to its parent
//! for them) and which peers are subscribed to windows it holds.

mod entry;
mod history;
mod ids;
mod subscription;

pub use entry::HistoryEntry;
pub use history::{ClauseHistory, ClauseHistorySetup};
pub use ids::WorkerId;
pub use subscription::{SubscribeRequest, Subscription};
