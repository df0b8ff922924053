//! Bounded, slot-partitioned clause database.
//!
//! Learned clauses are kept in fixed-capacity [`chunk::Chunk`]s, one ring per
//! [`slot::ClauseSlot`], drawn from a shared [`chunk::FreeChunkPool`] sized once at job start.
//! [`db::ClauseDatabase`] ties these together with admission and eviction, and exposes the
//! packed-buffer wire format ([`buffer`]) used to export clauses to, and import clauses from,
//! other processes.

mod buffer;
mod chunk;
mod clause;
mod db;
mod slot;

pub use buffer::{encode, BufferMerger, BufferReader, ExcessClauses};
pub use chunk::{Chunk, FreeChunkPool};
pub use clause::Clause;
pub use db::{ClauseDatabase, ClauseDatabaseSetup, ClauseDatabaseStats};
pub use slot::{ClauseSlot, SlotLayout};
