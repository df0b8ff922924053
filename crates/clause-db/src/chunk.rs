use crossbeam_channel::{bounded, Receiver, Sender};

use crate::clause::Clause;


/// A fixed-capacity (in literals) bundle of packed clauses, owned by at most one slot at a time.
#[derive(Debug)]
pub struct Chunk {
    capacity_literals: usize,
    used_literals:     usize,
    clauses:           Vec<Clause>,
}

impl Chunk {
    #[must_use]
    fn new(capacity_literals: usize) -> Self {
        Self { capacity_literals, used_literals: 0, clauses: Vec::new() }
    }

    /// Try to add `clause` to this chunk. Returns the clause back (without modifying the chunk)
    /// if it would not fit.
    pub fn try_push(&mut self, clause: Clause) -> Result<(), Clause> {
        if self.used_literals + clause.len() > self.capacity_literals && !self.clauses.is_empty() {
            return Err(clause);
        }
        self.used_literals += clause.len();
        self.clauses.push(clause);
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Remove and return every clause in this chunk, leaving it empty.
    #[must_use]
    pub fn drain_all(&mut self) -> Vec<Clause> {
        self.used_literals = 0;
        std::mem::take(&mut self.clauses)
    }

    fn reset(&mut self) {
        self.clauses.clear();
        self.used_literals = 0;
    }
}

/// The shared free pool of chunks: created once at job start with exactly `numChunks` chunks,
/// so that the total chunk count across every slot plus this pool never exceeds `numChunks`.
#[derive(Debug, Clone)]
pub struct FreeChunkPool {
    sender:   Sender<Chunk>,
    receiver: Receiver<Chunk>,
}

impl FreeChunkPool {
    #[must_use]
    pub fn new(num_chunks: usize, chunk_capacity_literals: usize) -> Self {
        let (sender, receiver) = bounded(num_chunks);
        for _ in 0..num_chunks {
            sender.send(Chunk::new(chunk_capacity_literals))
                .expect("channel just created, cannot be full or disconnected");
        }
        Self { sender, receiver }
    }

    /// Borrow a chunk from the pool, if one is free.
    #[must_use]
    pub fn try_get(&self) -> Option<Chunk> {
        self.receiver.try_recv().ok()
    }

    /// Return a chunk to the pool, clearing its contents first.
    pub fn release(&self, mut chunk: Chunk) {
        chunk.reset();
        // The pool was sized to exactly the number of chunks in circulation, so this cannot fail
        // except if the pool itself has been dropped, in which case dropping the chunk is fine.
        let _ = self.sender.send(chunk);
    }

    #[must_use]
    pub fn total_chunks(&self) -> usize {
        self.sender.capacity().unwrap_or(0)
    }
}
