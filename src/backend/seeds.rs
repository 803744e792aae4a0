//! In-process buffer of seed requests

use crate::models::Request;
use std::collections::VecDeque;

/// FIFO of seed requests waiting to be handed to the frontier
///
/// Seeds are served oldest-first and each one exactly once.
#[derive(Debug, Default)]
pub struct SeedBuffer {
    pending: VecDeque<Request>,
}

impl SeedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends seeds, keeping their order
    pub fn extend(&mut self, seeds: impl IntoIterator<Item = Request>) {
        self.pending.extend(seeds);
    }

    /// Removes and returns up to `max_n` of the oldest seeds
    pub fn drain_front(&mut self, max_n: usize) -> Vec<Request> {
        let n = max_n.min(self.pending.len());
        self.pending.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
