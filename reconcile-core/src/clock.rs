//! Per-document causal clock.

use crate::author::{Author, Origin};

/// Version vector of a single document.
///
/// Counters only move forward, one step per committed edit of their author.
#[derive(Debug, Clone, Default)]
pub struct CausalClock {
    origin: Origin,
}

impl CausalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one committed edit by `author` and return the new snapshot.
    pub fn advance(&mut self, author: Author) -> Origin {
        self.origin.increment(author);
        self.origin
    }

    /// Snapshot of the counters.
    pub fn current(&self) -> Origin {
        self.origin
    }
}
