//! Process identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a single process participating in the token ring.
///
/// Processes are numbered `0..numprocs`; the ring visits them in that
/// order and wraps back to `0`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Creates a new `ProcessId`.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the next process in the ring, given the total process count.
    pub fn next(self, numprocs: u32) -> ProcessId {
        ProcessId((self.0 + 1) % numprocs)
    }
}

impl From<u32> for ProcessId {
    fn from(id: u32) -> Self {
        ProcessId(id)
    }
}

impl From<ProcessId> for u32 {
    fn from(id: ProcessId) -> Self {
        id.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}
