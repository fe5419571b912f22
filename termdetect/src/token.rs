//! The token carried once per ring traversal.

use crate::id::ProcessId;
use serde::{Deserialize, Serialize};

/// Ring-wide tally carried by the single token.
///
/// `total_calls_sent` and `total_calls_received` are running sums across
/// every process the token has visited since the last time a process
/// amended them; `last_change` is whichever process last amended either
/// total. A lap that returns to `last_change` with both totals equal
/// means no process touched the tally during that lap and nothing is
/// in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub total_calls_sent: u64,
    pub total_calls_received: u64,
    pub last_change: ProcessId,
}

impl Token {
    /// The token process 0 starts with: zero tallies, `last_change` set to
    /// the last process in the ring so the very first forward can't
    /// spuriously terminate the system before a full lap has happened.
    pub fn initial(numprocs: u32) -> Self {
        Token {
            total_calls_sent: 0,
            total_calls_received: 0,
            last_change: ProcessId::new(numprocs - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_token_points_at_last_process() {
        let token = Token::initial(4);
        assert_eq!(token.total_calls_sent, 0);
        assert_eq!(token.total_calls_received, 0);
        assert_eq!(token.last_change, ProcessId::new(3));
    }
}
