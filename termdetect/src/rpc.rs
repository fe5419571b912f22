//! The contract the detector has with the RPC fabric.

use crate::counter::CounterSource;
use crate::id::ProcessId;
use crate::token::Token;

/// Infrastructure traffic the detector sends to peers. Never counted by
/// [`CounterSource`] — these are control calls, not user RPCs.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    /// Inbound token delivery from the previous neighbour in the ring.
    ReceiveToken(Token),
    /// Broadcast announcing that some process observed completion.
    DeclareConsensus,
}

/// What the detector needs from the RPC fabric: its own identity, the
/// ring size, and a way to fire control calls at a specific peer.
///
/// Implementations must deliver `control_call` reliably and in order to
/// the same target; the detector's correctness depends on it. Token
/// duplication or loss is a fabric-reliability problem, not something
/// the detector can recover from on its own.
pub trait Fabric: CounterSource {
    /// This process's identifier in `[0, numprocs)`.
    fn procid(&self) -> ProcessId;

    /// Total number of processes in the ring.
    fn numprocs(&self) -> u32;

    /// Fire-and-forget control call to a specific peer.
    fn control_call(&self, target: ProcessId, message: ControlMessage);
}
