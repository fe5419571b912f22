//! Monotonic send/receive counters.
//!
//! Both the RPC fabric and an optional attached, subsystem-scoped source
//! implement this trait; the detector reads whichever one it was bound to
//! at construction and never owns the attached source.

/// A monotonic pair of send/receive counters for user RPCs.
///
/// Control calls issued by the detector itself (`receive_token`,
/// `declare_consensus`) must never be reflected here — only user traffic.
pub trait CounterSource: Send + Sync {
    /// Count of user RPCs sent by this process so far.
    fn sent(&self) -> u64;

    /// Count of user RPCs received by this process so far.
    fn received(&self) -> u64;
}
