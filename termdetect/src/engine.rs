//! The thin contract the detector has with the execution engine.
//!
//! Real vertex-program engines (GAS supersteps, schedulers, and the rest
//! of the execution model) are out of scope; this trait exists only so
//! test and demo harnesses have something concrete to poll.

/// A source of "do I currently have work?" answers for one engine thread.
pub trait Engine: Send + Sync {
    /// Returns `true` if this engine thread currently has no work queued.
    fn is_idle(&self) -> bool;
}
