//! Dijkstra-style token-ring termination detection for a fleet of
//! RPC-connected processes.
//!
//! This crate answers, without stopping the world, the global predicate
//! "every process is idle AND every RPC that was ever sent has been
//! received" for a fleet of worker processes connected by some RPC
//! fabric. It is the termination-detection core of a bulk-synchronous /
//! asynchronous graph-processing runtime; the vertex programs, graph
//! ingestion, and the RPC fabric itself are external collaborators and
//! out of scope here — see [`rpc::Fabric`] and [`engine::Engine`] for the
//! thin contracts this crate has with them.

// This module contains the definition of `ProcessId`.
mod id;

// This module contains the detector's configuration surface.
mod config;

// This module contains the `Token` carried once per ring traversal.
mod token;

// This module contains the `CounterSource` contract.
mod counter;

// This module contains the `Fabric` contract and its control messages.
mod rpc;

// This module contains the thin `Engine` contract used by test/demo
// harnesses.
mod engine;

// This module contains the termination detector itself.
mod consensus;

pub use config::Config;
pub use consensus::{CriticalSection, Detector};
pub use counter::CounterSource;
pub use engine::Engine;
pub use id::ProcessId;
pub use rpc::{ControlMessage, Fabric};
pub use token::Token;
