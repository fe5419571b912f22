//! In-process stand-ins for the RPC fabric and execution engine, used by
//! the CLI demo binary and by `termdetect`'s integration tests.
//!
//! None of this simulates real networking: `MockFabric::control_call`
//! dispatches straight into the target process's [`Detector`] on
//! whichever thread made the call. That's enough to exercise the
//! protocol end-to-end without standing up a real cluster transport.

use color_eyre::eyre::{ensure, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use termdetect::{Config, ControlMessage, CounterSource, Detector, Engine, Fabric, ProcessId};

/// A toy execution engine: "idle" is just a flag flipped by whatever is
/// driving the scenario, standing in for a real scheduler's work queue.
#[derive(Clone)]
pub struct SimEngine {
    idle: Arc<AtomicBool>,
}

impl SimEngine {
    fn new(idle: bool) -> SimEngine {
        SimEngine { idle: Arc::new(AtomicBool::new(idle)) }
    }

    /// Marks this engine thread idle or busy.
    pub fn set_idle(&self, idle: bool) {
        self.idle.store(idle, Ordering::SeqCst);
    }
}

impl Engine for SimEngine {
    fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }
}

/// An in-process RPC fabric for one simulated process: monotonic counters
/// plus a shared registry used to reach the other simulated processes'
/// detectors directly.
struct MockFabric {
    procid: ProcessId,
    numprocs: u32,
    sent: AtomicU64,
    received: AtomicU64,
    registry: Arc<Mutex<Vec<Weak<Detector>>>>,
}

impl CounterSource for MockFabric {
    fn sent(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }

    fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }
}

impl Fabric for MockFabric {
    fn procid(&self) -> ProcessId {
        self.procid
    }

    fn numprocs(&self) -> u32 {
        self.numprocs
    }

    fn control_call(&self, target: ProcessId, message: ControlMessage) {
        let target_detector = {
            let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry[u32::from(target) as usize].upgrade()
        };
        // The peer may have been torn down (e.g. the cluster is being
        // dropped mid-test); nothing left to deliver to in that case.
        if let Some(detector) = target_detector {
            match message {
                ControlMessage::ReceiveToken(token) => detector.receive_token(token),
                ControlMessage::DeclareConsensus => detector.declare_consensus(),
            }
        }
    }
}

/// A cluster of simulated processes sharing a single OS process, wired
/// together through [`MockFabric`]s into one token ring.
pub struct Cluster {
    detectors: Vec<Arc<Detector>>,
    fabrics: Vec<Arc<MockFabric>>,
    engines: Vec<SimEngine>,
}

impl Cluster {
    /// Builds a cluster of `counters.len()` processes, each with its own
    /// detector bound to a `MockFabric` seeded with the given
    /// `(sent, received)` pair.
    pub fn new(required_threads_in_done: u32, counters: &[(u64, u64)]) -> Result<Cluster> {
        let numprocs = counters.len() as u32;
        ensure!(numprocs > 0, "a cluster needs at least one process");

        let registry = Arc::new(Mutex::new(vec![Weak::new(); numprocs as usize]));
        let mut detectors = Vec::with_capacity(numprocs as usize);
        let mut fabrics = Vec::with_capacity(numprocs as usize);
        let mut engines = Vec::with_capacity(numprocs as usize);

        for (i, &(sent, received)) in counters.iter().enumerate() {
            let fabric = Arc::new(MockFabric {
                procid: ProcessId::new(i as u32),
                numprocs,
                sent: AtomicU64::new(sent),
                received: AtomicU64::new(received),
                registry: Arc::clone(&registry),
            });
            let config = Config::new(numprocs, required_threads_in_done)?;
            let detector = Arc::new(Detector::new(
                fabric.clone() as Arc<dyn Fabric>,
                config,
                None,
            )?);
            registry.lock().unwrap_or_else(|e| e.into_inner())[i] = Arc::downgrade(&detector);
            fabrics.push(fabric);
            detectors.push(detector);
            engines.push(SimEngine::new(false));
        }

        Ok(Cluster { detectors, fabrics, engines })
    }

    /// The detector for process `procid`.
    pub fn detector(&self, procid: u32) -> Arc<Detector> {
        Arc::clone(&self.detectors[procid as usize])
    }

    /// Number of simulated processes in this cluster.
    pub fn numprocs(&self) -> u32 {
        self.detectors.len() as u32
    }

    /// Simulates process `procid` sending `count` more user RPCs: bumps
    /// its `sent_counter` without actually delivering anything.
    pub fn record_sent(&self, procid: u32, count: u64) {
        self.fabrics[procid as usize].sent.fetch_add(count, Ordering::SeqCst);
    }

    /// Simulates process `procid` having received `count` more user RPCs.
    pub fn record_received(&self, procid: u32, count: u64) {
        self.fabrics[procid as usize]
            .received
            .fetch_add(count, Ordering::SeqCst);
    }

    /// The engine handle for process `procid`, shared with whichever
    /// thread calls `done()` for it.
    pub fn engine(&self, procid: u32) -> SimEngine {
        self.engines[procid as usize].clone()
    }

    /// Spawns a background thread that marks process `procid`'s engine
    /// idle and calls `done()` on its detector, returning a handle to
    /// join on the result.
    pub fn spawn_done(&self, procid: u32) -> JoinHandle<bool> {
        let detector = self.detector(procid);
        let engine = self.engine(procid);
        std::thread::spawn(move || {
            engine.set_idle(true);
            detector.done()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_cluster() {
        assert!(Cluster::new(1, &[]).is_err());
    }

    #[test]
    fn builds_a_ring_with_distinct_detectors() {
        let cluster = Cluster::new(1, &[(0, 0), (0, 0), (0, 0)]).unwrap();
        assert_eq!(cluster.numprocs(), 3);
        assert_eq!(cluster.detector(0).procid(), ProcessId::new(0));
        assert_eq!(cluster.detector(2).procid(), ProcessId::new(2));
    }

    #[test]
    fn sim_engine_starts_busy_until_told_otherwise() {
        let cluster = Cluster::new(1, &[(0, 0)]).unwrap();
        let engine = cluster.engine(0);
        assert!(!engine.is_idle());
        engine.set_idle(true);
        assert!(engine.is_idle());
    }
}
