//! Per-detector configuration.

use color_eyre::eyre::{eyre, Result};

/// The one configuration surface a [`crate::consensus::Detector`] needs:
/// how many processes are in the ring, and how many local engine threads
/// must be idle before this process is willing to forward the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    numprocs: u32,
    required_threads_in_done: u32,
}

impl Config {
    /// Creates a new `Config`, checking that both values are sane.
    pub fn new(numprocs: u32, required_threads_in_done: u32) -> Result<Self> {
        if numprocs == 0 {
            return Err(eyre!("numprocs must be at least 1"));
        }
        if required_threads_in_done == 0 {
            return Err(eyre!("required_threads_in_done must be at least 1"));
        }
        Ok(Self {
            numprocs,
            required_threads_in_done,
        })
    }

    /// Total number of processes in the ring.
    pub fn numprocs(&self) -> u32 {
        self.numprocs
    }

    /// Number of local engine threads that must be idle before this
    /// process forwards the token.
    pub fn required_threads_in_done(&self) -> u32 {
        self.required_threads_in_done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_numprocs() {
        assert!(Config::new(0, 1).is_err());
    }

    #[test]
    fn rejects_zero_required_threads() {
        assert!(Config::new(1, 0).is_err());
    }

    #[test]
    fn accepts_sane_values() {
        let config = Config::new(3, 2).unwrap();
        assert_eq!(config.numprocs(), 3);
        assert_eq!(config.required_threads_in_done(), 2);
    }
}
