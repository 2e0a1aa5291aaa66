//! Port lease allocator.
//!
//! Every worker occupies a triple of host ports (service, viewer, VNC).
//! Leases are never released individually. Once the leased set grows close
//! to the width of the range it is cleared and allocation starts over,
//! since workers from that far back are long gone.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use browsergrid_core::PortTriple;
use tracing::{info, warn};

pub const LOWER_PORT_BOUNDARY: u16 = 40_000;
pub const UPPER_PORT_BOUNDARY: u16 = 49_999;

/// Headroom below the range width at which the leased set is cleared.
const COMPACTION_MARGIN: usize = 200;

/// Hands out non-overlapping port triples from a fixed range.
///
/// Safe to share between concurrent provisioning tasks: a scan and the
/// insertion of its result happen under one lock.
#[derive(Debug)]
pub struct PortLeasePool {
    lower: u16,
    upper: u16,
    leased: Mutex<HashSet<u16>>,
}

impl PortLeasePool {
    pub fn new(lower: u16, upper: u16) -> Self {
        Self {
            lower,
            upper,
            leased: Mutex::new(HashSet::new()),
        }
    }

    pub fn lower(&self) -> u16 {
        self.lower
    }

    pub fn upper(&self) -> u16 {
        self.upper
    }

    /// Lease the lowest free triple in the range.
    ///
    /// Returns `None` when no service port in the range has all three ports
    /// free (or when every candidate triple overflows the port space).
    pub fn lease(&self) -> Option<PortTriple> {
        let mut leased = self.leased.lock().unwrap_or_else(PoisonError::into_inner);

        let width = usize::from(self.upper.saturating_sub(self.lower));
        let threshold = width.saturating_sub(COMPACTION_MARGIN);
        if leased.len() > threshold {
            info!(leased = leased.len(), "port lease set is near the range width, clearing it");
            leased.clear();
        }

        let triple = (self.lower..=self.upper)
            .filter_map(PortTriple::for_service)
            .find(|triple| triple.ports().iter().all(|p| !leased.contains(p)));

        match triple {
            Some(triple) => {
                leased.extend(triple.ports());
                Some(triple)
            }
            None => {
                warn!(lower = self.lower, upper = self.upper, "no free port triple in range");
                None
            }
        }
    }

    /// Ports currently recorded as leased.
    pub fn leased_count(&self) -> usize {
        self.leased.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for PortLeasePool {
    fn default() -> Self {
        Self::new(LOWER_PORT_BOUNDARY, UPPER_PORT_BOUNDARY)
    }
}
