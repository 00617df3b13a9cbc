//! Port allocation for managed servers.
//!
//! The allocator scans upward from a configured starting port, skipping ports
//! it has already handed out and probing each remaining candidate with a
//! throwaway OS bind. Probe listeners are closed before the port is returned,
//! so a small window remains in which an unrelated process could grab the port
//! before the server binds it; the server's own bind failure surfaces through
//! the normal start-retry path in that case.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::TcpListener;

/// Default number of ports scanned above `start_port` before giving up.
pub const DEFAULT_MAX_SCAN_RANGE: u16 = 1000;

/// Thread-safe allocator handing out non-conflicting TCP ports.
///
/// All state lives behind a `parking_lot::Mutex`, so the allocator can be
/// shared by reference across concurrent start operations. The lock is only
/// held for set membership checks, never across a bind probe.
pub struct PortAllocator {
    allocated: Mutex<HashSet<u16>>,
    start_port: u16,
    max_scan_range: u16,
}

impl PortAllocator {
    pub fn new(start_port: u16, max_scan_range: u16) -> Self {
        Self {
            allocated: Mutex::new(HashSet::new()),
            start_port,
            max_scan_range: max_scan_range.max(1),
        }
    }

    /// Find and claim the first free port at or above `start_port`.
    ///
    /// A candidate is returned only if it is not already tracked as allocated
    /// and a bind probe on it succeeds. The returned port is inserted into the
    /// allocated set before this method returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PortExhaustion`] if no candidate within
    /// `max_scan_range` ports passes both checks.
    pub fn allocate(&self) -> Result<u16> {
        for offset in 0..self.max_scan_range {
            let Some(port) = self.start_port.checked_add(offset) else {
                break;
            };

            if self.allocated.lock().contains(&port) {
                continue;
            }

            if !Self::probe(port) {
                continue;
            }

            // Re-check under the lock: a concurrent allocate() may have
            // claimed this port while we were probing.
            let mut allocated = self.allocated.lock();
            if allocated.contains(&port) {
                continue;
            }
            allocated.insert(port);
            return Ok(port);
        }

        Err(Error::PortExhaustion {
            start_port: self.start_port,
            scan_range: self.max_scan_range,
        })
    }

    /// Probe a candidate port by binding throwaway listeners.
    ///
    /// Binds 127.0.0.1 first, then opportunistically 0.0.0.0 to catch
    /// dual-stack conflicts. On Linux the second bind may fail because the
    /// kernel treats 127.0.0.1:PORT as overlapping with 0.0.0.0:PORT. That
    /// failure is ignored, the 127.0.0.1 bind already proved availability.
    /// Both listeners are dropped before returning.
    fn probe(port: u16) -> bool {
        let Ok(listener_v4) = TcpListener::bind(("127.0.0.1", port)) else {
            return false;
        };
        let listener_any = TcpListener::bind(("0.0.0.0", port));
        drop(listener_v4);
        drop(listener_any);
        true
    }

    /// Release a previously allocated port.
    ///
    /// Idempotent: releasing a port that is not tracked is a no-op.
    pub fn release(&self, port: u16) {
        self.allocated.lock().remove(&port);
    }

    /// Whether a port is currently tracked as allocated.
    pub fn is_allocated(&self, port: u16) -> bool {
        self.allocated.lock().contains(&port)
    }

    /// Snapshot of all currently allocated ports.
    pub fn allocated_ports(&self) -> Vec<u16> {
        self.allocated.lock().iter().copied().collect()
    }
}
