//! Single-slot atomic handoff for the ADC data-ready edge.
//!
//! The interrupt side only stores; the loop side reads-and-clears. Excess
//! edges between loop iterations overwrite the timestamp and coalesce into
//! one pending sample — intentional decimation, not data loss, since the
//! conversion value is re-read fresh from the source.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[derive(Debug)]
pub struct DrdyGate {
    pending: AtomicBool,
    t_ms: AtomicU32,
}

impl DrdyGate {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            t_ms: AtomicU32::new(0),
        }
    }

    /// Interrupt-context side: record the edge timestamp and raise the flag.
    /// No computation happens here.
    pub fn notify(&self, t_ms: u32) {
        self.t_ms.store(t_ms, Ordering::Relaxed);
        self.pending.store(true, Ordering::Release);
    }

    /// Loop side: consume the pending edge, returning its timestamp.
    pub fn take(&self) -> Option<u32> {
        if self.pending.swap(false, Ordering::Acquire) {
            Some(self.t_ms.load(Ordering::Relaxed))
        } else {
            None
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Relaxed)
    }
}

impl Default for DrdyGate {
    fn default() -> Self {
        Self::new()
    }
}
