//! Deterministic stand-in for the hardware primitives, used to exercise
//! the oracle and the recovery loop without real cache timing.

use crate::oracle::ChannelPrimitives;
use crate::CalibrationConfig;
use std::cell::{Cell, RefCell};

/// `transient_load` records which region the target byte selects,
/// `timed_access` answers from the recorded residency (or from injected
/// per-region latencies), `flush_line` clears residency like a real flush
/// would. Call counters let tests assert the work bounds.
pub(crate) struct SyntheticChannel {
    stride: usize,
    probe_base: Cell<*const u8>,
    /// Region deposited by the last transient load, if any.
    loaded: Cell<Option<usize>>,
    /// When false, transient loads leave no cache footprint, so every scan
    /// comes back inconclusive.
    pub load_succeeds: bool,
    pub hit_latency: u64,
    pub miss_latency: u64,
    injected: RefCell<Option<Vec<u64>>>,
    pub transient_loads: Cell<usize>,
    pub timed_accesses: Cell<usize>,
    pub flushes: Cell<usize>,
}

impl SyntheticChannel {
    pub fn new(config: &CalibrationConfig) -> SyntheticChannel {
        SyntheticChannel {
            stride: config.stride(),
            probe_base: Cell::new(core::ptr::null()),
            loaded: Cell::new(None),
            load_succeeds: true,
            hit_latency: 50,
            miss_latency: 300,
            injected: RefCell::new(None),
            transient_loads: Cell::new(0),
            timed_accesses: Cell::new(0),
            flushes: Cell::new(0),
        }
    }

    /// Fixed per-region latencies, bypassing the residency model.
    pub fn inject_latencies(&mut self, latencies: Vec<u64>) {
        *self.injected.borrow_mut() = Some(latencies);
    }

    fn region_of(&self, addr: *const u8) -> Option<usize> {
        let base = self.probe_base.get();
        if base.is_null() || addr < base {
            return None;
        }
        Some((addr as usize - base as usize) / self.stride)
    }
}

impl ChannelPrimitives for SyntheticChannel {
    unsafe fn transient_load(&self, target: *const u8, probe_base: *const u8) {
        self.transient_loads.set(self.transient_loads.get() + 1);
        self.probe_base.set(probe_base);
        if self.load_succeeds {
            // targets are ordinary readable test buffers here
            let value = unsafe { target.read() };
            self.loaded.set(Some(value as usize));
        }
    }

    unsafe fn timed_access(&self, addr: *const u8) -> u64 {
        self.timed_accesses.set(self.timed_accesses.get() + 1);
        let region = self.region_of(addr);
        if let (Some(latencies), Some(region)) = (self.injected.borrow().as_deref(), region) {
            return latencies[region];
        }
        if region.is_some() && region == self.loaded.get() {
            self.hit_latency
        } else {
            self.miss_latency
        }
    }

    unsafe fn flush_line(&self, addr: *const u8) {
        self.flushes.set(self.flushes.get() + 1);
        if self.region_of(addr).is_some() && self.region_of(addr) == self.loaded.get() {
            self.loaded.set(None);
        }
    }
}
