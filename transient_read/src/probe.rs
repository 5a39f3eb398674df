use crate::{CalibrationConfig, SetupError, CACHE_LINE_SIZE, SYMBOL_COUNT};
use cache_timing::mmap::MMappedMemory;
use core::ptr;

const PAGE_SIZE: usize = 1 << 12;

/// The cache state medium of the channel: one contiguous buffer split into
/// [`SYMBOL_COUNT`] regions, one per candidate byte value. Its byte
/// contents are never read for value; which region is cache resident after
/// a transient load is the payload.
#[derive(Debug)]
pub struct ProbeArray {
    mem: MMappedMemory,
    stride: usize,
}

impl ProbeArray {
    /// Allocates and commits the full array. Every page is touched once up
    /// front: a page fault taken between the flush and the timed scan would
    /// void the measurement.
    pub fn allocate(config: &CalibrationConfig) -> Result<ProbeArray, SetupError> {
        let size = config.probe_array_size();
        let mut mem = MMappedMemory::new(size).map_err(SetupError::ProbeAllocation)?;
        let base = mem.ptr_mut();
        for offset in (0..size).step_by(PAGE_SIZE) {
            unsafe { ptr::write_volatile(base.add(offset), 0) };
        }
        Ok(ProbeArray {
            mem,
            stride: config.stride(),
        })
    }

    pub fn base(&self) -> *const u8 {
        self.mem.ptr()
    }

    pub fn len(&self) -> usize {
        self.mem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// First cache line of the region symbol `i` maps to.
    pub fn region(&self, i: usize) -> *const u8 {
        debug_assert!(i < SYMBOL_COUNT);
        unsafe { self.base().add(i * self.stride) }
    }

    /// Cache line granular walk of the whole array, for the flush phase.
    pub fn lines(&self) -> impl Iterator<Item = *const u8> + '_ {
        let base = self.base();
        (0..self.len())
            .step_by(CACHE_LINE_SIZE)
            .map(move |offset| unsafe { base.add(offset) })
    }
}

/// Eviction aid written after the probe array flush, to displace whatever
/// the flush pass left behind in lower cache levels and in the TLB. Shares
/// nothing with the probe array; its contents are never read.
#[derive(Debug)]
pub struct ScratchBuffer {
    mem: MMappedMemory,
}

impl ScratchBuffer {
    pub fn allocate(config: &CalibrationConfig) -> Result<ScratchBuffer, SetupError> {
        let mem =
            MMappedMemory::new(config.probe_array_size()).map_err(SetupError::ScratchAllocation)?;
        let mut scratch = ScratchBuffer { mem };
        // commit every page now; soft faults during a flush phase would
        // show up as timing noise
        scratch.touch();
        Ok(scratch)
    }

    /// One write per cache line across the full extent.
    pub fn touch(&mut self) {
        let len = self.mem.len();
        let base = self.mem.ptr_mut();
        for offset in (0..len).step_by(CACHE_LINE_SIZE) {
            unsafe { ptr::write_volatile(base.add(offset), 1) };
        }
    }
}
