#![deny(unsafe_op_in_unsafe_fn)]

pub mod calibration;
pub mod mmap;

use core::arch::x86_64 as arch_x86;
use core::ptr;

pub const CACHE_LINE_SIZE: usize = 64;

// rdtsc no fence
pub unsafe fn rdtsc_nofence() -> u64 {
    unsafe { arch_x86::_rdtsc() }
}

// rdtsc (has mfence before and after)
pub unsafe fn rdtsc_fence() -> u64 {
    unsafe { arch_x86::_mm_mfence() };
    let tsc: u64 = unsafe { arch_x86::_rdtsc() };
    unsafe { arch_x86::_mm_mfence() };
    tsc
}

pub unsafe fn maccess<T>(p: *const T) {
    unsafe { ptr::read_volatile(p) };
}

// flush (clflush)
pub unsafe fn flush(p: *const u8) {
    unsafe { arch_x86::_mm_clflush(p) }
}

/// Time one read of `p` in cycles.
///
/// # Safety
///
/// `p` must be a valid pointer to read.
pub unsafe fn reload_time(p: *const u8) -> u64 {
    let t = unsafe { rdtsc_fence() };
    unsafe { maccess(p) };
    (unsafe { rdtsc_fence() }) - t
}

/// Flush then time one read of `p` in cycles, so always a miss latency.
///
/// # Safety
///
/// `p` must be a valid pointer to read.
pub unsafe fn flush_reload_time(p: *const u8) -> u64 {
    unsafe { flush(p) };
    unsafe { reload_time(p) }
}
