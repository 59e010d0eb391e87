//! Affinity - core exclusion masks
//!
//! Threads and timers carry a mask of the cores they may never run on.
//! An empty mask means "any core".

use crate::config::MAX_CORES;
use core::fmt;

/// Execution core index
pub type CoreId = usize;

/// Core mask (64 cores max)
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct CoreMask(u64);

impl CoreMask {
    /// Create empty mask
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Create mask for every core of a `cores`-core system
    pub const fn first(cores: usize) -> Self {
        if cores >= MAX_CORES {
            Self(u64::MAX)
        } else {
            Self((1u64 << cores) - 1)
        }
    }

    /// Create mask for single core
    pub const fn single(core: CoreId) -> Self {
        Self(1 << (core & 63))
    }

    /// Create mask from raw bits
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// Set core bit
    pub fn set(&mut self, core: CoreId) {
        self.0 |= 1 << (core & 63);
    }

    /// Clear core bit
    pub fn clear(&mut self, core: CoreId) {
        self.0 &= !(1 << (core & 63));
    }

    /// Check if core is set
    pub const fn is_set(&self, core: CoreId) -> bool {
        (self.0 & (1 << (core & 63))) != 0
    }

    /// Count set cores
    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    /// Check if empty
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Get first set core
    pub fn lowest(&self) -> Option<CoreId> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as CoreId)
        }
    }

    /// Intersect with another mask
    pub const fn intersect(&self, other: &Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Union with another mask
    pub const fn union(&self, other: &Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True when an exclusion mask still leaves one of the first `cores` cores usable.
    pub fn leaves_core(&self, cores: usize) -> bool {
        let all = Self::first(cores);
        all.intersect(self) != all
    }
}

impl fmt::Debug for CoreMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoreMask({:#x})", self.0)
    }
}

/// Can a thread/timer with `exclusion` run on `core`?
#[inline]
pub fn allowed_on(exclusion: CoreMask, core: CoreId) -> bool {
    !exclusion.is_set(core)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_basics() {
        let mut mask = CoreMask::empty();
        assert!(mask.is_empty());
        mask.set(3);
        mask.set(1);
        assert_eq!(mask.lowest(), Some(1));
        assert_eq!(mask.count(), 2);
        mask.clear(1);
        assert!(!mask.is_set(1));
        assert!(allowed_on(mask, 0));
        assert!(!allowed_on(mask, 3));
    }

    #[test]
    fn test_leaves_core() {
        assert!(CoreMask::single(0).leaves_core(2));
        assert!(!CoreMask::from_bits(0b11).leaves_core(2));
        // Bits above the configured cores do not count.
        assert!(CoreMask::single(5).leaves_core(1));
        assert!(!CoreMask::first(64).leaves_core(64));
    }
}
