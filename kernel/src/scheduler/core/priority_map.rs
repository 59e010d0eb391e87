//! Priority bitmap for O(1) highest-ready lookup
//!
//! One bit per priority level, bit 0 of word 0 being priority 0 (the most
//! urgent). Up to 32 levels a single word is scanned; above that a group
//! word records which 32-level sub-maps are non-empty and the lookup is a
//! two-step trailing-zeros scan.

use crate::config::{PRIORITY_GROUPS, PRIORITY_WORD_BITS};
use crate::scheduler::Priority;

#[derive(Clone)]
pub struct PriorityMap {
    /// Bit `g` set when `maps[g]` is non-zero
    groups: u32,
    maps: [u32; PRIORITY_GROUPS],
    levels: u32,
}

impl PriorityMap {
    pub const fn new(levels: u32) -> Self {
        Self {
            groups: 0,
            maps: [0; PRIORITY_GROUPS],
            levels,
        }
    }

    /// Number of levels covered
    pub fn levels(&self) -> u32 {
        self.levels
    }

    #[inline]
    fn split(priority: Priority) -> (usize, u32) {
        (
            (priority / PRIORITY_WORD_BITS) as usize,
            1 << (priority % PRIORITY_WORD_BITS),
        )
    }

    /// Mark a priority level as occupied
    #[inline]
    pub fn mark(&mut self, priority: Priority) {
        debug_assert!(priority < self.levels);
        let (group, bit) = Self::split(priority);
        self.maps[group] |= bit;
        self.groups |= 1 << group;
    }

    /// Clear a priority level
    #[inline]
    pub fn clear(&mut self, priority: Priority) {
        debug_assert!(priority < self.levels);
        let (group, bit) = Self::split(priority);
        self.maps[group] &= !bit;
        if self.maps[group] == 0 {
            self.groups &= !(1 << group);
        }
    }

    /// Check if a specific priority is marked
    #[inline]
    pub fn is_set(&self, priority: Priority) -> bool {
        let (group, bit) = Self::split(priority);
        self.maps[group] & bit != 0
    }

    /// Numerically lowest marked priority (the most urgent one)
    #[inline]
    pub fn highest(&self) -> Option<Priority> {
        if self.levels <= PRIORITY_WORD_BITS {
            let word = self.maps[0];
            return if word == 0 { None } else { Some(word.trailing_zeros()) };
        }
        if self.groups == 0 {
            return None;
        }
        let group = self.groups.trailing_zeros();
        let word = self.maps[group as usize];
        Some(group * PRIORITY_WORD_BITS + word.trailing_zeros())
    }

    /// Alias used by the dispatcher
    #[inline]
    pub fn highest_occupied_priority(&self) -> Option<Priority> {
        self.highest()
    }

    /// Lowest marked priority strictly after `priority`
    pub fn next_after(&self, priority: Priority) -> Option<Priority> {
        let start = priority + 1;
        if start >= self.levels {
            return None;
        }
        let (mut group, _) = Self::split(start);
        let shift = start % PRIORITY_WORD_BITS;
        let word = self.maps[group] & (u32::MAX << shift);
        if word != 0 {
            return Some(group as u32 * PRIORITY_WORD_BITS + word.trailing_zeros());
        }
        group += 1;
        let remaining = if group >= PRIORITY_GROUPS {
            0
        } else {
            self.groups & (u32::MAX << group)
        };
        if remaining == 0 {
            return None;
        }
        let group = remaining.trailing_zeros();
        Some(group * PRIORITY_WORD_BITS + self.maps[group as usize].trailing_zeros())
    }

    /// Iterate marked priorities, most urgent first
    pub fn iter(&self) -> PriorityIter<'_> {
        PriorityIter {
            map: self,
            next: self.highest(),
        }
    }

    /// Check if nothing is marked
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.groups == 0
    }
}

pub struct PriorityIter<'a> {
    map: &'a PriorityMap,
    next: Option<Priority>,
}

impl Iterator for PriorityIter<'_> {
    type Item = Priority;

    fn next(&mut self) -> Option<Priority> {
        let current = self.next?;
        self.next = self.map.next_after(current);
        Some(current)
    }
}
