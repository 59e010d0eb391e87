//! Preemption-threshold tracker
//!
//! A thread running with `preempt_threshold < priority` can only be
//! displaced by threads more urgent than its threshold. When that happens
//! it is recorded here, keyed by its own priority, so that once the urgent
//! work is gone it gets the processor back ahead of the ready threads its
//! threshold still blocks. Pending records are served lowest priority
//! number first.

use super::priority_map::PriorityMap;
use crate::scheduler::Priority;
use alloc::vec;
use alloc::vec::Vec;

pub(crate) struct ThresholdTracker {
    /// `preempted_bitmap`: priorities of preempted threshold holders
    preempted: PriorityMap,
    /// `preemption_threshold_owner[priority]`: thread index of the holder
    owners: Vec<Option<usize>>,
}

impl ThresholdTracker {
    pub fn new(levels: u32) -> Self {
        Self {
            preempted: PriorityMap::new(levels),
            owners: vec![None; levels as usize],
        }
    }

    /// Remember a holder that lost the processor to a more urgent thread
    ///
    /// A second holder at the same priority replaces the first record; the
    /// earlier one stays on its ready list and runs in FIFO order.
    pub fn record(&mut self, priority: Priority, index: usize) {
        if let Some(previous) = self.owners[priority as usize] {
            if previous != index {
                log::debug!("threshold record at prio {} replaces thread #{}", priority, previous);
            }
        }
        self.owners[priority as usize] = Some(index);
        self.preempted.mark(priority);
    }

    /// Take the pending holder with the lowest priority number
    pub fn take_lowest(&mut self) -> Option<(Priority, usize)> {
        loop {
            let priority = self.preempted.highest()?;
            self.preempted.clear(priority);
            if let Some(index) = self.owners[priority as usize].take() {
                return Some((priority, index));
            }
        }
    }

    /// Pending holders, lowest priority number first
    pub fn pending(&self) -> impl Iterator<Item = (Priority, usize)> + '_ {
        self.preempted
            .iter()
            .filter_map(|priority| self.owners[priority as usize].map(|index| (priority, index)))
    }

    /// Drop the record for `index` at `priority`, if it is the owner
    pub fn forget(&mut self, priority: Priority, index: usize) {
        if self.owners[priority as usize] == Some(index) {
            self.owners[priority as usize] = None;
            self.preempted.clear(priority);
        }
    }

    pub fn is_pending(&self, priority: Priority, index: usize) -> bool {
        self.owners[priority as usize] == Some(index)
    }

    pub fn is_empty(&self) -> bool {
        self.preempted.is_empty()
    }
}
