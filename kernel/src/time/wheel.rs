//! Timer wheel
//!
//! `W` slot lists of internal timers plus one expiring list. A timer with
//! `remaining <= W` ticks left sits `remaining - 1` slots ahead of the
//! current slot; longer timers sit one full lap ahead and are reinserted
//! with `remaining - W` when their slot comes up.
//!
//! The arena holds one timer per thread (indices `0..max_threads`) followed
//! by the application timers. Lists are circular and linked by arena index.

use super::timer::TimerCallback;
use crate::scheduler::core::affinity::CoreMask;
use crate::scheduler::core::error::{corrupted, KernelError, KernelResult};
use alloc::vec;
use alloc::vec::Vec;

/// Which list a timer is linked into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListRef {
    None,
    Slot(usize),
    Expiring,
}

/// What happens when a timer expires
#[derive(Clone, Copy)]
pub(crate) enum TimerOwner {
    /// Free application timer slot
    Vacant,
    /// Timeout of the thread at this arena index
    Thread(usize),
    Application {
        callback: TimerCallback,
        parameter: usize,
    },
}

pub(crate) struct WheelTimer {
    pub name: &'static str,
    pub remaining: u64,
    /// Reload value; 0 means one-shot
    pub reload: u64,
    pub owner: TimerOwner,
    pub list: ListRef,
    pub next: usize,
    pub previous: usize,
    pub core_exclusion: CoreMask,
    pub generation: u32,
}

impl WheelTimer {
    const fn vacant() -> Self {
        Self {
            name: "",
            remaining: 0,
            reload: 0,
            owner: TimerOwner::Vacant,
            list: ListRef::None,
            next: 0,
            previous: 0,
            core_exclusion: CoreMask::empty(),
            generation: 0,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.list != ListRef::None
    }
}

pub(crate) struct TimerWheel {
    timers: Vec<WheelTimer>,
    slots: Vec<Option<usize>>,
    expiring: Option<usize>,
    current: usize,
    thread_timers: usize,
}

impl TimerWheel {
    pub fn new(slots: usize, thread_timers: usize, application_timers: usize) -> Self {
        let mut timers = Vec::with_capacity(thread_timers + application_timers);
        for index in 0..thread_timers {
            let mut timer = WheelTimer::vacant();
            timer.name = "timeout";
            timer.owner = TimerOwner::Thread(index);
            timers.push(timer);
        }
        for _ in 0..application_timers {
            timers.push(WheelTimer::vacant());
        }

        Self {
            timers,
            slots: vec![None; slots],
            expiring: None,
            current: 0,
            thread_timers,
        }
    }

    /// Number of slots (`W`)
    #[inline]
    pub fn width(&self) -> u64 {
        self.slots.len() as u64
    }

    /// Slot processed by the next tick
    pub fn current_slot(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn timer(&self, index: usize) -> &WheelTimer {
        match self.timers.get(index) {
            Some(timer) => timer,
            None => corrupted("timer index out of range"),
        }
    }

    #[inline]
    pub fn timer_mut(&mut self, index: usize) -> &mut WheelTimer {
        match self.timers.get_mut(index) {
            Some(timer) => timer,
            None => corrupted("timer index out of range"),
        }
    }

    /// Index range of application timers
    pub fn application_range(&self) -> core::ops::Range<usize> {
        self.thread_timers..self.timers.len()
    }

    /// First free application slot
    pub fn vacant(&self) -> Option<usize> {
        self.application_range()
            .find(|&index| matches!(self.timers[index].owner, TimerOwner::Vacant))
    }

    /// Put a timer on the wheel
    pub fn activate(&mut self, index: usize) -> KernelResult<()> {
        let timer = self.timer(index);
        if timer.is_active() {
            return Err(KernelError::AlreadyActive);
        }
        if timer.remaining == 0 {
            return Err(KernelError::ZeroDuration);
        }
        self.insert(index);
        Ok(())
    }

    /// Link an inactive timer with `remaining > 0` into its slot
    fn insert(&mut self, index: usize) {
        let width = self.width();
        let remaining = self.timer(index).remaining;
        crate::sched_assert!(remaining > 0, "inserting an expired timer");
        let ahead = remaining.min(width) - 1;
        let slot = ((self.current as u64 + ahead) % width) as usize;
        self.link(index, ListRef::Slot(slot));
    }

    /// Reinsert a timer just popped from the expiring list
    pub fn reinsert(&mut self, index: usize) {
        crate::sched_assert!(!self.timer(index).is_active(), "reinserting a linked timer");
        self.insert(index);
    }

    /// Take a timer off the wheel, keeping its true ticks left
    ///
    /// No-op for an inactive timer.
    pub fn deactivate(&mut self, index: usize) {
        if !self.timer(index).is_active() {
            return;
        }
        let left = self.ticks_left(index);
        self.unlink(index);
        self.timer_mut(index).remaining = left;
    }

    /// Ticks until the timer fires, 0 when inactive
    pub fn ticks_left(&self, index: usize) -> u64 {
        let timer = self.timer(index);
        let width = self.width();
        let laps = timer.remaining.saturating_sub(width);
        match timer.list {
            ListRef::None => 0,
            ListRef::Expiring => laps,
            ListRef::Slot(slot) => {
                let distance = (slot as u64 + width - self.current as u64) % width;
                distance + 1 + laps
            }
        }
    }

    /// Move the current slot onto the expiring list and advance
    pub fn begin_tick(&mut self) {
        crate::sched_assert!(self.expiring.is_none(), "expiring list not drained");
        if let Some(head) = self.slots[self.current].take() {
            let mut cursor = head;
            loop {
                self.timers[cursor].list = ListRef::Expiring;
                cursor = self.timers[cursor].next;
                if cursor == head {
                    break;
                }
            }
            self.expiring = Some(head);
        }
        self.current = (self.current + 1) % self.slots.len();
    }

    /// Unlink the next timer of the expiring list
    pub fn pop_expiring(&mut self) -> Option<usize> {
        let head = self.expiring?;
        self.unlink(head);
        Some(head)
    }

    fn head_of(&mut self, list: ListRef) -> &mut Option<usize> {
        match list {
            ListRef::Slot(slot) => &mut self.slots[slot],
            ListRef::Expiring => &mut self.expiring,
            ListRef::None => corrupted("timer list reference is empty"),
        }
    }

    fn link(&mut self, index: usize, list: ListRef) {
        match *self.head_of(list) {
            None => {
                let timer = &mut self.timers[index];
                timer.next = index;
                timer.previous = index;
                *self.head_of(list) = Some(index);
            }
            Some(head) => {
                let tail = self.timers[head].previous;
                self.timers[index].next = head;
                self.timers[index].previous = tail;
                self.timers[tail].next = index;
                self.timers[head].previous = index;
            }
        }
        self.timers[index].list = list;
    }

    fn unlink(&mut self, index: usize) {
        let list = self.timers[index].list;
        let (next, previous) = (self.timers[index].next, self.timers[index].previous);

        if next == index {
            *self.head_of(list) = None;
        } else {
            self.timers[previous].next = next;
            self.timers[next].previous = previous;
            let head = self.head_of(list);
            if *head == Some(index) {
                *head = Some(next);
            }
        }
        self.timers[index].list = ListRef::None;
    }

    /// Timers linked into one slot, in insertion order
    #[cfg(test)]
    pub fn slot_members(&self, slot: usize) -> Vec<usize> {
        let mut members = Vec::new();
        if let Some(head) = self.slots[slot] {
            let mut cursor = head;
            loop {
                members.push(cursor);
                cursor = self.timers[cursor].next;
                if cursor == head {
                    break;
                }
            }
        }
        members
    }
}
