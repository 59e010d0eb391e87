//! Thread Control Block and thread arena
//!
//! TCBs live in a fixed arena sized from the configuration. Ready-list
//! links and the internal timer are arena indices, never pointers; the
//! public `ThreadHandle` adds a generation so a deleted slot cannot be
//! reached through a stale handle.

use super::state::{validate_transition, ThreadFlags, ThreadState, WaitStatus};
use crate::scheduler::core::affinity::{CoreId, CoreMask};
use crate::scheduler::core::error::{corrupted, KernelError, KernelResult};
use crate::scheduler::{Priority, Scheduler};
use crate::time::Timeout;
use alloc::vec::Vec;
use core::fmt;

/// Stable thread identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadHandle {
    index: u32,
    generation: u32,
}

impl ThreadHandle {
    pub(crate) const fn new(index: usize, generation: u32) -> Self {
        Self {
            index: index as u32,
            generation,
        }
    }

    /// Arena slot
    pub const fn index(&self) -> usize {
        self.index as usize
    }

    /// Slot generation at creation time
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}#{}", self.index, self.generation)
    }
}

/// Identifies one wait episode of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitToken {
    /// Suspension sequence number
    pub sequence: u32,
    /// Opaque context registered by the waiting primitive
    pub context: usize,
}

/// Suspension cleanup callback
///
/// Invoked on timeout, abort or termination of a `Waiting` thread so the
/// primitive it waits on can drop its bookkeeping. It must tolerate a stale
/// token: the wait may already have been satisfied.
pub type CleanupFn = fn(&mut Scheduler, ThreadHandle, WaitToken, WaitStatus);

/// Suspension record
#[derive(Clone, Copy)]
pub(crate) struct Suspension {
    pub cleanup: Option<CleanupFn>,
    pub context: usize,
    pub sequence: u32,
}

impl Suspension {
    pub const fn none() -> Self {
        Self {
            cleanup: None,
            context: 0,
            sequence: 0,
        }
    }

    pub fn token(&self) -> WaitToken {
        WaitToken {
            sequence: self.sequence,
            context: self.context,
        }
    }
}

/// Ready-list neighbours; a lone thread links to itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadyLink {
    pub next: usize,
    pub previous: usize,
}

/// Thread creation parameters
#[derive(Debug, Clone, Copy)]
pub struct ThreadOptions {
    pub name: &'static str,
    pub priority: Priority,
    /// `None` means no threshold (equal to the priority)
    pub preempt_threshold: Option<Priority>,
    /// `None` takes the configured default
    pub time_slice: Option<u32>,
    pub auto_start: bool,
    pub core_exclusion: CoreMask,
}

impl ThreadOptions {
    pub const fn new(name: &'static str, priority: Priority) -> Self {
        Self {
            name,
            priority,
            preempt_threshold: None,
            time_slice: None,
            auto_start: true,
            core_exclusion: CoreMask::empty(),
        }
    }

    pub const fn preempt_threshold(mut self, threshold: Priority) -> Self {
        self.preempt_threshold = Some(threshold);
        self
    }

    pub const fn time_slice(mut self, ticks: u32) -> Self {
        self.time_slice = Some(ticks);
        self
    }

    pub const fn suspended(mut self) -> Self {
        self.auto_start = false;
        self
    }

    pub const fn exclude_cores(mut self, mask: CoreMask) -> Self {
        self.core_exclusion = mask;
        self
    }
}

/// Thread snapshot returned by `Scheduler::thread_info`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    pub name: &'static str,
    pub state: ThreadState,
    pub priority: Priority,
    pub preempt_threshold: Priority,
    pub time_slice: u32,
    pub time_slice_remaining: u32,
    pub run_count: u64,
    pub mapped_core: CoreId,
    pub core_exclusion: CoreMask,
    pub wait_status: WaitStatus,
    pub suspension_sequence: u32,
    pub suspending: bool,
}

/// Thread Control Block
pub(crate) struct Tcb {
    pub name: &'static str,
    pub priority: Priority,
    pub preempt_threshold: Priority,
    pub state: ThreadState,
    pub flags: ThreadFlags,
    pub time_slice: u32,
    pub time_slice_remaining: u32,
    pub ready_link: Option<ReadyLink>,
    /// Internal timer slot in the wheel's arena
    pub timer: usize,
    pub suspension: Suspension,
    /// Target state while `SUSPENDING` is set
    pub pending_state: ThreadState,
    pub pending_timeout: Timeout,
    pub wait_status: WaitStatus,
    pub mapped_core: CoreId,
    pub core_exclusion: CoreMask,
    pub run_count: u64,
}

impl Tcb {
    pub fn new(options: &ThreadOptions, threshold: Priority, time_slice: u32, timer: usize) -> Self {
        Self {
            name: options.name,
            priority: options.priority,
            preempt_threshold: threshold,
            state: ThreadState::Suspended,
            flags: ThreadFlags::empty(),
            time_slice,
            time_slice_remaining: time_slice,
            ready_link: None,
            timer,
            suspension: Suspension::none(),
            pending_state: ThreadState::Suspended,
            pending_timeout: Timeout::Forever,
            wait_status: WaitStatus::Success,
            mapped_core: 0,
            core_exclusion: options.core_exclusion,
            run_count: 0,
        }
    }

    /// Ready and currently protected by a preemption threshold
    #[inline]
    pub fn holds_threshold(&self) -> bool {
        self.state == ThreadState::Ready && self.preempt_threshold < self.priority
    }

    /// Change state, trapping on transitions the state machine forbids
    pub fn set_state(&mut self, state: ThreadState) {
        if !validate_transition(self.state, state) {
            log::error!("{} -> {} on thread '{}'", self.state, state, self.name);
            corrupted("illegal thread state transition");
        }
        self.state = state;
    }
}

struct ThreadSlot {
    generation: u32,
    tcb: Option<Tcb>,
}

/// Fixed-capacity TCB arena
pub(crate) struct ThreadTable {
    slots: Vec<ThreadSlot>,
    live: usize,
}

impl ThreadTable {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(ThreadSlot {
                generation: 0,
                tcb: None,
            });
        }
        Self { slots, live: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    /// First free slot, if any
    pub fn vacant(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.tcb.is_none())
    }

    /// Map a handle to its slot, rejecting stale and out-of-range handles
    pub fn resolve(&self, handle: ThreadHandle) -> KernelResult<usize> {
        match self.slots.get(handle.index()) {
            Some(slot) if slot.generation == handle.generation() && slot.tcb.is_some() => {
                Ok(handle.index())
            }
            _ => Err(KernelError::InvalidHandle),
        }
    }

    pub fn handle(&self, index: usize) -> ThreadHandle {
        ThreadHandle::new(index, self.slots[index].generation)
    }

    #[inline]
    pub fn get(&self, index: usize) -> &Tcb {
        match self.slots.get(index).and_then(|slot| slot.tcb.as_ref()) {
            Some(tcb) => tcb,
            None => corrupted("thread index points at an empty slot"),
        }
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> &mut Tcb {
        match self.slots.get_mut(index).and_then(|slot| slot.tcb.as_mut()) {
            Some(tcb) => tcb,
            None => corrupted("thread index points at an empty slot"),
        }
    }

    /// Store a TCB in the given vacant slot
    pub fn insert_at(&mut self, index: usize, tcb: Tcb) -> ThreadHandle {
        crate::sched_assert!(self.slots[index].tcb.is_none(), "thread slot already in use");
        self.slots[index].tcb = Some(tcb);
        self.live += 1;
        self.handle(index)
    }

    /// Free a slot; every outstanding handle to it becomes invalid
    pub fn remove(&mut self, index: usize) -> Tcb {
        let slot = &mut self.slots[index];
        let Some(tcb) = slot.tcb.take() else {
            corrupted("removing an empty thread slot");
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.live -= 1;
        tcb
    }

    /// Live threads in slot order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Tcb)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.tcb.as_ref().map(|tcb| (index, tcb)))
    }
}
