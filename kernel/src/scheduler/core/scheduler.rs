//! Scheduler Core - preemptive priority scheduling with preemption threshold
//!
//! One owned `Scheduler` holds every table: the TCB arena, the ready lists
//! and their bitmap, the preemption-threshold tracker, per-core current and
//! execute threads and the timer wheel. Every operation runs inside the
//! kernel critical section and ends by recomputing the execute thread(s).
//!
//! # Selection rules
//! - Strict priority across levels, FIFO within a level
//! - A running thread with `preempt_threshold < priority` is only displaced
//!   by ready threads more urgent than its threshold
//! - A displaced threshold holder is recorded and gets the processor back
//!   ahead of the ready threads its threshold still blocks
//! - With more than one core, `rebalance` maps ready threads to cores

use super::affinity::{CoreId, CoreMask};
use super::error::{KernelError, KernelResult};
use super::ready_queue::ReadyQueues;
use super::statistics::SchedulerStats;
use super::threshold::ThresholdTracker;
use crate::config::KernelConfig;
use crate::scheduler::thread::state::{ThreadFlags, ThreadState};
use crate::scheduler::thread::thread::{Tcb, ThreadHandle, ThreadInfo, ThreadOptions, ThreadTable};
use crate::scheduler::Priority;
use crate::time::wheel::TimerWheel;
use alloc::vec::Vec;

/// Per-core scheduling state
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CoreState {
    /// Thread whose context the core is running
    pub current: Option<usize>,
    /// Thread the core should be running
    pub execute: Option<usize>,
    /// Interrupt nesting depth
    pub isr_nesting: u32,
    /// Rebalance scratch: chosen thread
    pub candidate: Option<usize>,
}

/// Scheduler global state
pub struct Scheduler {
    pub(crate) config: KernelConfig,
    pub(crate) threads: ThreadTable,
    pub(crate) ready: ReadyQueues,
    pub(crate) threshold: ThresholdTracker,
    pub(crate) cores: Vec<CoreState>,
    pub(crate) wheel: TimerWheel,
    /// Kernel-operation lock count; no switch while non-zero
    pub(crate) preempt_disable: u32,
    /// Ticks since start
    pub(crate) clock: u64,
    pub(crate) stats: SchedulerStats,
}

impl Scheduler {
    /// Create scheduler
    ///
    /// Every arena is allocated here; nothing allocates afterwards.
    pub fn new(config: KernelConfig) -> KernelResult<Self> {
        config.validate()?;

        let mut cores = Vec::with_capacity(config.cores);
        cores.resize(config.cores, CoreState::default());

        log::info!(
            "Scheduler initialized: {} priorities, {} cores, {}-slot wheel, {} threads, {} timers",
            config.priority_levels,
            config.cores,
            config.timer_wheel_slots,
            config.max_threads,
            config.max_timers
        );

        Ok(Self {
            threads: ThreadTable::new(config.max_threads),
            ready: ReadyQueues::new(config.priority_levels),
            threshold: ThresholdTracker::new(config.priority_levels),
            cores,
            wheel: TimerWheel::new(config.timer_wheel_slots, config.max_threads, config.max_timers),
            preempt_disable: 0,
            clock: 0,
            stats: SchedulerStats::new(),
            config,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Get statistics
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub(crate) fn check_priority(&self, priority: Priority) -> KernelResult<()> {
        if priority >= self.config.priority_levels {
            return Err(crate::kernel_error!(KernelError::InvalidPriority {
                value: priority,
                levels: self.config.priority_levels,
            }));
        }
        Ok(())
    }

    pub(crate) fn check_core(&self, core: CoreId) -> &CoreState {
        match self.cores.get(core) {
            Some(state) => state,
            None => super::error::corrupted("core id beyond configured cores"),
        }
    }

    /// Create a thread; it starts Ready unless `options.suspended()` was used
    pub fn create_thread(&mut self, options: ThreadOptions) -> KernelResult<ThreadHandle> {
        self.check_priority(options.priority)?;
        let threshold = options.preempt_threshold.unwrap_or(options.priority);
        if threshold > options.priority {
            return Err(crate::kernel_error!(KernelError::InvalidThreshold {
                threshold,
                priority: options.priority,
            }));
        }
        if !options.core_exclusion.leaves_core(self.config.cores) {
            return Err(crate::kernel_error!(KernelError::InvalidCoreMask {
                mask: options.core_exclusion.bits(),
            }));
        }
        let Some(index) = self.threads.vacant() else {
            return Err(crate::kernel_error!(KernelError::CapacityExhausted {
                capacity: self.threads.capacity(),
            }));
        };

        let time_slice = options.time_slice.unwrap_or(self.config.default_time_slice);
        let handle = self
            .threads
            .insert_at(index, Tcb::new(&options, threshold, time_slice, index));
        let timer = self.wheel.timer_mut(index);
        timer.remaining = 0;
        timer.reload = 0;
        self.stats.record_create();

        log::debug!(
            "thread '{}' created as {} (prio {}, threshold {}, slice {})",
            options.name,
            handle,
            options.priority,
            threshold,
            time_slice
        );

        if options.auto_start {
            self.make_ready(index);
            self.select_execute();
        }
        Ok(handle)
    }

    /// Free a terminated or completed thread
    pub fn delete_thread(&mut self, handle: ThreadHandle) -> KernelResult<()> {
        let index = self.threads.resolve(handle)?;
        if !self.threads.get(index).state.is_terminal() {
            return Err(crate::kernel_error!(KernelError::NotTerminated));
        }

        for core in self.cores.iter_mut() {
            crate::sched_assert!(core.execute != Some(index), "deleting an execute thread");
            if core.current == Some(index) {
                core.current = None;
            }
        }
        self.wheel.deactivate(index);
        let tcb = self.threads.remove(index);
        self.stats.record_delete();
        log::debug!("thread '{}' ({}) deleted", tcb.name, handle);
        Ok(())
    }

    pub fn thread_info(&self, handle: ThreadHandle) -> KernelResult<ThreadInfo> {
        let index = self.threads.resolve(handle)?;
        let tcb = self.threads.get(index);
        Ok(ThreadInfo {
            name: tcb.name,
            state: tcb.state,
            priority: tcb.priority,
            preempt_threshold: tcb.preempt_threshold,
            time_slice: tcb.time_slice,
            time_slice_remaining: tcb.time_slice_remaining,
            run_count: tcb.run_count,
            mapped_core: tcb.mapped_core,
            core_exclusion: tcb.core_exclusion,
            wait_status: tcb.wait_status,
            suspension_sequence: tcb.suspension.sequence,
            suspending: tcb.flags.contains(ThreadFlags::SUSPENDING),
        })
    }

    /// Number of live threads
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Thread whose context `core` is running
    pub fn current_thread(&self, core: CoreId) -> Option<ThreadHandle> {
        self.check_core(core).current.map(|index| self.threads.handle(index))
    }

    /// Thread `core` should be running
    pub fn execute_thread(&self, core: CoreId) -> Option<ThreadHandle> {
        self.check_core(core).execute.map(|index| self.threads.handle(index))
    }

    /// Most urgent priority with a ready thread
    pub fn highest_ready_priority(&self) -> Option<Priority> {
        self.ready.highest()
    }

    /// Ready threads at one level, in run order
    pub fn ready_threads(&self, priority: Priority) -> impl Iterator<Item = ThreadHandle> + '_ {
        self.ready
            .iter(&self.threads, priority)
            .map(move |index| self.threads.handle(index))
    }

    /// Priorities with a pending preempted threshold holder, lowest first
    pub fn pending_thresholds(&self) -> impl Iterator<Item = (Priority, ThreadHandle)> + '_ {
        self.threshold
            .pending()
            .map(move |(priority, index)| (priority, self.threads.handle(index)))
    }

    /// Put a thread at the tail of its ready list with a fresh time slice
    pub(crate) fn make_ready(&mut self, index: usize) {
        let tcb = self.threads.get_mut(index);
        tcb.set_state(ThreadState::Ready);
        tcb.time_slice_remaining = tcb.time_slice;
        self.ready.enqueue_tail(&mut self.threads, index);
        self.stats.record_resume();
    }

    /// Take a ready thread off the ready structures
    pub(crate) fn make_unready(&mut self, index: usize) {
        self.ready.remove(&mut self.threads, index);
        let priority = self.threads.get(index).priority;
        self.threshold.forget(priority, index);
        self.stats.record_suspend();
    }

    /// Recompute the execute thread of every core
    pub(crate) fn select_execute(&mut self) {
        self.stats.record_pick();
        if self.cores.len() > 1 {
            self.rebalance();
        } else {
            self.select_single();
        }
    }

    fn select_single(&mut self) {
        let previous = self.cores[0].execute;

        let holder = match previous {
            Some(index) if self.threads.get(index).holds_threshold() => Some(index),
            _ => self.take_pending_holder(),
        };

        let highest = self.ready.highest();
        let chosen = match holder {
            Some(index) => {
                let tcb = self.threads.get(index);
                match highest {
                    Some(priority) if priority < tcb.preempt_threshold => {
                        self.threshold.record(tcb.priority, index);
                        if previous == Some(index) {
                            self.stats.record_threshold_preemption();
                            log::trace!("threshold of '{}' beaten by prio {}", tcb.name, priority);
                        }
                        self.ready.head(priority)
                    }
                    Some(priority) => {
                        if priority < tcb.priority {
                            self.stats.record_threshold_block();
                        }
                        Some(index)
                    }
                    None => Some(index),
                }
            }
            None => highest.and_then(|priority| self.ready.head(priority)),
        };

        if chosen != previous {
            if let Some(index) = previous {
                if self.threads.get(index).state == ThreadState::Ready {
                    self.stats.record_preemption();
                }
            }
        }
        self.cores[0].execute = chosen;
    }

    /// Pop tracker records until one still names a ready holder
    pub(crate) fn take_pending_holder(&mut self) -> Option<usize> {
        while let Some((priority, index)) = self.threshold.take_lowest() {
            let tcb = self.threads.get(index);
            if tcb.priority == priority && tcb.holds_threshold() {
                return Some(index);
            }
        }
        None
    }

    /// Charge one tick to the running thread of every core
    ///
    /// Threads whose slice ran out move behind their peers in ready-list
    /// order, so a waiting peer always gets ahead of every expired one. The
    /// execute threads are recomputed once afterwards.
    pub(crate) fn charge_time_slices(&mut self) {
        let mut expired = CoreMask::empty();
        for core in 0..self.cores.len() {
            if self.charge_time_slice(core) {
                expired.set(core);
            }
        }
        if expired.is_empty() {
            return;
        }

        for core in 0..self.cores.len() {
            let Some(index) = self.cores[core].current.filter(|_| expired.is_set(core)) else {
                continue;
            };
            let priority = self.threads.get(index).priority;
            let seen = (0..core).any(|earlier| {
                expired.is_set(earlier)
                    && self.cores[earlier]
                        .current
                        .is_some_and(|other| self.threads.get(other).priority == priority)
            });
            if !seen {
                self.rotate_expired(priority, expired);
            }
        }

        for core in 0..self.cores.len() {
            if expired.is_set(core) {
                self.cores[core].execute = None;
            }
        }
        self.select_execute();
    }

    /// Charge one tick to the thread running on `core`; true when its
    /// slice ran out and was reloaded
    fn charge_time_slice(&mut self, core: CoreId) -> bool {
        let state = self.cores[core];
        let Some(index) = state.current else {
            return false;
        };
        if state.execute != Some(index) {
            return false;
        }

        let tcb = self.threads.get_mut(index);
        if tcb.time_slice == 0 || tcb.holds_threshold() || tcb.state != ThreadState::Ready {
            return false;
        }
        tcb.time_slice_remaining = tcb.time_slice_remaining.saturating_sub(1);
        if tcb.time_slice_remaining > 0 {
            return false;
        }

        tcb.time_slice_remaining = tcb.time_slice;
        self.stats.record_time_slice();
        log::trace!("core {}: time slice of thread #{} expired", core, index);
        true
    }

    /// Move every thread of `priority` running on an `expired` core to the
    /// tail of its list, keeping their relative order
    fn rotate_expired(&mut self, priority: Priority, expired: CoreMask) {
        let mut cursor = self.ready.head(priority);
        for _ in 0..self.ready.len(&self.threads, priority) {
            let Some(index) = cursor else { break };
            cursor = self.threads.get(index).ready_link.map(|link| link.next);
            let running = (0..self.cores.len())
                .any(|core| expired.is_set(core) && self.cores[core].current == Some(index));
            if running {
                self.ready.rotate(&mut self.threads, index);
            }
        }
    }
}
