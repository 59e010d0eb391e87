//! Load Balancer - multi-core execute-thread mapping
//!
//! With more than one core every selection rebuilds the core -> thread map:
//!
//! 1. Threshold holders keep their core; preempted holders are restored
//!    lowest priority first.
//! 2. Ready threads are scanned in priority then FIFO order. Each goes to
//!    its last core if free and allowed, else the lowest free allowed core.
//!    Failing that, a placed thread that may run on a free core moves there
//!    and leaves its slot; else it evicts a holder whose threshold it beats.
//! 3. The map is committed and `mapped_core` updated.
//!
//! A thread is the execute thread of at most one core.

use super::affinity::{allowed_on, CoreId, CoreMask};
use super::error::{KernelError, KernelResult};
use super::scheduler::{CoreState, Scheduler};
use crate::scheduler::thread::state::ThreadState;
use crate::scheduler::thread::thread::{ThreadHandle, ThreadTable};

impl Scheduler {
    pub(crate) fn rebalance(&mut self) {
        self.stats.record_rebalance();
        let cores = self.cores.len();

        for core in self.cores.iter_mut() {
            core.candidate = None;
        }

        // Running holders keep their core
        for core in 0..cores {
            if let Some(index) = self.cores[core].execute {
                let tcb = self.threads.get(index);
                if tcb.holds_threshold() && allowed_on(tcb.core_exclusion, core) {
                    self.cores[core].candidate = Some(index);
                }
            }
        }

        // Restore preempted holders
        for (_, index) in self.threshold.pending() {
            let tcb = self.threads.get(index);
            if !tcb.holds_threshold() || self.cores.iter().any(|c| c.candidate == Some(index)) {
                continue;
            }
            if let Some(core) = free_core(&self.cores, tcb.mapped_core, tcb.core_exclusion) {
                self.cores[core].candidate = Some(index);
            }
        }

        // Ready threads by priority, FIFO within a level
        'scan: for priority in self.ready.priorities() {
            for index in self.ready.iter(&self.threads, priority) {
                if self.cores.iter().all(|c| c.candidate.is_some()) && !self.has_evictable(priority) {
                    break 'scan;
                }
                if self.cores.iter().any(|c| c.candidate == Some(index)) {
                    continue;
                }

                let tcb = self.threads.get(index);
                if let Some(core) = free_core(&self.cores, tcb.mapped_core, tcb.core_exclusion) {
                    self.cores[core].candidate = Some(index);
                    continue;
                }
                if let Some(core) = shift_placed(&mut self.cores, &self.threads, tcb.core_exclusion) {
                    self.cores[core].candidate = Some(index);
                    continue;
                }

                // Evict the weakest holder this thread beats
                let mut victim: Option<(CoreId, usize)> = None;
                for (core, state) in self.cores.iter().enumerate() {
                    let Some(holder) = state.candidate else { continue };
                    let held = self.threads.get(holder);
                    if !allowed_on(tcb.core_exclusion, core)
                        || !held.holds_threshold()
                        || priority >= held.preempt_threshold
                    {
                        continue;
                    }
                    let weaker = match victim {
                        Some((_, current)) => held.preempt_threshold > self.threads.get(current).preempt_threshold,
                        None => true,
                    };
                    if weaker {
                        victim = Some((core, holder));
                    }
                }
                if let Some((core, holder)) = victim {
                    let held = self.threads.get(holder);
                    log::trace!("core {}: '{}' beats threshold of '{}'", core, tcb.name, held.name);
                    self.threshold.record(held.priority, holder);
                    self.stats.record_threshold_preemption();
                    self.cores[core].candidate = Some(index);
                }
            }
        }

        for core in 0..cores {
            if let Some(index) = self.cores[core].execute {
                if self.threads.get(index).state == ThreadState::Ready
                    && !self.cores.iter().any(|c| c.candidate == Some(index))
                {
                    self.stats.record_preemption();
                }
            }
        }

        // Commit
        for core in 0..cores {
            let chosen = self.cores[core].candidate.take();
            self.cores[core].execute = chosen;

            if let Some(index) = chosen {
                let tcb = self.threads.get_mut(index);
                if tcb.mapped_core != core {
                    tcb.mapped_core = core;
                    self.stats.record_migration();
                }
                let priority = tcb.priority;
                self.threshold.forget(priority, index);
            }
        }
    }

    /// Could a thread at `priority` still evict one of the chosen holders?
    fn has_evictable(&self, priority: u32) -> bool {
        self.cores.iter().any(|state| {
            state.candidate.map_or(false, |index| {
                let tcb = self.threads.get(index);
                tcb.holds_threshold() && priority < tcb.preempt_threshold
            })
        })
    }

    /// Keep a thread off the cores in `mask`
    pub fn core_exclude(&mut self, handle: ThreadHandle, mask: CoreMask) -> KernelResult<CoreMask> {
        let index = self.threads.resolve(handle)?;
        if !mask.leaves_core(self.config.cores) {
            return Err(crate::kernel_error!(KernelError::InvalidCoreMask { mask: mask.bits() }));
        }

        let tcb = self.threads.get_mut(index);
        let previous = tcb.core_exclusion;
        tcb.core_exclusion = mask;
        if tcb.state == ThreadState::Ready {
            self.select_execute();
        }
        Ok(previous)
    }
}

/// `preferred` if free and allowed, else the lowest free allowed core
/// Move a placed non-holder off a core `exclusion` allows and onto a free
/// core it may use; returns the core given up
fn shift_placed(cores: &mut [CoreState], threads: &ThreadTable, exclusion: CoreMask) -> Option<CoreId> {
    for core in 0..cores.len() {
        if !allowed_on(exclusion, core) {
            continue;
        }
        let Some(placed) = cores[core].candidate else { continue };
        let tcb = threads.get(placed);
        if tcb.holds_threshold() {
            continue;
        }
        if let Some(free) = free_core(cores, tcb.mapped_core, tcb.core_exclusion) {
            log::trace!("core {}: '{}' moves to core {} to make room", core, tcb.name, free);
            cores[free].candidate = Some(placed);
            cores[core].candidate = None;
            return Some(core);
        }
    }
    None
}

fn free_core(cores: &[CoreState], preferred: CoreId, exclusion: CoreMask) -> Option<CoreId> {
    let usable = |core: CoreId| cores[core].candidate.is_none() && allowed_on(exclusion, core);
    if preferred < cores.len() && usable(preferred) {
        return Some(preferred);
    }
    (0..cores.len()).find(|&core| usable(core))
}
