//! Dispatcher - when to switch, and the bookkeeping of a switch
//!
//! The dispatcher never switches contexts itself. It tells the caller
//! whether the core's current thread differs from its execute thread while
//! a switch is allowed; the host then performs the switch and reports it
//! through `switch_to_execute`.

use super::affinity::CoreId;
use super::scheduler::Scheduler;
use crate::scheduler::thread::thread::ThreadHandle;

/// Outcome of a performed switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    pub from: Option<ThreadHandle>,
    pub to: Option<ThreadHandle>,
}

impl Scheduler {
    /// Does `core` need a context switch now?
    pub fn request_reschedule(&self, core: CoreId) -> bool {
        let state = self.check_core(core);
        state.current != state.execute && state.isr_nesting == 0 && self.preempt_disable == 0
    }

    /// Record that `core` now runs its execute thread
    ///
    /// Bumps the incoming thread's run count. Its time slice is left as is:
    /// a thread coming back from preemption finishes the slice it started.
    pub fn switch_to_execute(&mut self, core: CoreId) -> Switch {
        let state = *self.check_core(core);
        let from = state.current.map(|index| self.threads.handle(index));
        let to = state.execute.map(|index| self.threads.handle(index));

        if state.current != state.execute {
            if let Some(index) = state.execute {
                self.threads.get_mut(index).run_count += 1;
            }
            self.cores[core].current = state.execute;
            self.stats.record_switch();
            log::trace!("core {}: switch {:?} -> {:?}", core, from, to);
        }

        Switch { from, to }
    }

    /// Interrupt entry on `core`
    pub fn enter_isr(&mut self, core: CoreId) {
        self.check_core(core);
        self.cores[core].isr_nesting += 1;
    }

    /// Interrupt exit on `core`; true when a switch is now warranted
    pub fn exit_isr(&mut self, core: CoreId) -> bool {
        let state = &mut self.cores[core];
        crate::sched_assert!(state.isr_nesting > 0, "interrupt exit without entry");
        state.isr_nesting -= 1;
        self.request_reschedule(core)
    }

    /// Is `core` inside an interrupt handler?
    pub fn in_isr(&self, core: CoreId) -> bool {
        self.check_core(core).isr_nesting > 0
    }

    pub fn preempt_disable(&mut self) {
        self.preempt_disable += 1;
    }

    /// Re-enable preemption; true when the last disable was lifted
    pub fn preempt_enable(&mut self) -> bool {
        crate::sched_assert!(self.preempt_disable > 0, "preempt_enable without disable");
        self.preempt_disable -= 1;
        self.preempt_disable == 0
    }

    pub fn preempt_count(&self) -> u32 {
        self.preempt_disable
    }
}
