//! Thread lifecycle - suspension, wake-up and parameter changes
//!
//! Every transition keeps the ready lists, the priority bitmap, the
//! threshold tracker and the thread's internal timer consistent, then
//! recomputes the execute thread(s).
//!
//! Suspension is two-phase. `prepare_wait` marks the thread `SUSPENDING`
//! and hands out a [`WaitToken`]; `commit_suspend` takes it off the ready
//! lists. A resume or wake arriving between the two cancels the suspension.

use super::state::{ThreadFlags, ThreadState, WaitStatus};
use super::thread::{CleanupFn, ThreadHandle, WaitToken};
use crate::scheduler::core::affinity::CoreId;
use crate::scheduler::core::error::{KernelError, KernelResult};
use crate::scheduler::{Priority, Scheduler};
use crate::time::Timeout;

/// What a suspension waits for
#[derive(Clone, Copy)]
pub struct WaitSpec {
    pub(crate) state: ThreadState,
    pub(crate) timeout: Timeout,
    pub(crate) cleanup: Option<CleanupFn>,
    pub(crate) context: usize,
}

impl WaitSpec {
    /// Explicit suspension
    pub const fn suspend(timeout: Timeout) -> Self {
        Self {
            state: ThreadState::Suspended,
            timeout,
            cleanup: None,
            context: 0,
        }
    }

    /// Pure timeout
    pub const fn sleep(ticks: u64) -> Self {
        Self {
            state: ThreadState::Sleeping,
            timeout: Timeout::Ticks(ticks),
            cleanup: None,
            context: 0,
        }
    }

    /// Wait on a primitive; `cleanup` runs on timeout, abort and termination
    pub const fn wait(cleanup: CleanupFn, context: usize, timeout: Timeout) -> Self {
        Self {
            state: ThreadState::Waiting,
            timeout,
            cleanup: Some(cleanup),
            context,
        }
    }
}

/// Result of a suspension request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendOutcome {
    /// Thread left the ready lists
    Suspended,
    /// Thread was already explicitly suspended
    AlreadySuspended,
    /// Thread is waiting; it becomes Suspended when the wait ends
    Delayed,
    /// A resume or wake raced in after `prepare_wait`
    Cancelled,
    /// Zero timeout: the wait ended before it started
    TimedOut,
    /// Zero-tick sleep: the thread stays ready and the sleep succeeds
    Skipped,
}

/// Result of a resume request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Thread was put at the tail of its ready list
    Queued,
    AlreadyReady,
    /// In-flight suspension cancelled
    CancelledSuspend,
    /// Pending delayed suspension dropped; the wait continues
    SuspendLifted,
    /// Sleep or wait aborted
    WaitAborted,
}

impl Scheduler {
    fn reject_terminal(&self, index: usize) -> KernelResult<()> {
        match self.threads.get(index).state {
            ThreadState::Terminated => Err(crate::kernel_error!(KernelError::AlreadyTerminated)),
            ThreadState::Completed => Err(crate::kernel_error!(KernelError::AlreadyCompleted)),
            _ => Ok(()),
        }
    }

    fn current_index(&self, core: CoreId) -> KernelResult<usize> {
        self.check_core(core)
            .current
            .ok_or_else(|| crate::kernel_error!(KernelError::NoCurrentThread { core }))
    }

    /// Phase one of a suspension
    pub fn prepare_wait(&mut self, handle: ThreadHandle, spec: WaitSpec) -> KernelResult<WaitToken> {
        let index = self.threads.resolve(handle)?;
        self.reject_terminal(index)?;

        let tcb = self.threads.get_mut(index);
        if tcb.state != ThreadState::Ready {
            return Err(crate::kernel_error!(KernelError::NotReady));
        }

        tcb.flags.insert(ThreadFlags::SUSPENDING);
        tcb.suspension.sequence = tcb.suspension.sequence.wrapping_add(1);
        tcb.suspension.cleanup = spec.cleanup;
        tcb.suspension.context = spec.context;
        tcb.pending_state = spec.state;
        tcb.pending_timeout = spec.timeout;
        tcb.wait_status = WaitStatus::Success;
        Ok(tcb.suspension.token())
    }

    /// Phase two of a suspension
    pub fn commit_suspend(&mut self, handle: ThreadHandle) -> KernelResult<SuspendOutcome> {
        let index = self.threads.resolve(handle)?;
        let tcb = self.threads.get_mut(index);
        if !tcb.flags.contains(ThreadFlags::SUSPENDING) || tcb.state != ThreadState::Ready {
            return Ok(SuspendOutcome::Cancelled);
        }
        tcb.flags.remove(ThreadFlags::SUSPENDING);

        match tcb.pending_timeout {
            Timeout::Ticks(0) => {
                tcb.wait_status = WaitStatus::TimedOut;
                let token = tcb.suspension.token();
                let cleanup = tcb.suspension.cleanup.take();
                if let Some(cleanup) = cleanup {
                    cleanup(self, handle, token, WaitStatus::TimedOut);
                }
                return Ok(SuspendOutcome::TimedOut);
            }
            Timeout::Ticks(ticks) => {
                self.wheel.timer_mut(tcb.timer).remaining = ticks;
            }
            Timeout::Forever => {}
        }

        let target = tcb.pending_state;
        let timer = (!tcb.pending_timeout.is_forever()).then_some(tcb.timer);
        self.make_unready(index);
        self.threads.get_mut(index).set_state(target);
        if let Some(timer) = timer {
            self.wheel.activate(timer)?;
        }
        log::trace!("thread {} -> {}", handle, target);

        self.select_execute();
        Ok(SuspendOutcome::Suspended)
    }

    /// Suspend a thread, optionally for at most `timeout` ticks
    ///
    /// `core` is the calling core; suspending its own current thread is
    /// refused while preemption is disabled.
    pub fn suspend(&mut self, core: CoreId, handle: ThreadHandle, timeout: Timeout) -> KernelResult<SuspendOutcome> {
        let index = self.threads.resolve(handle)?;
        self.reject_terminal(index)?;

        match self.threads.get(index).state {
            ThreadState::Suspended => Ok(SuspendOutcome::AlreadySuspended),
            ThreadState::Sleeping | ThreadState::Waiting => {
                self.threads.get_mut(index).flags.insert(ThreadFlags::DELAYED_SUSPEND);
                Ok(SuspendOutcome::Delayed)
            }
            _ => {
                if self.check_core(core).current == Some(index) && self.preempt_disable > 0 {
                    return Err(crate::kernel_error!(KernelError::PreemptionDisallowed {
                        count: self.preempt_disable,
                    }));
                }
                self.prepare_wait(handle, WaitSpec::suspend(timeout))?;
                self.commit_suspend(handle)
            }
        }
    }

    /// Make a suspended thread ready, or cancel / abort what keeps it off
    pub fn resume(&mut self, handle: ThreadHandle) -> KernelResult<ResumeOutcome> {
        let index = self.threads.resolve(handle)?;
        self.reject_terminal(index)?;

        let tcb = self.threads.get_mut(index);
        match tcb.state {
            ThreadState::Ready if tcb.flags.contains(ThreadFlags::SUSPENDING) => {
                tcb.flags.remove(ThreadFlags::SUSPENDING);
                self.stats.record_resume_cancel();
                Ok(ResumeOutcome::CancelledSuspend)
            }
            ThreadState::Ready => Ok(ResumeOutcome::AlreadyReady),
            ThreadState::Suspended => {
                self.wake(index, WaitStatus::Success);
                Ok(ResumeOutcome::Queued)
            }
            ThreadState::Sleeping | ThreadState::Waiting if tcb.flags.contains(ThreadFlags::DELAYED_SUSPEND) => {
                tcb.flags.remove(ThreadFlags::DELAYED_SUSPEND);
                Ok(ResumeOutcome::SuspendLifted)
            }
            _ => {
                self.abort_wait(index);
                Ok(ResumeOutcome::WaitAborted)
            }
        }
    }

    /// End a wait: timer off, status recorded, thread ready (or suspended
    /// when a delayed suspension is pending)
    pub(crate) fn wake(&mut self, index: usize, status: WaitStatus) {
        let tcb = self.threads.get_mut(index);
        self.wheel.deactivate(tcb.timer);
        tcb.wait_status = status;
        tcb.suspension.cleanup = None;

        if tcb.flags.contains(ThreadFlags::DELAYED_SUSPEND) && tcb.state != ThreadState::Suspended {
            tcb.flags.remove(ThreadFlags::DELAYED_SUSPEND);
            tcb.set_state(ThreadState::Suspended);
            log::trace!("thread '{}' wait ended, delayed suspension applied", tcb.name);
            return;
        }

        self.make_ready(index);
        self.select_execute();
    }

    /// Timeout of a thread's internal timer
    pub(crate) fn thread_timeout(&mut self, index: usize) {
        self.stats.record_timeout();
        let tcb = self.threads.get(index);
        match tcb.state {
            ThreadState::Suspended | ThreadState::Sleeping => self.wake(index, WaitStatus::TimedOut),
            ThreadState::Waiting => self.end_wait(index, WaitStatus::TimedOut),
            state => log::warn!("timeout for thread '{}' in state {}", tcb.name, state),
        }
    }

    /// Run the cleanup, then wake the thread unless the cleanup already did
    fn end_wait(&mut self, index: usize, status: WaitStatus) {
        let handle = self.threads.handle(index);
        let tcb = self.threads.get_mut(index);
        let token = tcb.suspension.token();

        match tcb.suspension.cleanup.take() {
            Some(cleanup) => {
                cleanup(self, handle, token, status);
                let tcb = self.threads.get(index);
                if tcb.state == ThreadState::Waiting && tcb.suspension.sequence == token.sequence {
                    self.wake(index, status);
                }
            }
            None => self.wake(index, status),
        }
    }

    fn abort_wait(&mut self, index: usize) {
        self.stats.record_abort();
        match self.threads.get(index).state {
            ThreadState::Waiting => self.end_wait(index, WaitStatus::Aborted),
            _ => self.wake(index, WaitStatus::Aborted),
        }
    }

    /// Abort a sleep or wait; false when the thread was not waiting
    pub fn wait_abort(&mut self, handle: ThreadHandle) -> KernelResult<bool> {
        let index = self.threads.resolve(handle)?;
        self.reject_terminal(index)?;

        match self.threads.get(index).state {
            ThreadState::Sleeping | ThreadState::Waiting => {
                self.abort_wait(index);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Wake a waiting thread if `token` still names its current wait
    ///
    /// A wait that was prepared but not yet committed is cancelled instead.
    pub fn complete_wait(&mut self, handle: ThreadHandle, token: WaitToken, status: WaitStatus) -> KernelResult<bool> {
        let index = self.threads.resolve(handle)?;
        let tcb = self.threads.get_mut(index);
        if tcb.suspension.sequence != token.sequence {
            return Ok(false);
        }

        match tcb.state {
            ThreadState::Waiting => {
                self.wake(index, status);
                Ok(true)
            }
            ThreadState::Ready if tcb.flags.contains(ThreadFlags::SUSPENDING) => {
                tcb.flags.remove(ThreadFlags::SUSPENDING);
                tcb.wait_status = status;
                tcb.suspension.cleanup = None;
                self.stats.record_resume_cancel();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Is `token` still the pending wait of `handle`?
    pub fn wait_pending(&self, handle: ThreadHandle, token: WaitToken) -> bool {
        let Ok(index) = self.threads.resolve(handle) else {
            return false;
        };
        let tcb = self.threads.get(index);
        tcb.suspension.sequence == token.sequence
            && (tcb.state == ThreadState::Waiting
                || (tcb.state == ThreadState::Ready && tcb.flags.contains(ThreadFlags::SUSPENDING)))
    }

    /// Status the thread's last wait ended with
    pub fn wait_status(&self, handle: ThreadHandle) -> KernelResult<WaitStatus> {
        let index = self.threads.resolve(handle)?;
        Ok(self.threads.get(index).wait_status)
    }

    /// Put the current thread of `core` to sleep
    pub fn sleep(&mut self, core: CoreId, ticks: u64) -> KernelResult<SuspendOutcome> {
        if self.in_isr(core) {
            return Err(crate::kernel_error!(KernelError::NotThreadContext { core }));
        }
        let index = self.current_index(core)?;
        if self.preempt_disable > 0 {
            return Err(crate::kernel_error!(KernelError::PreemptionDisallowed {
                count: self.preempt_disable,
            }));
        }
        if ticks == 0 {
            self.threads.get_mut(index).wait_status = WaitStatus::Success;
            return Ok(SuspendOutcome::Skipped);
        }
        let handle = self.threads.handle(index);
        self.prepare_wait(handle, WaitSpec::sleep(ticks))?;
        self.commit_suspend(handle)
    }

    /// Terminate a thread; a waiting thread's cleanup sees `Aborted`
    pub fn terminate(&mut self, handle: ThreadHandle) -> KernelResult<()> {
        let index = self.threads.resolve(handle)?;
        let tcb = self.threads.get(index);
        if tcb.state.is_terminal() {
            return Ok(());
        }

        let was_ready = tcb.state == ThreadState::Ready;
        let cleanup = match tcb.state {
            ThreadState::Waiting => tcb.suspension.cleanup.map(|f| (f, tcb.suspension.token())),
            _ => None,
        };
        if was_ready {
            self.make_unready(index);
        }

        let tcb = self.threads.get_mut(index);
        tcb.set_state(ThreadState::Terminated);
        tcb.flags = ThreadFlags::empty();
        tcb.suspension.cleanup = None;
        self.wheel.deactivate(tcb.timer);
        log::debug!("thread '{}' ({}) terminated", self.threads.get(index).name, handle);

        if let Some((cleanup, token)) = cleanup {
            cleanup(self, handle, token, WaitStatus::Aborted);
        }
        self.select_execute();
        Ok(())
    }

    /// The current thread of `core` returned from its entry point
    pub fn complete(&mut self, core: CoreId) -> KernelResult<ThreadHandle> {
        let index = self.current_index(core)?;
        let handle = self.threads.handle(index);
        if self.threads.get(index).state != ThreadState::Ready {
            self.reject_terminal(index)?;
            return Err(crate::kernel_error!(KernelError::NotReady));
        }

        self.make_unready(index);
        let tcb = self.threads.get_mut(index);
        tcb.flags = ThreadFlags::empty();
        tcb.set_state(ThreadState::Completed);
        self.select_execute();
        Ok(handle)
    }

    /// Yield to equal-priority peers
    pub fn relinquish(&mut self, core: CoreId) -> KernelResult<()> {
        let index = self.current_index(core)?;
        self.stats.record_relinquish();
        if self.threads.get(index).state != ThreadState::Ready {
            return Ok(());
        }

        let tcb = self.threads.get_mut(index);
        tcb.time_slice_remaining = tcb.time_slice;
        self.ready.rotate(&mut self.threads, index);
        if self.cores[core].execute == Some(index) {
            self.cores[core].execute = None;
        }
        self.select_execute();
        Ok(())
    }

    /// Change a thread's priority; returns the old one
    ///
    /// A threshold equal to the old priority follows it; a threshold above
    /// the new priority is clamped. A ready thread goes to the tail of its
    /// new level.
    pub fn priority_change(&mut self, handle: ThreadHandle, priority: Priority) -> KernelResult<Priority> {
        let index = self.threads.resolve(handle)?;
        self.check_priority(priority)?;
        self.reject_terminal(index)?;

        let tcb = self.threads.get(index);
        let old = tcb.priority;
        let was_ready = tcb.state == ThreadState::Ready;
        self.threshold.forget(old, index);
        if was_ready {
            self.ready.remove(&mut self.threads, index);
        }

        let tcb = self.threads.get_mut(index);
        if tcb.preempt_threshold == old || tcb.preempt_threshold > priority {
            tcb.preempt_threshold = priority;
        }
        tcb.priority = priority;

        if was_ready {
            self.ready.enqueue_tail(&mut self.threads, index);
            self.select_execute();
        }
        log::debug!("thread {} priority {} -> {}", handle, old, priority);
        Ok(old)
    }

    /// Change a thread's preemption threshold; returns the old one
    pub fn preemption_change(&mut self, handle: ThreadHandle, threshold: Priority) -> KernelResult<Priority> {
        let index = self.threads.resolve(handle)?;
        self.check_priority(threshold)?;
        self.reject_terminal(index)?;

        let tcb = self.threads.get_mut(index);
        if threshold > tcb.priority {
            return Err(crate::kernel_error!(KernelError::InvalidThreshold {
                threshold,
                priority: tcb.priority,
            }));
        }
        let old = tcb.preempt_threshold;
        tcb.preempt_threshold = threshold;
        let (priority, ready) = (tcb.priority, tcb.state == ThreadState::Ready);
        if threshold == priority {
            self.threshold.forget(priority, index);
        }
        if ready {
            self.select_execute();
        }
        Ok(old)
    }

    /// Change a thread's time slice; returns the old one
    pub fn time_slice_change(&mut self, handle: ThreadHandle, ticks: u32) -> KernelResult<u32> {
        let index = self.threads.resolve(handle)?;
        let tcb = self.threads.get_mut(index);
        let old = tcb.time_slice;
        tcb.time_slice = ticks;
        tcb.time_slice_remaining = ticks;
        Ok(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::scheduler::ThreadOptions;

    fn scheduler() -> Scheduler {
        Scheduler::new(KernelConfig::new().with_max_threads(8)).unwrap()
    }

    #[test]
    fn test_suspend_resume_idempotent() {
        let mut sched = scheduler();
        let t = sched.create_thread(ThreadOptions::new("t", 4)).unwrap();

        assert_eq!(sched.suspend(0, t, Timeout::Forever), Ok(SuspendOutcome::Suspended));
        assert_eq!(sched.suspend(0, t, Timeout::Forever), Ok(SuspendOutcome::AlreadySuspended));
        assert_eq!(sched.highest_ready_priority(), None);

        assert_eq!(sched.resume(t), Ok(ResumeOutcome::Queued));
        assert_eq!(sched.resume(t), Ok(ResumeOutcome::AlreadyReady));
        assert_eq!(sched.ready_threads(4).count(), 1);
    }

    #[test]
    fn test_resume_cancels_prepared_suspension() {
        let mut sched = scheduler();
        let t = sched.create_thread(ThreadOptions::new("t", 4)).unwrap();
        sched.prepare_wait(t, WaitSpec::suspend(Timeout::Forever)).unwrap();
        assert_eq!(sched.resume(t), Ok(ResumeOutcome::CancelledSuspend));
        assert_eq!(sched.commit_suspend(t), Ok(SuspendOutcome::Cancelled));
        assert_eq!(sched.thread_info(t).unwrap().state, ThreadState::Ready);
        assert_eq!(sched.stats().snapshot().resume_cancels, 1);
    }

    #[test]
    fn test_terminal_errors() {
        let mut sched = scheduler();
        let t = sched.create_thread(ThreadOptions::new("t", 4)).unwrap();
        sched.terminate(t).unwrap();
        assert_eq!(sched.suspend(0, t, Timeout::Forever), Err(KernelError::AlreadyTerminated));
        assert_eq!(sched.resume(t), Err(KernelError::AlreadyTerminated));

        let u = sched.create_thread(ThreadOptions::new("u", 4)).unwrap();
        sched.switch_to_execute(0);
        assert_eq!(sched.complete(0), Ok(u));
        assert_eq!(sched.resume(u), Err(KernelError::AlreadyCompleted));
    }

    #[test]
    fn test_self_suspend_with_preemption_disabled() {
        let mut sched = scheduler();
        let t = sched.create_thread(ThreadOptions::new("t", 4)).unwrap();
        sched.switch_to_execute(0);
        sched.preempt_disable();
        assert_eq!(
            sched.suspend(0, t, Timeout::Forever),
            Err(KernelError::PreemptionDisallowed { count: 1 })
        );
        sched.preempt_enable();
        assert_eq!(sched.suspend(0, t, Timeout::Forever), Ok(SuspendOutcome::Suspended));
    }

    #[test]
    fn test_sleep_times_out() {
        let mut sched = scheduler();
        let t = sched.create_thread(ThreadOptions::new("t", 4)).unwrap();
        sched.switch_to_execute(0);
        assert_eq!(sched.sleep(0, 0), Ok(SuspendOutcome::Skipped));
        assert_eq!(sched.wait_status(t), Ok(WaitStatus::Success));
        assert_eq!(sched.thread_info(t).unwrap().state, ThreadState::Ready);
        assert_eq!(sched.sleep(0, 3), Ok(SuspendOutcome::Suspended));

        sched.tick(0);
        sched.tick(0);
        assert_eq!(sched.thread_info(t).unwrap().state, ThreadState::Sleeping);
        sched.tick(0);
        assert_eq!(sched.thread_info(t).unwrap().state, ThreadState::Ready);
        assert_eq!(sched.wait_status(t), Ok(WaitStatus::TimedOut));
    }

    #[test]
    fn test_delayed_suspend_applies_after_wait() {
        let mut sched = scheduler();
        let t = sched.create_thread(ThreadOptions::new("t", 4)).unwrap();
        sched.switch_to_execute(0);
        sched.sleep(0, 2).unwrap();

        assert_eq!(sched.suspend(0, t, Timeout::Forever), Ok(SuspendOutcome::Delayed));
        sched.tick(0);
        sched.tick(0);
        assert_eq!(sched.thread_info(t).unwrap().state, ThreadState::Suspended);
        assert_eq!(sched.resume(t), Ok(ResumeOutcome::Queued));
    }

    #[test]
    fn test_resume_lifts_delayed_suspend() {
        let mut sched = scheduler();
        let t = sched.create_thread(ThreadOptions::new("t", 4)).unwrap();
        sched.switch_to_execute(0);
        sched.sleep(0, 5).unwrap();
        sched.suspend(0, t, Timeout::Forever).unwrap();
        assert_eq!(sched.resume(t), Ok(ResumeOutcome::SuspendLifted));
        assert_eq!(sched.resume(t), Ok(ResumeOutcome::WaitAborted));
        assert_eq!(sched.wait_status(t), Ok(WaitStatus::Aborted));
    }

    #[test]
    fn test_stale_token_does_not_wake() {
        fn no_cleanup(_: &mut Scheduler, _: ThreadHandle, _: WaitToken, _: WaitStatus) {}

        let mut sched = scheduler();
        let t = sched.create_thread(ThreadOptions::new("t", 4)).unwrap();
        let stale = sched.prepare_wait(t, WaitSpec::wait(no_cleanup, 7, Timeout::Forever)).unwrap();
        sched.commit_suspend(t).unwrap();
        sched.wait_abort(t).unwrap();

        let fresh = sched.prepare_wait(t, WaitSpec::wait(no_cleanup, 7, Timeout::Forever)).unwrap();
        sched.commit_suspend(t).unwrap();
        assert_eq!(sched.complete_wait(t, stale, WaitStatus::Success), Ok(false));
        assert!(sched.wait_pending(t, fresh));
        assert_eq!(sched.complete_wait(t, fresh, WaitStatus::Success), Ok(true));
        assert_eq!(sched.thread_info(t).unwrap().state, ThreadState::Ready);
    }

    #[test]
    fn test_priority_change_moves_to_tail() {
        let mut sched = scheduler();
        let a = sched.create_thread(ThreadOptions::new("a", 6)).unwrap();
        let b = sched.create_thread(ThreadOptions::new("b", 4)).unwrap();
        assert_eq!(sched.priority_change(a, 4), Ok(6));
        assert_eq!(sched.ready_threads(4).collect::<alloc::vec::Vec<_>>(), [b, a]);
        assert_eq!(sched.thread_info(a).unwrap().preempt_threshold, 4);
        assert_eq!(sched.priority_change(a, 99), Err(KernelError::InvalidPriority { value: 99, levels: 32 }));
    }

    #[test]
    fn test_relinquish_rotates() {
        let mut sched = scheduler();
        let a = sched.create_thread(ThreadOptions::new("a", 6)).unwrap();
        let b = sched.create_thread(ThreadOptions::new("b", 6)).unwrap();
        sched.switch_to_execute(0);
        sched.relinquish(0).unwrap();
        assert_eq!(sched.execute_thread(0), Some(b));
        sched.switch_to_execute(0);
        sched.relinquish(0).unwrap();
        assert_eq!(sched.execute_thread(0), Some(a));
    }
}
