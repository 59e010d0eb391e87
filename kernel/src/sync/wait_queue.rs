//! Wait Queue
//!
//! FIFO of threads waiting for an event, built on the suspension-cleanup
//! protocol. Entries are `(thread, token)` pairs; an entry whose token no
//! longer names the thread's pending wait (timed out, aborted, terminated)
//! is stale and skipped by `notify_*`.

use crate::scheduler::core::error::{KernelError, KernelResult};
use crate::scheduler::thread::lifecycle::WaitSpec;
use crate::scheduler::thread::state::WaitStatus;
use crate::scheduler::thread::thread::{ThreadHandle, WaitToken};
use crate::scheduler::Scheduler;
use crate::time::Timeout;
use alloc::collections::VecDeque;
use spin::Mutex;

/// A queue of waiting threads
pub struct WaitQueue {
    waiting: Mutex<VecDeque<(ThreadHandle, WaitToken)>>,
    capacity: usize,
}

/// Cleanup for queue waiters: wake with the status the wait ended with
fn wake_waiter(sched: &mut Scheduler, thread: ThreadHandle, token: WaitToken, status: WaitStatus) {
    if let Ok(true) = sched.complete_wait(thread, token, status) {
        log::trace!("queue waiter {} woken with {:?}", thread, status);
    }
}

impl WaitQueue {
    /// Create a new wait queue holding at most `capacity` waiters
    pub fn new(capacity: usize) -> Self {
        Self {
            waiting: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Prepare `thread` to wait on this queue
    ///
    /// The caller commits the suspension with `Scheduler::commit_suspend`.
    pub fn wait(&self, sched: &mut Scheduler, thread: ThreadHandle, timeout: Timeout) -> KernelResult<WaitToken> {
        let mut waiting = self.waiting.lock();
        if waiting.len() >= self.capacity {
            waiting.retain(|&(handle, token)| sched.wait_pending(handle, token));
        }
        if waiting.len() >= self.capacity {
            return Err(crate::kernel_error!(KernelError::CapacityExhausted {
                capacity: self.capacity,
            }));
        }

        let context = self as *const Self as usize;
        let token = sched.prepare_wait(thread, WaitSpec::wait(wake_waiter, context, timeout))?;
        waiting.push_back((thread, token));
        Ok(token)
    }

    /// Wake up the longest waiting thread
    pub fn notify_one(&self, sched: &mut Scheduler) -> Option<ThreadHandle> {
        let mut waiting = self.waiting.lock();
        while let Some((thread, token)) = waiting.pop_front() {
            if let Ok(true) = sched.complete_wait(thread, token, WaitStatus::Success) {
                return Some(thread);
            }
        }
        None
    }

    /// Wake up every waiting thread, returning how many woke
    pub fn notify_all(&self, sched: &mut Scheduler) -> usize {
        let mut waiting = self.waiting.lock();
        let mut woken = 0;
        while let Some((thread, token)) = waiting.pop_front() {
            if let Ok(true) = sched.complete_wait(thread, token, WaitStatus::Success) {
                woken += 1;
            }
        }
        woken
    }

    /// Entries still naming a pending wait
    pub fn len(&self, sched: &Scheduler) -> usize {
        self.waiting
            .lock()
            .iter()
            .filter(|&&(handle, token)| sched.wait_pending(handle, token))
            .count()
    }

    pub fn is_empty(&self, sched: &Scheduler) -> bool {
        self.len(sched) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::scheduler::{ThreadOptions, ThreadState};

    fn waiter(sched: &mut Scheduler, queue: &WaitQueue, name: &'static str, timeout: Timeout) -> ThreadHandle {
        let thread = sched.create_thread(ThreadOptions::new(name, 5)).unwrap();
        queue.wait(sched, thread, timeout).unwrap();
        sched.commit_suspend(thread).unwrap();
        thread
    }

    #[test]
    fn test_fifo_notify() {
        let mut sched = Scheduler::new(KernelConfig::new()).unwrap();
        let queue = WaitQueue::new(4);
        let a = waiter(&mut sched, &queue, "a", Timeout::Forever);
        let b = waiter(&mut sched, &queue, "b", Timeout::Forever);

        assert_eq!(queue.len(&sched), 2);
        assert_eq!(queue.notify_one(&mut sched), Some(a));
        assert_eq!(sched.thread_info(b).unwrap().state, ThreadState::Waiting);
        assert_eq!(queue.notify_all(&mut sched), 1);
        assert!(queue.is_empty(&sched));
    }

    #[test]
    fn test_timed_out_waiter_skipped() {
        let mut sched = Scheduler::new(KernelConfig::new()).unwrap();
        let queue = WaitQueue::new(4);
        let a = waiter(&mut sched, &queue, "a", Timeout::Ticks(2));
        let b = waiter(&mut sched, &queue, "b", Timeout::Forever);

        sched.tick(0);
        sched.tick(0);
        assert_eq!(sched.wait_status(a), Ok(WaitStatus::TimedOut));
        assert_eq!(sched.thread_info(a).unwrap().state, ThreadState::Ready);

        assert_eq!(queue.notify_one(&mut sched), Some(b));
        assert_eq!(sched.wait_status(b), Ok(WaitStatus::Success));
    }

    #[test]
    fn test_stale_entries_pruned_when_full() {
        let mut sched = Scheduler::new(KernelConfig::new()).unwrap();
        let queue = WaitQueue::new(1);
        let a = waiter(&mut sched, &queue, "a", Timeout::Forever);
        sched.wait_abort(a).unwrap();
        waiter(&mut sched, &queue, "b", Timeout::Forever);

        let c = sched.create_thread(ThreadOptions::new("c", 5)).unwrap();
        assert_eq!(
            queue.wait(&mut sched, c, Timeout::Forever),
            Err(KernelError::CapacityExhausted { capacity: 1 })
        );
    }
}
