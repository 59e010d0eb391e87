//! Kernel - scheduler behind the critical section, wired to a port
//!
//! Every operation runs inside `Protect`. On the way out the dispatcher is
//! consulted: the calling core switches through `Port::context_switch`,
//! other cores whose execute thread changed are poked with
//! `Port::wake_core`. The switch itself happens after the critical section
//! is released.

use crate::config::{KernelConfig, MAX_CORES};
use crate::scheduler::core::affinity::{CoreId, CoreMask};
use crate::scheduler::core::dispatcher::Switch;
use crate::scheduler::core::error::{KernelError, KernelResult};
use crate::scheduler::switch::Port;
use crate::scheduler::thread::lifecycle::WaitSpec;
use crate::scheduler::thread::state::WaitStatus;
use crate::scheduler::thread::thread::{ThreadHandle, WaitToken};
use crate::scheduler::Scheduler;
use crate::sync::protect::Protect;
use crate::sync::wait_queue::WaitQueue;
use crate::time::Timeout;

pub struct Kernel<P: Port> {
    port: P,
    scheduler: Protect<Scheduler>,
}

impl<P: Port> Kernel<P> {
    pub fn new(config: KernelConfig, port: P) -> KernelResult<Self> {
        let scheduler = Scheduler::new(config)?;
        Ok(Self {
            port,
            scheduler: Protect::new(scheduler),
        })
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Run `f` in the critical section, then dispatch
    pub fn with<R>(&self, f: impl FnOnce(&mut Scheduler) -> R) -> R {
        let core = self.port.core_id();
        let (result, switch, remote) = {
            let mut sched = self.scheduler.protect(&self.port);
            let before = execute_threads(&*sched);
            let result = f(&mut *sched);
            let (switch, remote) = dispatch(&mut *sched, core, &before);
            (result, switch, remote)
        };

        for other in 0..MAX_CORES {
            if remote.is_set(other) {
                self.port.wake_core(other);
            }
        }
        if let Some(switch) = switch {
            self.port.context_switch(core, switch.from, switch.to);
        }
        result
    }

    /// Clock tick on the calling core, processed as an interrupt
    pub fn tick(&self) {
        let core = self.port.core_id();
        self.with(|sched| {
            sched.enter_isr(core);
            sched.tick(core);
            sched.exit_isr(core);
        });
    }

    /// Suspend the calling thread for `ticks`; zero ticks succeeds at once
    pub fn sleep(&self, ticks: u64) -> KernelResult<WaitStatus> {
        if ticks == 0 {
            let core = self.port.core_id();
            return self.with(|sched| sched.sleep(core, 0)).map(|_| WaitStatus::Success);
        }
        self.block(|sched, me| sched.prepare_wait(me, WaitSpec::sleep(ticks)))
    }

    /// Suspend the calling thread until resumed
    pub fn suspend_self(&self) -> KernelResult<WaitStatus> {
        self.block(|sched, me| sched.prepare_wait(me, WaitSpec::suspend(Timeout::Forever)))
    }

    /// Wait as described by `spec`
    pub fn wait(&self, spec: WaitSpec) -> KernelResult<WaitStatus> {
        self.block(|sched, me| sched.prepare_wait(me, spec))
    }

    /// Wait on `queue` for at most `timeout`
    pub fn wait_on(&self, queue: &WaitQueue, timeout: Timeout) -> KernelResult<WaitStatus> {
        self.block(|sched, me| queue.wait(sched, me, timeout))
    }

    /// Two-phase suspension of the calling thread
    ///
    /// A resume arriving between the two critical sections cancels it.
    fn block(&self, prepare: impl FnOnce(&mut Scheduler, ThreadHandle) -> KernelResult<WaitToken>) -> KernelResult<WaitStatus> {
        let core = self.port.core_id();
        let me = self.with(|sched| {
            if sched.in_isr(core) {
                return Err(crate::kernel_error!(KernelError::NotThreadContext { core }));
            }
            if sched.preempt_count() > 0 {
                return Err(crate::kernel_error!(KernelError::PreemptionDisallowed {
                    count: sched.preempt_count(),
                }));
            }
            let me = sched
                .current_thread(core)
                .ok_or_else(|| crate::kernel_error!(KernelError::NoCurrentThread { core }))?;
            prepare(sched, me)?;
            Ok(me)
        })?;

        self.with(|sched| sched.commit_suspend(me))?;
        self.with(|sched| sched.wait_status(me))
    }
}

type ExecuteMap = [Option<ThreadHandle>; MAX_CORES];

fn execute_threads(sched: &Scheduler) -> ExecuteMap {
    let cores = sched.config().cores;
    core::array::from_fn(|c| if c < cores { sched.execute_thread(c) } else { None })
}

/// Switch decision for `core` plus the other cores whose execute thread
/// changed since `before` and who are not running it yet
fn dispatch(sched: &mut Scheduler, core: CoreId, before: &ExecuteMap) -> (Option<Switch>, CoreMask) {
    let switch = if sched.request_reschedule(core) {
        Some(sched.switch_to_execute(core))
    } else {
        None
    };

    let mut remote = CoreMask::empty();
    for other in 0..sched.config().cores {
        let execute = sched.execute_thread(other);
        if other != core && execute != before[other] && sched.current_thread(other) != execute {
            remote.set(other);
        }
    }
    (switch, remote)
}
