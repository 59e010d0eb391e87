//! Time management subsystem
//!
//! Tick processing, the system clock and the timer wheel shared by thread
//! timeouts and application timers.

pub mod timer;
pub(crate) mod wheel;

// Re-exports
pub use timer::{TimerCallback, TimerHandle, TimerInfo, TimerOptions};

use crate::scheduler::core::affinity::{allowed_on, CoreId};
use crate::scheduler::Scheduler;
use wheel::TimerOwner;

/// How long a suspension may last
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Until explicitly resumed
    Forever,
    /// At most this many ticks; `Ticks(0)` times out immediately
    Ticks(u64),
}

impl Timeout {
    /// Do not wait at all
    pub const NO_WAIT: Self = Self::Ticks(0);

    pub const fn is_forever(&self) -> bool {
        matches!(self, Self::Forever)
    }
}

impl Scheduler {
    /// Process one clock tick received by `core`
    ///
    /// Expires due timers one at a time, so a callback may deactivate a
    /// timer that expires in the same tick, then charges the time slice of
    /// the thread running on every core. Only one core ticks per period.
    pub fn tick(&mut self, core: CoreId) {
        self.clock = self.clock.wrapping_add(1);
        self.wheel.begin_tick();

        while let Some(index) = self.wheel.pop_expiring() {
            self.expire_timer(core, index);
        }

        self.charge_time_slices();
    }

    fn expire_timer(&mut self, core: CoreId, index: usize) {
        let width = self.wheel.width();
        let timer = self.wheel.timer_mut(index);

        if timer.remaining > width {
            timer.remaining -= width;
            self.wheel.reinsert(index);
            self.stats.record_timer_lap();
            return;
        }

        if !allowed_on(timer.core_exclusion, core) {
            log::trace!("timer '{}' excluded from core {}, deferred", timer.name, core);
            timer.remaining = 1;
            self.wheel.reinsert(index);
            self.stats.record_timer_deferral();
            return;
        }

        let owner = timer.owner;
        match owner {
            TimerOwner::Thread(thread) => {
                timer.remaining = 0;
                self.thread_timeout(thread);
            }
            TimerOwner::Application { callback, parameter } => {
                if timer.reload > 0 {
                    timer.remaining = timer.reload;
                    self.wheel.reinsert(index);
                } else {
                    timer.remaining = 0;
                }
                self.stats.record_timer_expiration();
                callback(self, parameter);
            }
            TimerOwner::Vacant => crate::scheduler::core::error::corrupted("vacant timer on the wheel"),
        }
    }

    /// Ticks since start
    pub fn time_get(&self) -> u64 {
        self.clock
    }

    pub fn time_set(&mut self, ticks: u64) {
        log::debug!("system clock set to {}", ticks);
        self.clock = ticks;
    }
}
