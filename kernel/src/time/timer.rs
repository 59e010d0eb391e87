//! Application timers
//!
//! One-shot and periodic timers that call a plain function from the tick
//! with the scheduler and an opaque parameter. They share the wheel with
//! thread timeouts.

use super::wheel::TimerOwner;
use crate::scheduler::core::affinity::CoreMask;
use crate::scheduler::core::error::{KernelError, KernelResult};
use crate::scheduler::Scheduler;
use core::fmt;

/// Expiration callback
///
/// Runs synchronously inside the tick; it must not block but may call any
/// non-blocking scheduler operation.
pub type TimerCallback = fn(&mut Scheduler, usize);

/// Stable timer identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    index: u32,
    generation: u32,
}

impl TimerHandle {
    pub(crate) const fn new(index: usize, generation: u32) -> Self {
        Self {
            index: index as u32,
            generation,
        }
    }

    pub const fn index(&self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tm{}#{}", self.index, self.generation)
    }
}

/// Timer creation parameters
#[derive(Clone, Copy)]
pub struct TimerOptions {
    pub name: &'static str,
    pub callback: TimerCallback,
    pub parameter: usize,
    /// Ticks to the first expiration
    pub initial_ticks: u64,
    /// Ticks between later expirations; 0 means one-shot
    pub reschedule_ticks: u64,
    pub auto_activate: bool,
}

impl TimerOptions {
    pub const fn one_shot(name: &'static str, callback: TimerCallback, ticks: u64) -> Self {
        Self {
            name,
            callback,
            parameter: 0,
            initial_ticks: ticks,
            reschedule_ticks: 0,
            auto_activate: false,
        }
    }

    pub const fn periodic(name: &'static str, callback: TimerCallback, ticks: u64) -> Self {
        Self {
            name,
            callback,
            parameter: 0,
            initial_ticks: ticks,
            reschedule_ticks: ticks,
            auto_activate: false,
        }
    }

    pub const fn parameter(mut self, parameter: usize) -> Self {
        self.parameter = parameter;
        self
    }

    pub const fn activated(mut self) -> Self {
        self.auto_activate = true;
        self
    }
}

/// Timer snapshot returned by `Scheduler::timer_info`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerInfo {
    pub name: &'static str,
    pub active: bool,
    /// Ticks until the next expiration (or ticks kept while inactive)
    pub remaining_ticks: u64,
    pub reschedule_ticks: u64,
    pub core_exclusion: CoreMask,
}

impl Scheduler {
    fn resolve_timer(&self, handle: TimerHandle) -> KernelResult<usize> {
        let index = handle.index();
        if !self.wheel.application_range().contains(&index) {
            return Err(KernelError::InvalidHandle);
        }
        let timer = self.wheel.timer(index);
        match timer.owner {
            TimerOwner::Application { .. } if timer.generation == handle.generation => Ok(index),
            _ => Err(KernelError::InvalidHandle),
        }
    }

    /// Create an application timer
    pub fn create_timer(&mut self, options: TimerOptions) -> KernelResult<TimerHandle> {
        if options.initial_ticks == 0 {
            return Err(crate::kernel_error!(KernelError::ZeroDuration));
        }
        let Some(index) = self.wheel.vacant() else {
            return Err(crate::kernel_error!(KernelError::CapacityExhausted {
                capacity: self.wheel.application_range().len(),
            }));
        };

        let timer = self.wheel.timer_mut(index);
        timer.name = options.name;
        timer.remaining = options.initial_ticks;
        timer.reload = options.reschedule_ticks;
        timer.owner = TimerOwner::Application {
            callback: options.callback,
            parameter: options.parameter,
        };
        timer.core_exclusion = CoreMask::empty();
        let handle = TimerHandle::new(index, timer.generation);

        log::debug!(
            "timer '{}' created as {} ({} ticks, reload {})",
            options.name,
            handle,
            options.initial_ticks,
            options.reschedule_ticks
        );

        if options.auto_activate {
            self.wheel.activate(index)?;
        }
        Ok(handle)
    }

    /// Start a timer with its remaining ticks
    pub fn activate_timer(&mut self, handle: TimerHandle) -> KernelResult<()> {
        let index = self.resolve_timer(handle)?;
        self.wheel.activate(index).map_err(|err| crate::kernel_error!(err))
    }

    /// Stop a timer; a later activation resumes the ticks it had left
    pub fn deactivate_timer(&mut self, handle: TimerHandle) -> KernelResult<()> {
        let index = self.resolve_timer(handle)?;
        self.wheel.deactivate(index);
        Ok(())
    }

    /// Reload an inactive timer
    pub fn change_timer(&mut self, handle: TimerHandle, initial_ticks: u64, reschedule_ticks: u64) -> KernelResult<()> {
        let index = self.resolve_timer(handle)?;
        if initial_ticks == 0 {
            return Err(crate::kernel_error!(KernelError::ZeroDuration));
        }
        let timer = self.wheel.timer_mut(index);
        if timer.is_active() {
            return Err(crate::kernel_error!(KernelError::TimerActive));
        }
        timer.remaining = initial_ticks;
        timer.reload = reschedule_ticks;
        Ok(())
    }

    /// Delete a timer; its handle becomes invalid
    pub fn delete_timer(&mut self, handle: TimerHandle) -> KernelResult<()> {
        let index = self.resolve_timer(handle)?;
        self.wheel.deactivate(index);
        let timer = self.wheel.timer_mut(index);
        timer.owner = TimerOwner::Vacant;
        timer.remaining = 0;
        timer.reload = 0;
        timer.generation = timer.generation.wrapping_add(1);
        log::debug!("timer {} deleted", handle);
        Ok(())
    }

    pub fn timer_info(&self, handle: TimerHandle) -> KernelResult<TimerInfo> {
        let index = self.resolve_timer(handle)?;
        let timer = self.wheel.timer(index);
        Ok(TimerInfo {
            name: timer.name,
            active: timer.is_active(),
            remaining_ticks: if timer.is_active() {
                self.wheel.ticks_left(index)
            } else {
                timer.remaining
            },
            reschedule_ticks: timer.reload,
            core_exclusion: timer.core_exclusion,
        })
    }

    /// Keep a timer's expirations off the cores in `mask`
    pub fn timer_core_exclude(&mut self, handle: TimerHandle, mask: CoreMask) -> KernelResult<()> {
        let index = self.resolve_timer(handle)?;
        if !mask.leaves_core(self.config.cores) {
            return Err(crate::kernel_error!(KernelError::InvalidCoreMask { mask: mask.bits() }));
        }
        self.wheel.timer_mut(index).core_exclusion = mask;
        Ok(())
    }
}
