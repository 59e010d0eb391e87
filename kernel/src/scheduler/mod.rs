//! Scheduler subsystem
//!
//! Preemptive priority scheduling with preemption threshold, round-robin
//! time slicing and SMP execute-thread mapping

pub mod core;
pub mod switch;
pub mod thread;

/// Thread priority; 0 is the most urgent
pub type Priority = u32;

// Re-exports
pub use self::core::{CoreId, CoreMask, KernelError, KernelResult, Scheduler, SchedulerStats, StatsSnapshot, Switch};
pub use switch::{InterruptState, Port};
pub use thread::{
    CleanupFn, ResumeOutcome, SuspendOutcome, ThreadHandle, ThreadInfo, ThreadOptions, ThreadState, WaitSpec,
    WaitStatus, WaitToken,
};
