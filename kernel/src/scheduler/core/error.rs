//! Kernel Error Handling
//!
//! Typed errors for every scheduler, thread and timer operation.
//! All of them are local and recoverable: the caller gets the status back
//! synchronously and decides what to do. Corrupted kernel tables are not
//! errors, they trip `sched_assert!` / [`corrupted`] instead.

use core::fmt;

/// Kernel error types with detailed context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    // ═══════════════════════════════════════════════════════════════
    // Handle Errors
    // ═══════════════════════════════════════════════════════════════

    /// Null, stale (deleted) or out-of-range thread/timer handle
    InvalidHandle,

    /// No free slot left in the thread or timer arena
    CapacityExhausted { capacity: usize },

    // ═══════════════════════════════════════════════════════════════
    // State Precondition Errors
    // ═══════════════════════════════════════════════════════════════

    /// Timer is already on the wheel
    AlreadyActive,

    /// Thread was terminated and can never run again
    AlreadyTerminated,

    /// Thread returned from its entry and can never run again
    AlreadyCompleted,

    /// Thread must be terminated or completed before deletion
    NotTerminated,

    /// Wait preparation on a thread that is not ready
    NotReady,

    /// Timer parameters changed while it is on the wheel
    TimerActive,

    /// Timer activation with zero ticks left (expired one-shot or zero duration)
    ZeroDuration,

    /// Self-suspension while the preempt-disable count is non-zero
    PreemptionDisallowed { count: u32 },

    /// The calling core has no current thread
    NoCurrentThread { core: usize },

    /// Operation that blocks the caller was issued from interrupt context
    NotThreadContext { core: usize },

    // ═══════════════════════════════════════════════════════════════
    // Parameter Errors
    // ═══════════════════════════════════════════════════════════════

    /// Priority outside the configured levels
    InvalidPriority { value: u32, levels: u32 },

    /// Preemption threshold numerically greater than the priority
    InvalidThreshold { threshold: u32, priority: u32 },

    /// Core exclusion mask leaves no configured core
    InvalidCoreMask { mask: u64 },

    /// Configuration rejected by `KernelConfig::validate`
    InvalidConfig { reason: &'static str },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHandle => write!(f, "Invalid handle"),
            Self::CapacityExhausted { capacity } => {
                write!(f, "Arena full ({} slots)", capacity)
            }
            Self::PreemptionDisallowed { count } => {
                write!(f, "Self-suspension with preemption disabled (count {})", count)
            }
            Self::NoCurrentThread { core } => write!(f, "No current thread on core {}", core),
            Self::NotThreadContext { core } => {
                write!(f, "Blocking call from interrupt context on core {}", core)
            }
            Self::InvalidPriority { value, levels } => {
                write!(f, "Priority {} outside 0..{}", value, levels)
            }
            Self::InvalidThreshold { threshold, priority } => {
                write!(f, "Threshold {} above priority {}", threshold, priority)
            }
            Self::InvalidCoreMask { mask } => {
                write!(f, "Core mask {:#x} excludes every core", mask)
            }
            Self::InvalidConfig { reason } => write!(f, "Invalid configuration: {}", reason),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl KernelError {
    /// Get recovery hint for this error
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Self::InvalidHandle => "Handle was deleted or never created",
            Self::CapacityExhausted { .. } => "Delete unused objects or raise the arena size",
            Self::AlreadyTerminated | Self::AlreadyCompleted => "Thread must be recreated",
            Self::NotTerminated => "Terminate the thread before deleting it",
            Self::NotReady => "Only a ready thread can start a wait",
            Self::TimerActive => "Deactivate the timer before changing it",
            Self::ZeroDuration => "Reload the timer with change_timer first",
            Self::PreemptionDisallowed { .. } => "Re-enable preemption before blocking",
            Self::NotThreadContext { .. } => "Defer the blocking call to thread context",
            Self::InvalidThreshold { .. } => "Threshold must be <= priority",
            Self::InvalidCoreMask { .. } => "Leave at least one configured core allowed",
            _ => "Check kernel configuration",
        }
    }

    /// Is this a recoverable error?
    ///
    /// Every variant is: a corrupted kernel table panics instead of
    /// producing a `KernelError`.
    pub fn is_recoverable(&self) -> bool {
        true
    }

    /// Should this error be logged?
    pub fn should_log(&self) -> bool {
        match self {
            Self::AlreadyActive => false, // Common on timer re-arm
            Self::ZeroDuration => false,
            _ => true,
        }
    }

    /// Get error severity (0-3)
    pub fn severity(&self) -> u8 {
        match self {
            Self::InvalidConfig { .. } => 2,
            Self::CapacityExhausted { .. } => 2,
            Self::InvalidHandle => 1,
            Self::PreemptionDisallowed { .. } => 1,
            Self::NotThreadContext { .. } => 1,
            _ => 0,
        }
    }
}

/// Result type for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

/// Report an unrecoverable corruption of the kernel tables and stop.
#[cold]
#[inline(never)]
pub fn corrupted(reason: &'static str) -> ! {
    log::error!("[SCHED CRITICAL] Invariant violated: {}", reason);
    panic!("[SCHED CRITICAL] Invariant violated: {}", reason);
}

/// Macro to log kernel errors with context
#[macro_export]
macro_rules! kernel_error {
    ($err:expr) => {{
        let err = $err;
        if err.should_log() {
            log::debug!("[SCHED] Error: {} (hint: {})", err, err.recovery_hint());
        }
        err
    }};
}

/// Macro for critical scheduler assertions
#[macro_export]
macro_rules! sched_assert {
    ($cond:expr, $reason:expr) => {
        if !$cond {
            $crate::scheduler::core::error::corrupted($reason);
        }
    };
}
