//! State - Thread state machine
//!
//! Manages thread lifecycle states, wake statuses and in-flight flags

use bitflags::bitflags;
use core::fmt;

/// Thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// Thread is on its priority's ready list
    Ready = 0,

    /// Thread was explicitly suspended (optionally with a timeout)
    Suspended = 1,

    /// Thread waits for a pure timeout
    Sleeping = 2,

    /// Thread waits on a higher-level primitive (has a cleanup callback)
    Waiting = 3,

    /// Thread was terminated
    Terminated = 4,

    /// Thread returned from its entry point
    Completed = 5,
}

impl ThreadState {
    /// Check if state is schedulable
    pub fn is_schedulable(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Check if the thread is off the ready lists but can come back
    pub fn is_suspended(self) -> bool {
        matches!(self, Self::Suspended | Self::Sleeping | Self::Waiting)
    }

    /// Check if the thread can never run again
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Completed)
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "Ready"),
            Self::Suspended => write!(f, "Suspended"),
            Self::Sleeping => write!(f, "Sleeping"),
            Self::Waiting => write!(f, "Waiting"),
            Self::Terminated => write!(f, "Terminated"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

/// Why a suspended thread became ready again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Resumed or signalled normally
    Success,

    /// Timeout expired first
    TimedOut,

    /// Wait was aborted (`wait_abort`, `resume` of a waiting thread, termination)
    Aborted,
}

bitflags! {
    /// In-flight suspension flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ThreadFlags: u8 {
        /// Suspension prepared but not committed; a resume cancels it
        const SUSPENDING      = 1 << 0;
        /// Explicit suspend arrived while waiting; applies when the wait ends
        const DELAYED_SUSPEND = 1 << 1;
    }
}

/// Validate state transition
pub fn validate_transition(from: ThreadState, to: ThreadState) -> bool {
    use ThreadState::*;

    match (from, to) {
        // Ready -> any suspension
        (Ready, Suspended) | (Ready, Sleeping) | (Ready, Waiting) => true,

        // Wake-ups
        (Suspended, Ready) | (Sleeping, Ready) | (Waiting, Ready) => true,

        // Delayed suspension taking effect when the wait ends
        (Sleeping, Suspended) | (Waiting, Suspended) => true,

        // Termination from any live state
        (Ready, Terminated) | (Suspended, Terminated) | (Sleeping, Terminated) | (Waiting, Terminated) => true,

        // Entry returned: only a running (ready) thread completes
        (Ready, Completed) => true,

        // All other transitions invalid
        _ => false,
    }
}
