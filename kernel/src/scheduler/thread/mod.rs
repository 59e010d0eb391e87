//! Thread module

pub mod lifecycle;
pub mod state;
pub mod thread;

pub use lifecycle::{ResumeOutcome, SuspendOutcome, WaitSpec};
pub use state::{ThreadFlags, ThreadState, WaitStatus};
pub use thread::{CleanupFn, ThreadHandle, ThreadInfo, ThreadOptions, WaitToken};
