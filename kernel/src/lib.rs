// src/lib.rs
// Point d'entrée de la bibliothèque du noyau temps réel
#![cfg_attr(not(test), no_std)] // Pas de bibliothèque standard hors tests

// Import de alloc : les arènes sont allouées une seule fois à la création
extern crate alloc;

// Modules du noyau
pub mod config;
pub mod kernel;
pub mod logger;
pub mod scheduler;
pub mod sync;
pub mod time;

// Réexportations
pub use config::KernelConfig;
pub use kernel::Kernel;
pub use scheduler::{
    CoreId, CoreMask, InterruptState, KernelError, KernelResult, Port, Priority, ResumeOutcome, Scheduler,
    SuspendOutcome, ThreadHandle, ThreadInfo, ThreadOptions, ThreadState, WaitSpec, WaitStatus, WaitToken,
};
pub use sync::{Protect, WaitQueue};
pub use time::{Timeout, TimerHandle, TimerInfo, TimerOptions};
