//! Context switch boundary
//!
//! The kernel core never touches registers or stacks. A `Port` supplies
//! interrupt control, the core id and the primitive that actually moves a
//! core from one thread context to another.

use crate::scheduler::core::affinity::CoreId;
use crate::scheduler::thread::thread::ThreadHandle;

/// Interrupt state saved by `Port::disable_interrupts`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptState {
    pub enabled: bool,
}

impl InterruptState {
    pub const ENABLED: Self = Self { enabled: true };
    pub const DISABLED: Self = Self { enabled: false };
}

/// Host services required by the kernel
pub trait Port {
    /// Core the caller runs on
    fn core_id(&self) -> CoreId;

    /// Mask interrupts on the calling core, returning the previous state
    fn disable_interrupts(&self) -> InterruptState;

    fn restore_interrupts(&self, state: InterruptState);

    /// Switch `core` from `from` to `to` (`None` is the idle context)
    fn context_switch(&self, core: CoreId, from: Option<ThreadHandle>, to: Option<ThreadHandle>);

    /// Ask another core to reschedule
    fn wake_core(&self, _core: CoreId) {}
}
