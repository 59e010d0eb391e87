//! Protect - the kernel critical section
//!
//! Interrupts are masked on the calling core, then a spin lock shared by
//! all cores is taken. The guard is not reentrant: re-acquiring from the
//! owning core would deadlock and traps instead. Code already inside the
//! section nests by count through [`ProtectGuard::nest`].

use crate::scheduler::core::affinity::CoreId;
use crate::scheduler::switch::{InterruptState, Port};
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::{Mutex, MutexGuard};

const NO_OWNER: usize = usize::MAX;

pub struct Protect<T> {
    inner: Mutex<T>,
    owner: AtomicUsize,
}

impl<T> Protect<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            owner: AtomicUsize::new(NO_OWNER),
        }
    }

    /// Enter the critical section
    pub fn protect<'a, P: Port>(&'a self, port: &'a P) -> ProtectGuard<'a, T, P> {
        let saved = port.disable_interrupts();
        let core = port.core_id();
        crate::sched_assert!(
            self.owner.load(Ordering::Acquire) != core,
            "critical section re-entered from its owner core"
        );

        let guard = self.inner.lock();
        self.owner.store(core, Ordering::Release);
        ProtectGuard {
            guard: Some(guard),
            owner: &self.owner,
            port,
            saved,
            nesting: 1,
        }
    }

    /// Core holding the section, if any
    pub fn owner(&self) -> Option<CoreId> {
        match self.owner.load(Ordering::Acquire) {
            NO_OWNER => None,
            core => Some(core),
        }
    }
}

pub struct ProtectGuard<'a, T, P: Port> {
    guard: Option<MutexGuard<'a, T>>,
    owner: &'a AtomicUsize,
    port: &'a P,
    saved: InterruptState,
    nesting: u32,
}

impl<'a, T, P: Port> ProtectGuard<'a, T, P> {
    /// Nested entry; the section stays held until the outer guard drops
    pub fn nest(&mut self) -> Nested<'_, 'a, T, P> {
        self.nesting += 1;
        Nested { outer: self }
    }

    pub fn nesting(&self) -> u32 {
        self.nesting
    }

    fn value(&self) -> &T {
        match self.guard.as_ref() {
            Some(guard) => &**guard,
            None => crate::scheduler::core::error::corrupted("critical section used after release"),
        }
    }

    fn value_mut(&mut self) -> &mut T {
        match self.guard.as_mut() {
            Some(guard) => &mut **guard,
            None => crate::scheduler::core::error::corrupted("critical section used after release"),
        }
    }
}

impl<T, P: Port> Deref for ProtectGuard<'_, T, P> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value()
    }
}

impl<T, P: Port> DerefMut for ProtectGuard<'_, T, P> {
    fn deref_mut(&mut self) -> &mut T {
        self.value_mut()
    }
}

impl<T, P: Port> Drop for ProtectGuard<'_, T, P> {
    fn drop(&mut self) {
        self.nesting = 0;
        self.owner.store(NO_OWNER, Ordering::Release);
        drop(self.guard.take());
        self.port.restore_interrupts(self.saved);
    }
}

/// Count-based nested entry
pub struct Nested<'g, 'a, T, P: Port> {
    outer: &'g mut ProtectGuard<'a, T, P>,
}

impl<T, P: Port> Nested<'_, '_, T, P> {
    pub fn nesting(&self) -> u32 {
        self.outer.nesting
    }
}

impl<T, P: Port> Deref for Nested<'_, '_, T, P> {
    type Target = T;

    fn deref(&self) -> &T {
        self.outer.value()
    }
}

impl<T, P: Port> DerefMut for Nested<'_, '_, T, P> {
    fn deref_mut(&mut self) -> &mut T {
        self.outer.value_mut()
    }
}

impl<T, P: Port> Drop for Nested<'_, '_, T, P> {
    fn drop(&mut self) {
        self.outer.nesting -= 1;
    }
}
