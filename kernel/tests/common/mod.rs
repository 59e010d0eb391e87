//! Shared test fixtures

#![allow(dead_code)]

use exo_rt_kernel::{CoreId, InterruptState, KernelConfig, Port, Scheduler, ThreadHandle};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Port that records every switch and wake request
pub struct RecordingPort {
    core: AtomicUsize,
    interrupts_enabled: AtomicBool,
    pub switches: Mutex<Vec<(CoreId, Option<ThreadHandle>, Option<ThreadHandle>)>>,
    pub wakes: Mutex<Vec<CoreId>>,
}

impl RecordingPort {
    pub fn new() -> Self {
        Self {
            core: AtomicUsize::new(0),
            interrupts_enabled: AtomicBool::new(true),
            switches: Mutex::new(Vec::new()),
            wakes: Mutex::new(Vec::new()),
        }
    }

    /// Pretend the following calls run on `core`
    pub fn set_core(&self, core: CoreId) {
        self.core.store(core, Ordering::Relaxed);
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled.load(Ordering::Relaxed)
    }

    pub fn last_switch(&self) -> Option<(CoreId, Option<ThreadHandle>, Option<ThreadHandle>)> {
        self.switches.lock().unwrap().last().copied()
    }
}

impl Port for RecordingPort {
    fn core_id(&self) -> CoreId {
        self.core.load(Ordering::Relaxed)
    }

    fn disable_interrupts(&self) -> InterruptState {
        InterruptState {
            enabled: self.interrupts_enabled.swap(false, Ordering::Relaxed),
        }
    }

    fn restore_interrupts(&self, state: InterruptState) {
        self.interrupts_enabled.store(state.enabled, Ordering::Relaxed);
    }

    fn context_switch(&self, core: CoreId, from: Option<ThreadHandle>, to: Option<ThreadHandle>) {
        self.switches.lock().unwrap().push((core, from, to));
    }

    fn wake_core(&self, core: CoreId) {
        self.wakes.lock().unwrap().push(core);
    }
}

/// Route kernel logs to stderr (captured by the test harness)
pub fn init_logging() {
    fn sink(line: &str) {
        eprintln!("{}", line);
    }
    let _ = exo_rt_kernel::logger::init_with_level(sink, log::LevelFilter::Trace);
}

pub fn scheduler(config: KernelConfig) -> Scheduler {
    init_logging();
    Scheduler::new(config).expect("valid config")
}

/// Run `ticks` ticks on core 0, switching to the execute thread after each
pub fn run_ticks(sched: &mut Scheduler, ticks: u64) {
    for _ in 0..ticks {
        sched.tick(0);
        sched.switch_to_execute(0);
    }
}
