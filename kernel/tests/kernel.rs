//! Kernel wrapper: critical section, dispatch and the port

mod common;

use common::{init_logging, RecordingPort};
use exo_rt_kernel::{Kernel, KernelConfig, KernelError, ThreadOptions, Timeout, WaitQueue, WaitStatus};

fn kernel(config: KernelConfig) -> Kernel<RecordingPort> {
    init_logging();
    Kernel::new(config, RecordingPort::new()).unwrap()
}

#[test]
fn creation_switches_to_the_urgent_thread() {
    let kernel = kernel(KernelConfig::new());
    let a = kernel.with(|s| s.create_thread(ThreadOptions::new("a", 5))).unwrap();
    assert_eq!(kernel.port().last_switch(), Some((0, None, Some(a))));

    let b = kernel.with(|s| s.create_thread(ThreadOptions::new("b", 2))).unwrap();
    assert_eq!(kernel.port().last_switch(), Some((0, Some(a), Some(b))));
    assert!(kernel.port().interrupts_enabled());

    // Less urgent, no switch
    kernel.with(|s| s.create_thread(ThreadOptions::new("c", 9))).unwrap();
    assert_eq!(kernel.port().switches.lock().unwrap().len(), 2);
}

#[test]
fn sleep_switches_away_and_tick_brings_it_back() {
    let kernel = kernel(KernelConfig::new());
    let a = kernel.with(|s| s.create_thread(ThreadOptions::new("a", 5))).unwrap();
    let b = kernel.with(|s| s.create_thread(ThreadOptions::new("b", 2))).unwrap();

    assert!(kernel.sleep(3).is_ok());
    assert_eq!(kernel.port().last_switch(), Some((0, Some(b), Some(a))));

    kernel.tick();
    kernel.tick();
    assert_eq!(kernel.with(|s| s.current_thread(0)), Some(a));

    kernel.tick();
    assert_eq!(kernel.port().last_switch(), Some((0, Some(a), Some(b))));
    assert_eq!(kernel.with(|s| s.wait_status(b)), Ok(WaitStatus::TimedOut));
    assert_eq!(kernel.with(|s| s.time_get()), 3);
    assert!(kernel.port().interrupts_enabled());
}

#[test]
fn zero_sleep_returns_at_once() {
    let kernel = kernel(KernelConfig::new());
    let a = kernel.with(|s| s.create_thread(ThreadOptions::new("a", 5))).unwrap();
    assert_eq!(kernel.sleep(0), Ok(WaitStatus::Success));
    assert_eq!(kernel.port().switches.lock().unwrap().len(), 1);

    // Same answer as the scheduler call, and the same context checks
    assert_eq!(kernel.with(|s| s.sleep(0, 0).map(|_| s.wait_status(a))), Ok(Ok(WaitStatus::Success)));
    kernel.with(|s| s.enter_isr(0));
    assert_eq!(kernel.sleep(0), Err(KernelError::NotThreadContext { core: 0 }));
    kernel.with(|s| s.exit_isr(0));
}

#[test]
fn blocking_is_refused_in_interrupt_context() {
    let kernel = kernel(KernelConfig::new());
    kernel.with(|s| s.create_thread(ThreadOptions::new("a", 5))).unwrap();

    kernel.with(|s| s.enter_isr(0));
    assert_eq!(kernel.sleep(1), Err(KernelError::NotThreadContext { core: 0 }));
    kernel.with(|s| s.exit_isr(0));
}

#[test]
fn blocking_is_refused_with_preemption_disabled() {
    let kernel = kernel(KernelConfig::new());
    kernel.with(|s| s.create_thread(ThreadOptions::new("a", 5))).unwrap();

    kernel.with(|s| s.preempt_disable());
    assert_eq!(kernel.suspend_self(), Err(KernelError::PreemptionDisallowed { count: 1 }));
    kernel.with(|s| s.preempt_enable());
}

#[test]
fn no_thread_to_block() {
    let kernel = kernel(KernelConfig::new());
    assert_eq!(kernel.sleep(4), Err(KernelError::NoCurrentThread { core: 0 }));
}

#[test]
fn queue_wait_and_notify() {
    let kernel = kernel(KernelConfig::new());
    let a = kernel.with(|s| s.create_thread(ThreadOptions::new("a", 5))).unwrap();
    let b = kernel.with(|s| s.create_thread(ThreadOptions::new("b", 2))).unwrap();
    let queue = WaitQueue::new(4);

    assert!(kernel.wait_on(&queue, Timeout::Forever).is_ok());
    assert_eq!(kernel.port().last_switch(), Some((0, Some(b), Some(a))));
    assert_eq!(kernel.with(|s| queue.len(s)), 1);

    assert_eq!(kernel.with(|s| queue.notify_one(s)), Some(b));
    assert_eq!(kernel.port().last_switch(), Some((0, Some(a), Some(b))));
    assert_eq!(kernel.with(|s| s.wait_status(b)), Ok(WaitStatus::Success));
}

#[test]
fn queue_wait_times_out() {
    let kernel = kernel(KernelConfig::new());
    kernel.with(|s| s.create_thread(ThreadOptions::new("a", 5))).unwrap();
    let b = kernel.with(|s| s.create_thread(ThreadOptions::new("b", 2))).unwrap();
    let queue = WaitQueue::new(4);

    assert!(kernel.wait_on(&queue, Timeout::Ticks(2)).is_ok());
    kernel.tick();
    kernel.tick();
    assert_eq!(kernel.with(|s| s.current_thread(0)), Some(b));
    assert_eq!(kernel.with(|s| s.wait_status(b)), Ok(WaitStatus::TimedOut));
    assert!(kernel.with(|s| queue.is_empty(s)));
    assert_eq!(kernel.with(|s| queue.notify_one(s)), None);
}

#[test]
fn preemption_disabled_defers_the_switch() {
    let kernel = kernel(KernelConfig::new());
    let a = kernel.with(|s| s.create_thread(ThreadOptions::new("a", 5))).unwrap();

    kernel.with(|s| s.preempt_disable());
    let b = kernel.with(|s| s.create_thread(ThreadOptions::new("b", 1))).unwrap();
    assert_eq!(kernel.port().last_switch(), Some((0, None, Some(a))));
    assert_eq!(kernel.with(|s| s.execute_thread(0)), Some(b));

    kernel.with(|s| s.preempt_enable());
    assert_eq!(kernel.port().last_switch(), Some((0, Some(a), Some(b))));
}

#[test]
fn other_cores_are_woken() {
    let kernel = kernel(KernelConfig::new().with_cores(2));
    let a = kernel.with(|s| s.create_thread(ThreadOptions::new("a", 5))).unwrap();
    assert_eq!(kernel.port().last_switch(), Some((0, None, Some(a))));
    assert!(kernel.port().wakes.lock().unwrap().is_empty());

    let b = kernel.with(|s| s.create_thread(ThreadOptions::new("b", 5))).unwrap();
    assert_eq!(kernel.with(|s| s.execute_thread(1)), Some(b));
    assert_eq!(*kernel.port().wakes.lock().unwrap(), [1]);

    kernel.port().set_core(1);
    kernel.with(|_| ());
    assert_eq!(kernel.port().last_switch(), Some((1, None, Some(b))));
    assert_eq!(kernel.port().wakes.lock().unwrap().len(), 1);
}

#[test]
fn pending_remote_switch_is_signalled_once() {
    let kernel = kernel(KernelConfig::new().with_cores(2));
    let a = kernel.with(|s| s.create_thread(ThreadOptions::new("a", 5))).unwrap();
    let b = kernel.with(|s| s.create_thread(ThreadOptions::new("b", 5))).unwrap();
    assert_eq!(kernel.with(|s| s.execute_thread(1)), Some(b));
    assert_eq!(*kernel.port().wakes.lock().unwrap(), [1]);

    // Core 1 has not switched yet; unrelated calls on core 0 do not poke it again
    for _ in 0..3 {
        kernel.with(|s| s.time_get());
    }
    assert_eq!(*kernel.port().wakes.lock().unwrap(), [1]);

    // An urgent thread takes core 0 and pushes a over to core 1
    let c = kernel.with(|s| s.create_thread(ThreadOptions::new("c", 1))).unwrap();
    assert_eq!(kernel.port().last_switch(), Some((0, Some(a), Some(c))));
    assert_eq!(kernel.with(|s| s.execute_thread(1)), Some(a));
    assert_eq!(*kernel.port().wakes.lock().unwrap(), [1, 1]);
}
