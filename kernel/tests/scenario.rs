//! Scheduling scenarios

mod common;

use common::{run_ticks, scheduler};
use exo_rt_kernel::{KernelConfig, ResumeOutcome, ThreadHandle, ThreadOptions, Timeout};

#[test]
fn equal_priority_round_robin_and_suspension() {
    let mut sched = scheduler(KernelConfig::new().with_default_time_slice(1));
    let a = sched.create_thread(ThreadOptions::new("A", 0)).unwrap();
    let b = sched.create_thread(ThreadOptions::new("B", 0)).unwrap();
    let c = sched.create_thread(ThreadOptions::new("C", 1)).unwrap();
    assert_eq!(sched.execute_thread(0), Some(a));
    sched.switch_to_execute(0);

    // A's slice runs out
    run_ticks(&mut sched, 1);
    assert_eq!(sched.execute_thread(0), Some(b));

    assert_eq!(sched.resume(c), Ok(ResumeOutcome::AlreadyReady));
    assert_eq!(sched.execute_thread(0), Some(b));

    sched.suspend(0, a, Timeout::Forever).unwrap();
    assert_eq!(sched.execute_thread(0), Some(b));

    sched.suspend(0, b, Timeout::Forever).unwrap();
    assert_eq!(sched.execute_thread(0), Some(c));
}

#[test]
fn each_peer_runs_once_per_round() {
    let mut sched = scheduler(KernelConfig::new().with_default_time_slice(1));
    let threads: Vec<_> = ["t0", "t1", "t2", "t3"]
        .into_iter()
        .map(|name| sched.create_thread(ThreadOptions::new(name, 3)).unwrap())
        .collect();
    sched.switch_to_execute(0);

    let mut order = vec![sched.execute_thread(0).unwrap()];
    for _ in 1..threads.len() {
        run_ticks(&mut sched, 1);
        order.push(sched.execute_thread(0).unwrap());
    }
    assert_eq!(order, threads);

    run_ticks(&mut sched, 1);
    assert_eq!(sched.execute_thread(0), Some(threads[0]));
    assert_eq!(sched.stats().snapshot().time_slices, threads.len() as u64);
}

#[test]
fn lowering_threshold_releases_held_thread_first() {
    let mut sched = scheduler(KernelConfig::new());
    let a = sched
        .create_thread(ThreadOptions::new("A", 5).preempt_threshold(2))
        .unwrap();
    let b = sched.create_thread(ThreadOptions::new("B", 3)).unwrap();
    assert_eq!(sched.execute_thread(0), Some(a));

    let d = sched.create_thread(ThreadOptions::new("D", 4)).unwrap();
    assert_eq!(sched.execute_thread(0), Some(a));

    assert_eq!(sched.preemption_change(a, 5), Ok(2));
    assert_eq!(sched.execute_thread(0), Some(b));

    sched.suspend(0, b, Timeout::Forever).unwrap();
    assert_eq!(sched.execute_thread(0), Some(d));
}

#[test]
fn nested_threshold_preemption_restores_lowest_pending_first() {
    let mut sched = scheduler(KernelConfig::new());
    let a = sched
        .create_thread(ThreadOptions::new("A", 20).preempt_threshold(10))
        .unwrap();
    let d = sched.create_thread(ThreadOptions::new("D", 12)).unwrap();
    assert_eq!(sched.execute_thread(0), Some(a));

    let b = sched
        .create_thread(ThreadOptions::new("B", 8).preempt_threshold(3))
        .unwrap();
    assert_eq!(sched.execute_thread(0), Some(b));

    let c = sched.create_thread(ThreadOptions::new("C", 1)).unwrap();
    assert_eq!(sched.execute_thread(0), Some(c));
    assert_eq!(sched.pending_thresholds().collect::<Vec<_>>(), [(8, b), (20, a)]);

    sched.suspend(0, c, Timeout::Forever).unwrap();
    assert_eq!(sched.execute_thread(0), Some(b));

    // A comes back ahead of D, which its threshold still blocks
    sched.suspend(0, b, Timeout::Forever).unwrap();
    assert_eq!(sched.execute_thread(0), Some(a));

    sched.suspend(0, a, Timeout::Forever).unwrap();
    assert_eq!(sched.execute_thread(0), Some(d));
    assert_eq!(sched.pending_thresholds().count(), 0);
}

#[test]
fn holder_is_not_time_sliced() {
    let mut sched = scheduler(KernelConfig::new().with_default_time_slice(1));
    let holder = sched
        .create_thread(ThreadOptions::new("holder", 6).preempt_threshold(4))
        .unwrap();
    sched.create_thread(ThreadOptions::new("peer", 6)).unwrap();
    sched.switch_to_execute(0);

    run_ticks(&mut sched, 5);
    assert_eq!(sched.execute_thread(0), Some(holder));
    assert_eq!(sched.stats().snapshot().time_slices, 0);
}

#[test]
fn relinquish_gives_up_threshold_protection() {
    let mut sched = scheduler(KernelConfig::new());
    let holder = sched
        .create_thread(ThreadOptions::new("holder", 6).preempt_threshold(4))
        .unwrap();
    let peer = sched.create_thread(ThreadOptions::new("peer", 6)).unwrap();
    sched.switch_to_execute(0);

    sched.relinquish(0).unwrap();
    assert_eq!(sched.execute_thread(0), Some(peer));
    assert_eq!(
        sched.ready_threads(6).collect::<Vec<_>>(),
        [peer, holder]
    );
}

#[test]
fn timed_suspension_expires() {
    let mut sched = scheduler(KernelConfig::new().with_timer_wheel_slots(4));
    let t = sched.create_thread(ThreadOptions::new("t", 2)).unwrap();
    sched.suspend(0, t, Timeout::Ticks(10)).unwrap();

    run_ticks(&mut sched, 9);
    assert_eq!(sched.execute_thread(0), None);
    run_ticks(&mut sched, 1);
    assert_eq!(sched.execute_thread(0), Some(t));
    assert_eq!(sched.wait_status(t), Ok(exo_rt_kernel::WaitStatus::TimedOut));
}

#[test]
fn preempted_thread_keeps_what_is_left_of_its_slice() {
    let mut sched = scheduler(KernelConfig::new().with_default_time_slice(2));
    let a = sched.create_thread(ThreadOptions::new("A", 4)).unwrap();
    let b = sched.create_thread(ThreadOptions::new("B", 4)).unwrap();
    let urgent = sched
        .create_thread(ThreadOptions::new("urgent", 1).suspended())
        .unwrap();
    sched.switch_to_execute(0);

    // An urgent thread interrupts after every tick
    let mut order = Vec::new();
    for _ in 0..10 {
        run_ticks(&mut sched, 1);
        order.push(sched.execute_thread(0).unwrap());

        sched.resume(urgent).unwrap();
        assert_eq!(sched.execute_thread(0), Some(urgent));
        sched.switch_to_execute(0);
        sched.suspend(0, urgent, Timeout::Forever).unwrap();
        sched.switch_to_execute(0);
    }
    assert_eq!(order, [a, b, b, a, a, b, b, a, a, b]);
    assert_eq!(sched.stats().snapshot().time_slices, 5);
}

#[test]
fn one_ticking_core_slices_every_core() {
    let mut sched = scheduler(KernelConfig::new().with_cores(2).with_default_time_slice(1));
    let threads: Vec<ThreadHandle> = ["a", "b", "c"]
        .into_iter()
        .map(|name| sched.create_thread(ThreadOptions::new(name, 4)).unwrap())
        .collect();
    sched.switch_to_execute(0);
    sched.switch_to_execute(1);

    let mut runs = [0usize; 3];
    let mut waited_last_tick: Option<ThreadHandle> = None;
    for _ in 0..24 {
        // Only core 0 receives the clock
        sched.tick(0);
        sched.switch_to_execute(0);
        sched.switch_to_execute(1);

        let running = [sched.execute_thread(0), sched.execute_thread(1)];
        let waiting = threads.iter().copied().find(|t| !running.contains(&Some(*t)));
        if let Some(thread) = waiting {
            assert_ne!(waited_last_tick, Some(thread), "{} waited two ticks in a row", thread);
        }
        waited_last_tick = waiting;
        for (i, thread) in threads.iter().enumerate() {
            if running.contains(&Some(*thread)) {
                runs[i] += 1;
            }
        }
    }
    assert_eq!(runs.iter().sum::<usize>(), 48);
    assert!(runs.iter().all(|&n| n >= 12), "uneven share {:?}", runs);
}
