//! Statistics - Scheduler event tracking
//!
//! Tracks context switches, preemptions, suspensions, timeouts and timer
//! activity. Counters are relaxed atomics so the host can read them
//! without entering the critical section.

use core::sync::atomic::{AtomicU64, Ordering};

/// Per-scheduler statistics
pub struct SchedulerStats {
    /// Context switches performed
    pub total_switches: AtomicU64,

    /// Threads created
    pub total_threads: AtomicU64,

    /// Threads deleted
    pub total_deleted: AtomicU64,

    /// Execute-thread selections
    pub total_picks: AtomicU64,

    /// Preemptions (execute thread displaced while ready)
    pub preemptions: AtomicU64,

    /// Threshold holders displaced by a more urgent thread
    pub threshold_preemptions: AtomicU64,

    /// Selections where a threshold held back a more urgent ready thread
    pub threshold_blocks: AtomicU64,

    /// Threads made ready
    pub resumes: AtomicU64,

    /// Threads taken off the ready lists
    pub suspends: AtomicU64,

    /// Suspensions cancelled by a racing resume
    pub resume_cancels: AtomicU64,

    /// Thread timeouts delivered
    pub timeouts: AtomicU64,

    /// Waits aborted
    pub aborts: AtomicU64,

    /// Time-slice expirations
    pub time_slices: AtomicU64,

    /// Voluntary yields
    pub relinquishes: AtomicU64,

    /// Application timer expirations
    pub timer_expirations: AtomicU64,

    /// Long timers that completed one more lap of the wheel
    pub timer_laps: AtomicU64,

    /// Expirations deferred because the ticking core was excluded
    pub timer_deferrals: AtomicU64,

    /// SMP rebalance passes
    pub rebalances: AtomicU64,

    /// Threads moved to a different core by a rebalance
    pub migrations: AtomicU64,
}

impl SchedulerStats {
    pub const fn new() -> Self {
        Self {
            total_switches: AtomicU64::new(0),
            total_threads: AtomicU64::new(0),
            total_deleted: AtomicU64::new(0),
            total_picks: AtomicU64::new(0),
            preemptions: AtomicU64::new(0),
            threshold_preemptions: AtomicU64::new(0),
            threshold_blocks: AtomicU64::new(0),
            resumes: AtomicU64::new(0),
            suspends: AtomicU64::new(0),
            resume_cancels: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            aborts: AtomicU64::new(0),
            time_slices: AtomicU64::new(0),
            relinquishes: AtomicU64::new(0),
            timer_expirations: AtomicU64::new(0),
            timer_laps: AtomicU64::new(0),
            timer_deferrals: AtomicU64::new(0),
            rebalances: AtomicU64::new(0),
            migrations: AtomicU64::new(0),
        }
    }

    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record context switch
    pub fn record_switch(&self) {
        Self::bump(&self.total_switches);
    }

    /// Record scheduling decision
    pub fn record_pick(&self) {
        Self::bump(&self.total_picks);
    }

    /// Record preemption
    pub fn record_preemption(&self) {
        Self::bump(&self.preemptions);
    }

    pub fn record_threshold_preemption(&self) {
        Self::bump(&self.threshold_preemptions);
    }

    pub fn record_threshold_block(&self) {
        Self::bump(&self.threshold_blocks);
    }

    pub fn record_create(&self) {
        Self::bump(&self.total_threads);
    }

    pub fn record_delete(&self) {
        Self::bump(&self.total_deleted);
    }

    pub fn record_resume(&self) {
        Self::bump(&self.resumes);
    }

    pub fn record_suspend(&self) {
        Self::bump(&self.suspends);
    }

    pub fn record_resume_cancel(&self) {
        Self::bump(&self.resume_cancels);
    }

    pub fn record_timeout(&self) {
        Self::bump(&self.timeouts);
    }

    pub fn record_abort(&self) {
        Self::bump(&self.aborts);
    }

    pub fn record_time_slice(&self) {
        Self::bump(&self.time_slices);
    }

    /// Record voluntary yield
    pub fn record_relinquish(&self) {
        Self::bump(&self.relinquishes);
    }

    pub fn record_timer_expiration(&self) {
        Self::bump(&self.timer_expirations);
    }

    pub fn record_timer_lap(&self) {
        Self::bump(&self.timer_laps);
    }

    pub fn record_timer_deferral(&self) {
        Self::bump(&self.timer_deferrals);
    }

    pub fn record_rebalance(&self) {
        Self::bump(&self.rebalances);
    }

    pub fn record_migration(&self) {
        Self::bump(&self.migrations);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            total_switches: load(&self.total_switches),
            total_threads: load(&self.total_threads),
            total_deleted: load(&self.total_deleted),
            total_picks: load(&self.total_picks),
            preemptions: load(&self.preemptions),
            threshold_preemptions: load(&self.threshold_preemptions),
            threshold_blocks: load(&self.threshold_blocks),
            resumes: load(&self.resumes),
            suspends: load(&self.suspends),
            resume_cancels: load(&self.resume_cancels),
            timeouts: load(&self.timeouts),
            aborts: load(&self.aborts),
            time_slices: load(&self.time_slices),
            relinquishes: load(&self.relinquishes),
            timer_expirations: load(&self.timer_expirations),
            timer_laps: load(&self.timer_laps),
            timer_deferrals: load(&self.timer_deferrals),
            rebalances: load(&self.rebalances),
            migrations: load(&self.migrations),
        }
    }
}

impl Default for SchedulerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain copy of `SchedulerStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_switches: u64,
    pub total_threads: u64,
    pub total_deleted: u64,
    pub total_picks: u64,
    pub preemptions: u64,
    pub threshold_preemptions: u64,
    pub threshold_blocks: u64,
    pub resumes: u64,
    pub suspends: u64,
    pub resume_cancels: u64,
    pub timeouts: u64,
    pub aborts: u64,
    pub time_slices: u64,
    pub relinquishes: u64,
    pub timer_expirations: u64,
    pub timer_laps: u64,
    pub timer_deferrals: u64,
    pub rebalances: u64,
    pub migrations: u64,
}
