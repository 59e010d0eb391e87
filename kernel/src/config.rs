//! Kernel configuration
//!
//! Compile-time limits plus the runtime `KernelConfig` every `Scheduler`
//! is built from. Arenas are sized once from this configuration; nothing
//! on the scheduling or tick path allocates.

use crate::scheduler::core::error::{KernelError, KernelResult};

/// Priority levels used when nothing else is configured.
pub const DEFAULT_PRIORITY_LEVELS: u32 = 32;

/// Two-level bitmap limit: 32 groups of 32 levels.
pub const MAX_PRIORITY_LEVELS: u32 = 1024;

/// Priority levels covered by one bitmap word.
pub const PRIORITY_WORD_BITS: u32 = 32;

/// Bitmap words needed for `MAX_PRIORITY_LEVELS`.
pub const PRIORITY_GROUPS: usize = (MAX_PRIORITY_LEVELS / PRIORITY_WORD_BITS) as usize;

/// Timer wheel slots (ticks covered by one lap).
pub const DEFAULT_TIMER_WHEEL_SLOTS: usize = 32;

/// Thread arena size.
pub const DEFAULT_MAX_THREADS: usize = 64;

/// Application timer arena size (thread timeout timers come on top).
pub const DEFAULT_MAX_TIMERS: usize = 64;

/// Core masks are 64 bits wide.
pub const MAX_CORES: usize = 64;

/// Time slice given to threads created without one (0 = no slicing).
pub const DEFAULT_TIME_SLICE: u32 = 0;

/// Runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Number of priority levels (multiple of 32, at most 1024)
    pub priority_levels: u32,

    /// Number of timer wheel slots
    pub timer_wheel_slots: usize,

    /// Thread arena capacity
    pub max_threads: usize,

    /// Application timer arena capacity
    pub max_timers: usize,

    /// Execution cores (1 = single-core scheduling path)
    pub cores: usize,

    /// Default time slice in ticks
    pub default_time_slice: u32,
}

impl KernelConfig {
    /// Create default configuration
    pub const fn new() -> Self {
        Self {
            priority_levels: DEFAULT_PRIORITY_LEVELS,
            timer_wheel_slots: DEFAULT_TIMER_WHEEL_SLOTS,
            max_threads: DEFAULT_MAX_THREADS,
            max_timers: DEFAULT_MAX_TIMERS,
            cores: 1,
            default_time_slice: DEFAULT_TIME_SLICE,
        }
    }

    pub const fn with_priority_levels(mut self, levels: u32) -> Self {
        self.priority_levels = levels;
        self
    }

    pub const fn with_timer_wheel_slots(mut self, slots: usize) -> Self {
        self.timer_wheel_slots = slots;
        self
    }

    pub const fn with_max_threads(mut self, threads: usize) -> Self {
        self.max_threads = threads;
        self
    }

    pub const fn with_max_timers(mut self, timers: usize) -> Self {
        self.max_timers = timers;
        self
    }

    pub const fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores;
        self
    }

    pub const fn with_default_time_slice(mut self, ticks: u32) -> Self {
        self.default_time_slice = ticks;
        self
    }

    /// Check every limit
    pub fn validate(&self) -> KernelResult<()> {
        if self.priority_levels == 0
            || self.priority_levels > MAX_PRIORITY_LEVELS
            || self.priority_levels % PRIORITY_WORD_BITS != 0
        {
            return Err(KernelError::InvalidConfig {
                reason: "priority levels must be a non-zero multiple of 32 up to 1024",
            });
        }
        if self.timer_wheel_slots == 0 {
            return Err(KernelError::InvalidConfig { reason: "timer wheel needs at least one slot" });
        }
        if self.max_threads == 0 || self.max_threads > u32::MAX as usize {
            return Err(KernelError::InvalidConfig { reason: "thread arena size out of range" });
        }
        if self.cores == 0 || self.cores > MAX_CORES {
            return Err(KernelError::InvalidConfig { reason: "core count must be 1..=64" });
        }
        Ok(())
    }

    /// Load configuration from kernel parameters
    ///
    /// Recognised keys: `sched.priorities`, `sched.wheel`, `sched.threads`,
    /// `sched.timers`, `sched.cores`, `sched.slice`. Other tokens belong to
    /// other subsystems and are skipped.
    pub fn from_cmdline(cmdline: &str) -> KernelResult<Self> {
        let mut config = Self::new();

        for token in cmdline.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            if !key.starts_with("sched.") {
                continue;
            }
            let value: u32 = value
                .parse()
                .map_err(|_| KernelError::InvalidConfig { reason: "non-numeric sched.* value" })?;

            match key {
                "sched.priorities" => config.priority_levels = value,
                "sched.wheel" => config.timer_wheel_slots = value as usize,
                "sched.threads" => config.max_threads = value as usize,
                "sched.timers" => config.max_timers = value as usize,
                "sched.cores" => config.cores = value as usize,
                "sched.slice" => config.default_time_slice = value,
                _ => log::warn!("Unknown scheduler parameter '{}'", key),
            }
        }

        log::debug!("Loading scheduler config from command line: {:?}", config);
        config.validate()?;
        Ok(config)
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::const_assert_eq;

    const_assert_eq!(PRIORITY_GROUPS, 32);
    const_assert_eq!(PRIORITY_GROUPS as u32 * PRIORITY_WORD_BITS, MAX_PRIORITY_LEVELS);

    #[test]
    fn test_default_is_valid() {
        assert_eq!(KernelConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_bad_levels() {
        let config = KernelConfig::new().with_priority_levels(40);
        assert!(matches!(config.validate(), Err(KernelError::InvalidConfig { .. })));
        let config = KernelConfig::new().with_priority_levels(2048);
        assert!(config.validate().is_err());
        let config = KernelConfig::new().with_cores(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cmdline() {
        let config = KernelConfig::from_cmdline(
            "console=ttyS0 sched.priorities=64 sched.wheel=16 sched.cores=2 sched.slice=4 quiet",
        )
        .unwrap();
        assert_eq!(config.priority_levels, 64);
        assert_eq!(config.timer_wheel_slots, 16);
        assert_eq!(config.cores, 2);
        assert_eq!(config.default_time_slice, 4);
        assert_eq!(config.max_threads, DEFAULT_MAX_THREADS);
    }

    #[test]
    fn test_cmdline_errors() {
        assert!(KernelConfig::from_cmdline("sched.cores=two").is_err());
        assert!(KernelConfig::from_cmdline("sched.priorities=33").is_err());
    }
}
