//! Scheduler core module
//!
//! Priority bitmap, ready lists, preemption-threshold tracking, execute
//! thread selection (single core and SMP) and the dispatcher.

pub mod affinity;
pub mod dispatcher;
pub mod error;
pub mod loadbalancer;
pub mod priority_map;
pub(crate) mod ready_queue;
pub mod scheduler;
pub mod statistics;
pub(crate) mod threshold;

pub use affinity::{CoreId, CoreMask};
pub use dispatcher::Switch;
pub use error::{KernelError, KernelResult};
pub use priority_map::PriorityMap;
pub use scheduler::Scheduler;
pub use statistics::{SchedulerStats, StatsSnapshot};
