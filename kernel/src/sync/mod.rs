pub mod protect;
pub mod wait_queue;

pub use protect::{Nested, Protect, ProtectGuard};
pub use wait_queue::WaitQueue;
