#[allow(clippy::module_inception)]
pub mod scheduler;
pub mod task;

pub use scheduler::{ReclaimFn, TaskQueue, TaskScheduler};
pub use task::{Claim, Completion, ComputeFn, Computed, Mode, Origin, Priority, Task};
