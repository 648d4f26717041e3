//! Session refresh: single-flight coordinator and proactive scheduler.

mod coordinator;
mod scheduler;

pub use coordinator::{RefreshCoordinator, RefreshState};
pub use scheduler::{ProactiveRefresh, SchedulerConfig};
