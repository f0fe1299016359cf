//! Mission scheduling and execution.
//!
//! A mission's timing intent is turned into a [`TriggerSpec`], registered
//! with the [`SchedulingRegistry`], and run by the [`ExecutionEngine`] each
//! time the trigger fires.

pub mod engine;
pub mod error;
pub mod executor;
pub mod notify;
pub mod registry;
pub mod store;
pub mod timer;
pub mod trigger;

pub use engine::ExecutionEngine;
pub use error::{ExecutionError, SchedulerError, StoreError};
pub use executor::{MissionExecutor, SimulatedExecutor};
pub use notify::{BroadcastSink, NoopSink, NotificationSink};
pub use registry::{ScheduledJobView, SchedulingRegistry};
pub use store::{DroneStore, MemoryStore, MissionStore};
pub use timer::{FireCallback, TimeSource, TimerHandle, TokioTimer};
pub use trigger::{CalendarField, CalendarPattern, TriggerSpec};
