use skyfleet_core::MissionId;
use thiserror::Error;

/// Registration-time failures. Returned synchronously from `schedule`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid recurrence frequency: {0}")]
    InvalidRecurrenceFrequency(String),

    #[error("interval {interval} is out of range for {frequency} recurrence")]
    InvalidRecurrenceInterval { frequency: &'static str, interval: u32 },

    #[error("recurring mission {0} has no recurrence rule")]
    MissingRecurrenceRule(MissionId),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Failures inside one engine pass. Always resolved to an aborted mission.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("No available drones for mission")]
    NoAvailableDrones,

    #[error("{0}")]
    WorkUnit(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
