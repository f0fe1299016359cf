use async_trait::async_trait;
use skyfleet_core::{Drone, Mission};
use std::time::Duration;
use tracing::info;

use crate::error::ExecutionError;

/// The unit of work performed for one mission occurrence.
#[async_trait]
pub trait MissionExecutor: Send + Sync {
    async fn execute(&self, mission: &Mission, drones: &[Drone]) -> Result<(), ExecutionError>;
}

/// Stands in for real drone dispatch by waiting a fixed duration.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedExecutor {
    duration: Duration,
}

impl SimulatedExecutor {
    pub const DEFAULT_DURATION: Duration = Duration::from_secs(5);

    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DURATION)
    }
}

#[async_trait]
impl MissionExecutor for SimulatedExecutor {
    async fn execute(&self, mission: &Mission, drones: &[Drone]) -> Result<(), ExecutionError> {
        tokio::time::sleep(self.duration).await;
        info!(mission_id = %mission.id, drones = drones.len(), "executed mission");
        Ok(())
    }
}
