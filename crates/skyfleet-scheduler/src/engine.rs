//! The mission state machine run each time a trigger fires.

use skyfleet_core::{DroneStatus, Mission, MissionStatus};
use skyfleet_protocol::MissionEvent;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::ExecutionError;
use crate::executor::MissionExecutor;
use crate::notify::NotificationSink;
use crate::store::{DroneStore, MissionStore};

#[derive(Clone)]
pub struct ExecutionEngine {
    missions: Arc<dyn MissionStore>,
    drones: Arc<dyn DroneStore>,
    executor: Arc<dyn MissionExecutor>,
    sink: Arc<dyn NotificationSink>,
}

impl ExecutionEngine {
    pub fn new(
        missions: Arc<dyn MissionStore>,
        drones: Arc<dyn DroneStore>,
        executor: Arc<dyn MissionExecutor>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self { missions, drones, executor, sink }
    }

    /// Runs one occurrence of `mission` to a terminal state and returns it.
    ///
    /// Never fails: lookup, work-unit and persistence errors end in either
    /// `completed` or `aborted` plus the matching notification. Drones are
    /// released only on completion.
    pub async fn run(&self, mut mission: Mission) -> MissionStatus {
        if !mission.transition(MissionStatus::InProgress) {
            warn!(mission_id = %mission.id, status = %mission.status, "mission cannot start from its current status");
            return mission.status;
        }
        self.persist(&mission).await;
        info!(mission_id = %mission.id, "mission in progress");
        self.sink.emit(MissionEvent::in_progress(mission.id));

        match self.dispatch(&mission).await {
            Ok(()) => {
                mission.transition(MissionStatus::Completed);
                self.persist(&mission).await;
                if let Err(err) = self
                    .drones
                    .bulk_set_status(&mission.scheduled_drones, DroneStatus::Available)
                    .await
                {
                    error!(mission_id = %mission.id, error = %err, "failed to release drones");
                }
                info!(mission_id = %mission.id, "mission completed");
                self.sink.emit(MissionEvent::completed(mission.id));
            }
            Err(err) => {
                warn!(mission_id = %mission.id, error = %err, "mission aborted");
                mission.transition(MissionStatus::Aborted);
                self.persist(&mission).await;
                self.sink.emit(MissionEvent::error(mission.id, err.to_string()));
            }
        }

        mission.status
    }

    async fn dispatch(&self, mission: &Mission) -> Result<(), ExecutionError> {
        let drones = self
            .drones
            .find_by_ids_and_status(&mission.scheduled_drones, DroneStatus::Assigned)
            .await?;
        if drones.is_empty() {
            return Err(ExecutionError::NoAvailableDrones);
        }
        self.executor.execute(mission, &drones).await
    }

    // A failed save is logged but the in-memory transition stands.
    async fn persist(&self, mission: &Mission) {
        if let Err(err) = self.missions.save(mission).await {
            error!(mission_id = %mission.id, status = %mission.status, error = %err, "failed to persist mission");
        }
    }
}
