//! Persistence seams consulted by the execution engine.

use async_trait::async_trait;
use skyfleet_core::{Drone, DroneId, DroneStatus, Mission, MissionId, MissionStatus, now_ms};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::StoreError;

#[async_trait]
pub trait DroneStore: Send + Sync {
    /// Drones whose id is in `ids` and whose status is `status`.
    async fn find_by_ids_and_status(
        &self,
        ids: &[DroneId],
        status: DroneStatus,
    ) -> Result<Vec<Drone>, StoreError>;

    /// Sets every drone in `ids` to `status` in one update. Unknown ids are ignored.
    async fn bulk_set_status(&self, ids: &[DroneId], status: DroneStatus)
    -> Result<(), StoreError>;
}

#[async_trait]
pub trait MissionStore: Send + Sync {
    async fn save(&self, mission: &Mission) -> Result<(), StoreError>;
}

/// In-process drone and mission store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    drones: Mutex<HashMap<DroneId, Drone>>,
    missions: Mutex<HashMap<MissionId, Mission>>,
    saves: Mutex<Vec<(MissionId, MissionStatus)>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_drone(&self, drone: Drone) {
        self.drones.lock().await.insert(drone.id, drone);
    }

    pub async fn drone(&self, id: DroneId) -> Option<Drone> {
        self.drones.lock().await.get(&id).cloned()
    }

    pub async fn mission(&self, id: MissionId) -> Option<Mission> {
        self.missions.lock().await.get(&id).cloned()
    }

    /// Every status persisted for `id`, oldest first.
    pub async fn status_history(&self, id: MissionId) -> Vec<MissionStatus> {
        self.saves
            .lock()
            .await
            .iter()
            .filter(|(mission_id, _)| *mission_id == id)
            .map(|(_, status)| *status)
            .collect()
    }
}

#[async_trait]
impl DroneStore for MemoryStore {
    async fn find_by_ids_and_status(
        &self,
        ids: &[DroneId],
        status: DroneStatus,
    ) -> Result<Vec<Drone>, StoreError> {
        let drones = self.drones.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| drones.get(id))
            .filter(|drone| drone.status == status)
            .cloned()
            .collect())
    }

    async fn bulk_set_status(
        &self,
        ids: &[DroneId],
        status: DroneStatus,
    ) -> Result<(), StoreError> {
        let mut drones = self.drones.lock().await;
        let updated_at_ms = now_ms();
        for id in ids {
            if let Some(drone) = drones.get_mut(id) {
                drone.status = status;
                drone.updated_at_ms = updated_at_ms;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MissionStore for MemoryStore {
    async fn save(&self, mission: &Mission) -> Result<(), StoreError> {
        self.missions.lock().await.insert(mission.id, mission.clone());
        self.saves.lock().await.push((mission.id, mission.status));
        Ok(())
    }
}
