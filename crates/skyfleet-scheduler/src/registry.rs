//! Process-wide table of active mission jobs.

use futures_util::FutureExt;
use serde::Serialize;
use skyfleet_core::{Mission, MissionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::engine::ExecutionEngine;
use crate::error::SchedulerError;
use crate::timer::{FireCallback, TimerHandle, TokioTimer};
use crate::trigger::{self, TriggerSpec};

struct ScheduledJob {
    generation: u64,
    trigger: TriggerSpec,
    handle: TimerHandle,
}

/// Read-only view of a registered job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledJobView {
    pub mission_id: MissionId,
    pub trigger: TriggerSpec,
}

struct Inner {
    jobs: Mutex<HashMap<MissionId, ScheduledJob>>,
    engine: ExecutionEngine,
    timer: TokioTimer,
    generations: AtomicU64,
}

impl Inner {
    /// Whether this firing still belongs to the live registration.
    /// A one-shot registration is consumed by its firing.
    async fn claim(&self, mission_id: MissionId, generation: u64, one_shot: bool) -> bool {
        let mut jobs = self.jobs.lock().await;
        let live = jobs.get(&mission_id).is_some_and(|job| job.generation == generation);
        if live && one_shot {
            jobs.remove(&mission_id);
        }
        live
    }
}

/// At most one job per mission id; registering again replaces the old job.
#[derive(Clone)]
pub struct SchedulingRegistry {
    inner: Arc<Inner>,
}

impl SchedulingRegistry {
    /// Registry whose timers follow the system clock.
    pub fn new(engine: ExecutionEngine) -> Self {
        Self::with_timer(engine, TokioTimer::default())
    }

    pub fn with_timer(engine: ExecutionEngine, timer: TokioTimer) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: Mutex::new(HashMap::new()),
                engine,
                timer,
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Registers `mission`, replacing any job already held for its id.
    pub async fn schedule(&self, mission: Mission) -> Result<TriggerSpec, SchedulerError> {
        let trigger = trigger::for_mission(&mission)?;
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let mission_id = mission.id;

        let mut jobs = self.inner.jobs.lock().await;
        if let Some(previous) = jobs.remove(&mission_id) {
            previous.handle.cancel();
            debug!(%mission_id, "replaced existing job");
        }
        let callback =
            fire_callback(Arc::downgrade(&self.inner), mission, generation, trigger.is_one_shot());
        let handle = self.inner.timer.register(trigger, callback);
        jobs.insert(mission_id, ScheduledJob { generation, trigger, handle });
        info!(%mission_id, %trigger, "mission scheduled");
        Ok(trigger)
    }

    /// Stops the mission's job if one is registered. Returns whether one was.
    ///
    /// A run that already started is left to finish.
    pub async fn cancel(&self, mission_id: MissionId) -> bool {
        let Some(job) = self.inner.jobs.lock().await.remove(&mission_id) else {
            return false;
        };
        self.inner.timer.cancel(&job.handle);
        info!(%mission_id, "mission schedule cancelled");
        true
    }

    pub async fn is_scheduled(&self, mission_id: MissionId) -> bool {
        self.inner.jobs.lock().await.contains_key(&mission_id)
    }

    pub async fn trigger_for(&self, mission_id: MissionId) -> Option<TriggerSpec> {
        self.inner.jobs.lock().await.get(&mission_id).map(|job| job.trigger)
    }

    pub async fn scheduled(&self) -> Vec<ScheduledJobView> {
        let jobs = self.inner.jobs.lock().await;
        let mut views: Vec<_> = jobs
            .iter()
            .map(|(mission_id, job)| ScheduledJobView { mission_id: *mission_id, trigger: job.trigger })
            .collect();
        views.sort_by_key(|view| view.mission_id);
        views
    }

    /// Cancels every job.
    pub async fn shutdown(&self) {
        let mut jobs = self.inner.jobs.lock().await;
        for (_, job) in jobs.drain() {
            job.handle.cancel();
        }
        info!("scheduling registry shut down");
    }
}

fn fire_callback(
    registry: Weak<Inner>,
    mission: Mission,
    generation: u64,
    one_shot: bool,
) -> FireCallback {
    Arc::new(move || {
        let registry = registry.clone();
        let mission = mission.clone();
        async move {
            let Some(inner) = registry.upgrade() else {
                return;
            };
            if !inner.claim(mission.id, generation, one_shot).await {
                debug!(mission_id = %mission.id, generation, "skipping stale firing");
                return;
            }
            inner.engine.run(mission.occurrence()).await;
        }
        .boxed()
    })
}
