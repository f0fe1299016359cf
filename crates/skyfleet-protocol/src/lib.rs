use serde::{Deserialize, Serialize};
use skyfleet_core::{MissionId, now_ms};
use uuid::Uuid;

pub const IN_PROGRESS_MESSAGE: &str = "Mission is in progress";
pub const COMPLETED_MESSAGE: &str = "Mission completed successfully";

/// One notification as delivered to listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: Uuid,
    pub sent_at_ms: u64,
    pub event: MissionEvent,
}

impl Envelope {
    #[must_use]
    pub fn new(event: MissionEvent) -> Self {
        Self { message_id: Uuid::new_v4(), sent_at_ms: now_ms(), event }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum MissionEvent {
    #[serde(rename = "mission:in-progress")]
    InProgress(MissionMessage),
    #[serde(rename = "mission:completed")]
    Completed(MissionMessage),
    #[serde(rename = "mission:error")]
    Error(MissionFailure),
}

impl MissionEvent {
    #[must_use]
    pub fn in_progress(mission_id: MissionId) -> Self {
        Self::InProgress(MissionMessage { mission_id, message: IN_PROGRESS_MESSAGE.to_string() })
    }

    #[must_use]
    pub fn completed(mission_id: MissionId) -> Self {
        Self::Completed(MissionMessage { mission_id, message: COMPLETED_MESSAGE.to_string() })
    }

    #[must_use]
    pub fn error(mission_id: MissionId, error: impl Into<String>) -> Self {
        Self::Error(MissionFailure { mission_id, error: error.into() })
    }

    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::InProgress(_) => "mission:in-progress",
            Self::Completed(_) => "mission:completed",
            Self::Error(_) => "mission:error",
        }
    }

    #[must_use]
    pub fn mission_id(&self) -> MissionId {
        match self {
            Self::InProgress(payload) | Self::Completed(payload) => payload.mission_id,
            Self::Error(payload) => payload.mission_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionMessage {
    pub mission_id: MissionId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionFailure {
    pub mission_id: MissionId,
    pub error: String,
}
