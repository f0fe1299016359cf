use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MissionId(pub Uuid);

impl MissionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DroneId(pub Uuid);

impl DroneId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DroneId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DroneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Owning tenant. Opaque to scheduling; only used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub Uuid);

impl OrganizationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrganizationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissionType {
    OneTime,
    Recurring,
}

impl MissionType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneTime => "one-time",
            Self::Recurring => "recurring",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "one-time" => Some(Self::OneTime),
            "recurring" => Some(Self::Recurring),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissionStatus {
    Scheduled,
    InProgress,
    Completed,
    Aborted,
}

impl MissionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "scheduled" => Some(Self::Scheduled),
            "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Scheduled => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Aborted => 2,
        }
    }

    /// Transitions only move forward along `scheduled -> in-progress -> terminal`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DroneStatus {
    Available,
    Assigned,
    Maintenance,
    Charging,
    OutOfService,
}

impl DroneStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Assigned => "assigned",
            Self::Maintenance => "maintenance",
            Self::Charging => "charging",
            Self::OutOfService => "out-of-service",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "available" => Some(Self::Available),
            "assigned" => Some(Self::Assigned),
            "maintenance" => Some(Self::Maintenance),
            "charging" => Some(Self::Charging),
            "out-of-service" => Some(Self::OutOfService),
            _ => None,
        }
    }
}

impl fmt::Display for DroneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }
}

/// Recurrence as stored on the mission record.
///
/// `frequency` stays a raw string so that a malformed rule survives
/// deserialization and is rejected when the mission is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: String,
    #[serde(default = "default_interval")]
    pub interval: u32,
}

impl RecurrenceRule {
    #[must_use]
    pub fn new(frequency: Frequency, interval: u32) -> Self {
        Self { frequency: frequency.as_str().to_string(), interval }
    }
}

fn default_interval() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
}

/// GeoJSON point. Coordinates are `[longitude, latitude]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub kind: GeometryType,
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    #[must_use]
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self { kind: GeometryType::Point, coordinates: [longitude, latitude] }
    }

    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.coordinates[0]
    }

    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.coordinates[1]
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        (-180.0..=180.0).contains(&self.longitude()) && (-90.0..=90.0).contains(&self.latitude())
    }
}

impl Default for GeoPoint {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub organization_id: OrganizationId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub mission_type: MissionType,
    pub status: MissionStatus,
    pub scheduled_time: DateTime<Utc>,
    pub recurrence_rule: Option<RecurrenceRule>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    pub scheduled_drones: Vec<DroneId>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Mission {
    #[must_use]
    pub fn one_time(
        organization_id: OrganizationId,
        name: impl Into<String>,
        scheduled_time: DateTime<Utc>,
        scheduled_drones: Vec<DroneId>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: MissionId::new(),
            organization_id,
            name: name.into(),
            description: None,
            mission_type: MissionType::OneTime,
            status: MissionStatus::Scheduled,
            scheduled_time,
            recurrence_rule: None,
            location: None,
            scheduled_drones,
            created_at_ms: now,
            updated_at_ms: now,
        }
    }

    #[must_use]
    pub fn recurring(
        organization_id: OrganizationId,
        name: impl Into<String>,
        scheduled_time: DateTime<Utc>,
        rule: RecurrenceRule,
        scheduled_drones: Vec<DroneId>,
    ) -> Self {
        Self {
            mission_type: MissionType::Recurring,
            recurrence_rule: Some(rule),
            ..Self::one_time(organization_id, name, scheduled_time, scheduled_drones)
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    /// Fresh copy for one firing of the trigger, starting back at `scheduled`.
    #[must_use]
    pub fn occurrence(&self) -> Self {
        Self { status: MissionStatus::Scheduled, ..self.clone() }
    }

    /// Moves to `next` if the state machine allows it. Returns whether it moved.
    pub fn transition(&mut self, next: MissionStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at_ms = now_ms();
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drone {
    pub id: DroneId,
    pub organization_id: OrganizationId,
    pub serial_number: String,
    pub model: String,
    pub status: DroneStatus,
    pub battery_level: u8,
    #[serde(default)]
    pub current_location: GeoPoint,
    #[serde(default)]
    pub last_maintenance: Option<DateTime<Utc>>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Drone {
    #[must_use]
    pub fn new(
        organization_id: OrganizationId,
        serial_number: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: DroneId::new(),
            organization_id,
            serial_number: serial_number.into(),
            model: model.into(),
            status: DroneStatus::Available,
            battery_level: 100,
            current_location: GeoPoint::default(),
            last_maintenance: None,
            created_at_ms: now,
            updated_at_ms: now,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: DroneStatus) -> Self {
        self.status = status;
        self
    }
}

#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
