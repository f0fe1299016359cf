use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{
    Connection, OptionalExtension, params, params_from_iter,
    types::{Type, Value},
};
use skyfleet_core::{
    Drone, DroneId, DroneStatus, GeoPoint, Mission, MissionId, MissionStatus, MissionType,
    OrganizationId, RecurrenceRule,
};
use skyfleet_scheduler::{DroneStore, MissionStore, StoreError};
use std::{fs, path::Path, sync::Arc};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const DRONE_COLUMNS: &str = "drone_id, organization_id, serial_number, model, status, battery_level, longitude, latitude, last_maintenance_ms, created_at_ms, updated_at_ms";

const MISSION_COLUMNS: &str = "mission_id, organization_id, name, description, mission_type, status, scheduled_time_ms, recurrence_frequency, recurrence_interval, longitude, latitude, scheduled_drones, created_at_ms, updated_at_ms";

pub fn init_db(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    create_schema(&conn)?;
    Ok(conn)
}

pub fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS drones (
          drone_id TEXT PRIMARY KEY,
          organization_id TEXT NOT NULL,
          serial_number TEXT NOT NULL UNIQUE,
          model TEXT NOT NULL,
          status TEXT NOT NULL,
          battery_level INTEGER NOT NULL,
          longitude REAL NOT NULL DEFAULT 0,
          latitude REAL NOT NULL DEFAULT 0,
          last_maintenance_ms INTEGER,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS missions (
          mission_id TEXT PRIMARY KEY,
          organization_id TEXT NOT NULL,
          name TEXT NOT NULL,
          description TEXT,
          mission_type TEXT NOT NULL,
          status TEXT NOT NULL,
          scheduled_time_ms INTEGER NOT NULL,
          recurrence_frequency TEXT,
          recurrence_interval INTEGER,
          longitude REAL,
          latitude REAL,
          scheduled_drones TEXT NOT NULL,
          schedule_active INTEGER NOT NULL DEFAULT 1,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );
        ",
    )
}

/// SQLite-backed drone and mission store shared by the API and the engine.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { db: Arc::new(Mutex::new(conn)) }
    }

    pub async fn lock(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().await
    }
}

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl DroneStore for SqliteStore {
    async fn find_by_ids_and_status(
        &self,
        ids: &[DroneId],
        status: DroneStatus,
    ) -> Result<Vec<Drone>, StoreError> {
        let db = self.db.lock().await;
        find_drones_by_ids_and_status(&db, ids, status).map_err(backend)
    }

    async fn bulk_set_status(
        &self,
        ids: &[DroneId],
        status: DroneStatus,
    ) -> Result<(), StoreError> {
        let db = self.db.lock().await;
        set_drone_status(&db, ids, status).map(|_| ()).map_err(backend)
    }
}

#[async_trait]
impl MissionStore for SqliteStore {
    async fn save(&self, mission: &Mission) -> Result<(), StoreError> {
        let db = self.db.lock().await;
        upsert_mission(&db, mission).map_err(backend)
    }
}

/// One page of a listing. `number` starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    fn limit(page: Option<Page>) -> i64 {
        page.map_or(-1, |page| i64::from(page.size))
    }

    fn offset(page: Option<Page>) -> i64 {
        page.map_or(0, |page| i64::from(page.number.saturating_sub(1)) * i64::from(page.size))
    }
}

#[derive(Debug, Default, Clone)]
pub struct DroneFilter {
    pub organization_id: Option<OrganizationId>,
    pub status: Option<DroneStatus>,
    pub min_battery: Option<u8>,
    pub page: Option<Page>,
}

#[derive(Debug, Default, Clone)]
pub struct MissionFilter {
    pub organization_id: Option<OrganizationId>,
    pub status: Option<MissionStatus>,
    pub mission_type: Option<MissionType>,
    pub page: Option<Page>,
}

pub fn insert_drone(conn: &Connection, drone: &Drone) -> rusqlite::Result<()> {
    conn.execute(
        "
        INSERT INTO drones (drone_id, organization_id, serial_number, model, status, battery_level, longitude, latitude, last_maintenance_ms, created_at_ms, updated_at_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ",
        params![
            drone.id.to_string(),
            drone.organization_id.to_string(),
            drone.serial_number,
            drone.model,
            drone.status.as_str(),
            drone.battery_level,
            drone.current_location.longitude(),
            drone.current_location.latitude(),
            drone.last_maintenance.map(|at| at.timestamp_millis()),
            drone.created_at_ms as i64,
            drone.updated_at_ms as i64
        ],
    )?;
    Ok(())
}

pub fn update_drone(conn: &Connection, drone: &Drone) -> rusqlite::Result<()> {
    conn.execute(
        "
        UPDATE drones
        SET status = ?2, battery_level = ?3, longitude = ?4, latitude = ?5,
            last_maintenance_ms = ?6, updated_at_ms = ?7
        WHERE drone_id = ?1
        ",
        params![
            drone.id.to_string(),
            drone.status.as_str(),
            drone.battery_level,
            drone.current_location.longitude(),
            drone.current_location.latitude(),
            drone.last_maintenance.map(|at| at.timestamp_millis()),
            drone.updated_at_ms as i64
        ],
    )?;
    Ok(())
}

pub fn delete_drone(conn: &Connection, id: DroneId) -> rusqlite::Result<bool> {
    let removed = conn.execute("DELETE FROM drones WHERE drone_id = ?1", params![id.to_string()])?;
    Ok(removed > 0)
}

pub fn fetch_drone(conn: &Connection, id: DroneId) -> rusqlite::Result<Option<Drone>> {
    conn.query_row(
        &format!("SELECT {DRONE_COLUMNS} FROM drones WHERE drone_id = ?1"),
        params![id.to_string()],
        map_drone_row,
    )
    .optional()
}

pub fn query_drones(conn: &Connection, filter: &DroneFilter) -> rusqlite::Result<Vec<Drone>> {
    let mut stmt = conn.prepare(&format!(
        "
        SELECT {DRONE_COLUMNS} FROM drones
        WHERE (?1 IS NULL OR organization_id = ?1)
          AND (?2 IS NULL OR status = ?2)
          AND (?3 IS NULL OR battery_level >= ?3)
        ORDER BY created_at_ms DESC
        LIMIT ?4 OFFSET ?5
        "
    ))?;
    let rows = stmt.query_map(
        params![
            filter.organization_id.map(|id| id.to_string()),
            filter.status.map(DroneStatus::as_str),
            filter.min_battery,
            Page::limit(filter.page),
            Page::offset(filter.page)
        ],
        map_drone_row,
    )?;
    rows.collect()
}

/// Matching rows regardless of `filter.page`.
pub fn count_drones(conn: &Connection, filter: &DroneFilter) -> rusqlite::Result<u64> {
    let count: i64 = conn.query_row(
        "
        SELECT COUNT(*) FROM drones
        WHERE (?1 IS NULL OR organization_id = ?1)
          AND (?2 IS NULL OR status = ?2)
          AND (?3 IS NULL OR battery_level >= ?3)
        ",
        params![
            filter.organization_id.map(|id| id.to_string()),
            filter.status.map(DroneStatus::as_str),
            filter.min_battery
        ],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

pub fn find_drones_by_ids_and_status(
    conn: &Connection,
    ids: &[DroneId],
    status: DroneStatus,
) -> rusqlite::Result<Vec<Drone>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT {DRONE_COLUMNS} FROM drones WHERE status = ? AND drone_id IN ({})",
        placeholders(ids.len())
    ))?;
    let values = std::iter::once(Value::Text(status.as_str().to_string()))
        .chain(ids.iter().map(|id| Value::Text(id.to_string())));
    let rows = stmt.query_map(params_from_iter(values), map_drone_row)?;
    rows.collect()
}

/// One statement for the whole id set. Returns the number of rows touched.
pub fn set_drone_status(
    conn: &Connection,
    ids: &[DroneId],
    status: DroneStatus,
) -> rusqlite::Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let values = [
        Value::Text(status.as_str().to_string()),
        Value::Integer(skyfleet_core::now_ms() as i64),
    ]
    .into_iter()
    .chain(ids.iter().map(|id| Value::Text(id.to_string())));
    conn.execute(
        &format!(
            "UPDATE drones SET status = ?, updated_at_ms = ? WHERE drone_id IN ({})",
            placeholders(ids.len())
        ),
        params_from_iter(values),
    )
}

pub fn upsert_mission(conn: &Connection, mission: &Mission) -> rusqlite::Result<()> {
    let scheduled_drones = serde_json::to_string(&mission.scheduled_drones)
        .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
    conn.execute(
        "
        INSERT INTO missions (
          mission_id, organization_id, name, description, mission_type, status, scheduled_time_ms,
          recurrence_frequency, recurrence_interval, longitude, latitude, scheduled_drones,
          created_at_ms, updated_at_ms
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT(mission_id) DO UPDATE SET
          status = excluded.status,
          updated_at_ms = excluded.updated_at_ms
        ",
        params![
            mission.id.to_string(),
            mission.organization_id.to_string(),
            mission.name,
            mission.description,
            mission.mission_type.as_str(),
            mission.status.as_str(),
            mission.scheduled_time.timestamp_millis(),
            mission.recurrence_rule.as_ref().map(|rule| rule.frequency.clone()),
            mission.recurrence_rule.as_ref().map(|rule| rule.interval),
            mission.location.map(|point| point.longitude()),
            mission.location.map(|point| point.latitude()),
            scheduled_drones,
            mission.created_at_ms as i64,
            mission.updated_at_ms as i64
        ],
    )?;
    Ok(())
}

pub fn delete_mission(conn: &Connection, id: MissionId) -> rusqlite::Result<bool> {
    let removed =
        conn.execute("DELETE FROM missions WHERE mission_id = ?1", params![id.to_string()])?;
    Ok(removed > 0)
}

pub fn fetch_mission(conn: &Connection, id: MissionId) -> rusqlite::Result<Option<Mission>> {
    conn.query_row(
        &format!("SELECT {MISSION_COLUMNS} FROM missions WHERE mission_id = ?1"),
        params![id.to_string()],
        map_mission_row,
    )
    .optional()
}

pub fn query_missions(conn: &Connection, filter: &MissionFilter) -> rusqlite::Result<Vec<Mission>> {
    let mut stmt = conn.prepare(&format!(
        "
        SELECT {MISSION_COLUMNS} FROM missions
        WHERE (?1 IS NULL OR organization_id = ?1)
          AND (?2 IS NULL OR status = ?2)
          AND (?3 IS NULL OR mission_type = ?3)
        ORDER BY scheduled_time_ms DESC
        LIMIT ?4 OFFSET ?5
        "
    ))?;
    let rows = stmt.query_map(
        params![
            filter.organization_id.map(|id| id.to_string()),
            filter.status.map(MissionStatus::as_str),
            filter.mission_type.map(MissionType::as_str),
            Page::limit(filter.page),
            Page::offset(filter.page)
        ],
        map_mission_row,
    )?;
    rows.collect()
}

pub fn count_missions(conn: &Connection, filter: &MissionFilter) -> rusqlite::Result<u64> {
    let count: i64 = conn.query_row(
        "
        SELECT COUNT(*) FROM missions
        WHERE (?1 IS NULL OR organization_id = ?1)
          AND (?2 IS NULL OR status = ?2)
          AND (?3 IS NULL OR mission_type = ?3)
        ",
        params![
            filter.organization_id.map(|id| id.to_string()),
            filter.status.map(MissionStatus::as_str),
            filter.mission_type.map(MissionType::as_str)
        ],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Records whether the mission's job should exist. Returns whether the row exists.
pub fn set_schedule_active(conn: &Connection, id: MissionId, active: bool) -> rusqlite::Result<bool> {
    let touched = conn.execute(
        "UPDATE missions SET schedule_active = ?2, updated_at_ms = ?3 WHERE mission_id = ?1",
        params![id.to_string(), active, skyfleet_core::now_ms() as i64],
    )?;
    Ok(touched > 0)
}

/// Missions whose job should exist after a restart: still active, and either
/// recurring or a one-time mission that has not fired yet.
pub fn query_restorable_missions(conn: &Connection) -> rusqlite::Result<Vec<Mission>> {
    let mut stmt = conn.prepare(&format!(
        "
        SELECT {MISSION_COLUMNS} FROM missions
        WHERE schedule_active = 1
          AND (mission_type = ?1 OR status = ?2)
        ORDER BY scheduled_time_ms ASC
        "
    ))?;
    let rows = stmt.query_map(
        params![MissionType::Recurring.as_str(), MissionStatus::Scheduled.as_str()],
        map_mission_row,
    )?;
    rows.collect()
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn uuid_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn millis_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<i64>>(idx)?
        .map(|ms| {
            DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    Type::Integer,
                    "timestamp out of range".into(),
                )
            })
        })
        .transpose()
}

fn map_drone_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Drone> {
    Ok(Drone {
        id: DroneId(uuid_column(row, 0)?),
        organization_id: OrganizationId(uuid_column(row, 1)?),
        serial_number: row.get(2)?,
        model: row.get(3)?,
        status: drone_status_from_db(&row.get::<_, String>(4)?),
        battery_level: row.get(5)?,
        current_location: GeoPoint::new(row.get(6)?, row.get(7)?),
        last_maintenance: millis_column(row, 8)?,
        created_at_ms: row.get::<_, i64>(9)? as u64,
        updated_at_ms: row.get::<_, i64>(10)? as u64,
    })
}

fn map_mission_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Mission> {
    let scheduled_time = millis_column(row, 6)?.ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(6, Type::Null, "missing scheduled time".into())
    })?;
    let recurrence_rule = row
        .get::<_, Option<String>>(7)?
        .map(|frequency| -> rusqlite::Result<RecurrenceRule> {
            let interval = row.get::<_, Option<u32>>(8)?.unwrap_or(1);
            Ok(RecurrenceRule { frequency, interval })
        })
        .transpose()?;
    let location = match (row.get::<_, Option<f64>>(9)?, row.get::<_, Option<f64>>(10)?) {
        (Some(longitude), Some(latitude)) => Some(GeoPoint::new(longitude, latitude)),
        _ => None,
    };
    let drones_json: String = row.get(11)?;
    let scheduled_drones = serde_json::from_str(&drones_json)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(err)))?;

    Ok(Mission {
        id: MissionId(uuid_column(row, 0)?),
        organization_id: OrganizationId(uuid_column(row, 1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        mission_type: mission_type_from_db(&row.get::<_, String>(4)?),
        status: mission_status_from_db(&row.get::<_, String>(5)?),
        scheduled_time,
        recurrence_rule,
        location,
        scheduled_drones,
        created_at_ms: row.get::<_, i64>(12)? as u64,
        updated_at_ms: row.get::<_, i64>(13)? as u64,
    })
}

fn drone_status_from_db(raw: &str) -> DroneStatus {
    DroneStatus::parse(raw).unwrap_or(DroneStatus::OutOfService)
}

fn mission_status_from_db(raw: &str) -> MissionStatus {
    MissionStatus::parse(raw).unwrap_or(MissionStatus::Aborted)
}

fn mission_type_from_db(raw: &str) -> MissionType {
    MissionType::parse(raw).unwrap_or(MissionType::OneTime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use skyfleet_core::Frequency;

    fn schedule_active(conn: &Connection, id: MissionId) -> rusqlite::Result<Option<bool>> {
        conn.query_row(
            "SELECT schedule_active FROM missions WHERE mission_id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()
    }

    fn store() -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        SqliteStore::new(conn)
    }

    #[tokio::test]
    async fn mission_round_trips_through_sqlite() {
        let store = store();
        let org = OrganizationId::new();
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap();
        let mission = Mission::recurring(
            org,
            "perimeter",
            at,
            RecurrenceRule::new(Frequency::Weekly, 3),
            vec![DroneId::new(), DroneId::new()],
        )
        .with_description("north fence line")
        .with_location(GeoPoint::new(-122.41, 37.77));

        store.save(&mission).await.unwrap();
        let db = store.lock().await;
        let loaded = fetch_mission(&db, mission.id).unwrap().unwrap();
        assert_eq!(loaded, mission);

        let recurring = query_missions(
            &db,
            &MissionFilter { mission_type: Some(MissionType::Recurring), ..MissionFilter::default() },
        )
        .unwrap();
        assert_eq!(recurring.len(), 1);
    }

    #[tokio::test]
    async fn save_updates_status_only() {
        let store = store();
        let mut mission = Mission::one_time(OrganizationId::new(), "survey", Utc::now(), vec![]);
        store.save(&mission).await.unwrap();

        mission.transition(MissionStatus::InProgress);
        store.save(&mission).await.unwrap();

        let db = store.lock().await;
        assert_eq!(
            fetch_mission(&db, mission.id).unwrap().unwrap().status,
            MissionStatus::InProgress
        );
    }

    #[tokio::test]
    async fn drone_store_contract() {
        let store = store();
        let org = OrganizationId::new();
        let assigned = Drone::new(org, "SN-1", "quad").with_status(DroneStatus::Assigned);
        let available = Drone::new(org, "SN-2", "quad");
        {
            let db = store.lock().await;
            insert_drone(&db, &assigned).unwrap();
            insert_drone(&db, &available).unwrap();
        }

        let ids = [assigned.id, available.id];
        let found = store.find_by_ids_and_status(&ids, DroneStatus::Assigned).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, assigned.id);

        store.bulk_set_status(&ids, DroneStatus::Charging).await.unwrap();
        let db = store.lock().await;
        let charging = query_drones(
            &db,
            &DroneFilter { status: Some(DroneStatus::Charging), ..DroneFilter::default() },
        )
        .unwrap();
        assert_eq!(charging.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_serial_is_a_constraint_violation() {
        let store = store();
        let org = OrganizationId::new();
        let db = store.lock().await;
        insert_drone(&db, &Drone::new(org, "SN-1", "quad")).unwrap();
        let err = insert_drone(&db, &Drone::new(org, "SN-1", "hex")).unwrap_err();
        assert_eq!(err.sqlite_error_code(), Some(rusqlite::ErrorCode::ConstraintViolation));
    }

    #[tokio::test]
    async fn battery_filter_is_inclusive() {
        let store = store();
        let org = OrganizationId::new();
        let mut low = Drone::new(org, "SN-1", "quad");
        low.battery_level = 20;
        let db = store.lock().await;
        insert_drone(&db, &low).unwrap();
        insert_drone(&db, &Drone::new(org, "SN-2", "quad")).unwrap();

        let filter = DroneFilter { min_battery: Some(20), ..DroneFilter::default() };
        assert_eq!(query_drones(&db, &filter).unwrap().len(), 2);
        let filter = DroneFilter { min_battery: Some(21), ..DroneFilter::default() };
        assert_eq!(query_drones(&db, &filter).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn drone_location_and_maintenance_persist() {
        let store = store();
        let mut drone = Drone::new(OrganizationId::new(), "SN-1", "quad");
        let db = store.lock().await;
        insert_drone(&db, &drone).unwrap();

        drone.current_location = GeoPoint::new(2.35, 48.85);
        drone.last_maintenance = Some(Utc.with_ymd_and_hms(2025, 3, 9, 14, 0, 0).unwrap());
        update_drone(&db, &drone).unwrap();

        assert_eq!(fetch_drone(&db, drone.id).unwrap().unwrap(), drone);
    }

    #[tokio::test]
    async fn pages_slice_results_but_not_the_count() {
        let store = store();
        let org = OrganizationId::new();
        let db = store.lock().await;
        for n in 0..5 {
            let at = Utc.with_ymd_and_hms(2025, 1, 1 + n, 0, 0, 0).unwrap();
            upsert_mission(&db, &Mission::one_time(org, format!("m{n}"), at, vec![])).unwrap();
        }

        let filter = MissionFilter { page: Some(Page { number: 2, size: 2 }), ..MissionFilter::default() };
        let names: Vec<_> =
            query_missions(&db, &filter).unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["m2", "m1"]);
        assert_eq!(count_missions(&db, &filter).unwrap(), 5);

        let past_end = MissionFilter { page: Some(Page { number: 4, size: 2 }), ..filter };
        assert!(query_missions(&db, &past_end).unwrap().is_empty());
    }

    #[tokio::test]
    async fn restorable_missions_skip_stopped_and_fired_ones() {
        let store = store();
        let org = OrganizationId::new();
        let pending = Mission::one_time(org, "pending", Utc::now(), vec![]);
        let cancelled = Mission::one_time(org, "cancelled", Utc::now(), vec![]);
        let mut fired = Mission::one_time(org, "fired", Utc::now(), vec![]);
        fired.transition(MissionStatus::Completed);
        let daily = RecurrenceRule::new(Frequency::Daily, 1);
        let mut series = Mission::recurring(org, "series", Utc::now(), daily.clone(), vec![]);
        series.transition(MissionStatus::Aborted);
        let stopped = Mission::recurring(org, "stopped", Utc::now(), daily, vec![]);

        let db = store.lock().await;
        for mission in [&pending, &cancelled, &fired, &series, &stopped] {
            upsert_mission(&db, mission).unwrap();
        }
        assert!(set_schedule_active(&db, cancelled.id, false).unwrap());
        assert!(set_schedule_active(&db, stopped.id, false).unwrap());
        assert!(!set_schedule_active(&db, MissionId::new(), false).unwrap());

        let mut names: Vec<_> =
            query_restorable_missions(&db).unwrap().into_iter().map(|m| m.name).collect();
        names.sort();
        assert_eq!(names, vec!["pending", "series"]);
        assert_eq!(schedule_active(&db, stopped.id).unwrap(), Some(false));
    }

    #[tokio::test]
    async fn saving_status_keeps_schedule_flag() {
        let store = store();
        let mut mission = Mission::one_time(OrganizationId::new(), "survey", Utc::now(), vec![]);
        store.save(&mission).await.unwrap();
        set_schedule_active(&*store.lock().await, mission.id, false).unwrap();

        mission.transition(MissionStatus::InProgress);
        store.save(&mission).await.unwrap();

        assert_eq!(schedule_active(&*store.lock().await, mission.id).unwrap(), Some(false));
    }
}
