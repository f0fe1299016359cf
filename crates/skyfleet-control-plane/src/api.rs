use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skyfleet_core::{
    Drone, DroneId, DroneStatus, GeoPoint, Mission, MissionId, MissionStatus, MissionType,
    OrganizationId, RecurrenceRule, now_ms,
};
use skyfleet_protocol::Envelope;
use skyfleet_scheduler::{
    BroadcastSink, DroneStore, ScheduledJobView, SchedulerError, SchedulingRegistry, StoreError,
    trigger,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{self, DroneFilter, MissionFilter, Page, SqliteStore};

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct AppState {
    pub store: SqliteStore,
    pub registry: SchedulingRegistry,
    pub events: BroadcastSink,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/drones", post(create_drone).get(list_drones))
        .route("/api/drones/{id}", get(get_drone).delete(remove_drone))
        .route("/api/drones/{id}/status", patch(update_drone_status))
        .route("/api/missions", post(create_mission).get(list_missions))
        .route("/api/missions/{id}", get(get_mission))
        .route("/api/missions/{id}/status", patch(update_mission_status))
        .route("/api/missions/{id}/schedule", delete(cancel_mission))
        .route("/api/schedule", get(list_schedule))
        .route("/api/events", get(events))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into() }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self { status: StatusCode::CONFLICT, message: message.into() }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: message.into() }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(value: rusqlite::Error) -> Self {
        Self::internal(format!("sqlite error: {value}"))
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Backend(message) => Self::internal(message),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(value: SchedulerError) -> Self {
        Self::bad_request(value.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiErrorBody { ok: false, error: self.message })).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct CreateDroneRequest {
    organization_id: Uuid,
    serial_number: String,
    model: String,
    battery_level: Option<u8>,
    status: Option<DroneStatus>,
    current_location: Option<GeoPoint>,
    last_maintenance: Option<DateTime<Utc>>,
}

fn resolve_page(page: Option<u32>, limit: Option<u32>) -> Result<Page, ApiError> {
    let number = page.unwrap_or(1);
    if number == 0 {
        return Err(ApiError::bad_request("Page must be a positive integer"));
    }
    let size = limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&size) {
        return Err(ApiError::bad_request("Limit must be between 1 and 100"));
    }
    Ok(Page { number, size })
}

#[derive(Debug, Default, Deserialize)]
struct DroneQuery {
    organization_id: Option<Uuid>,
    status: Option<DroneStatus>,
    min_battery: Option<u8>,
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct UpdateDroneRequest {
    status: Option<DroneStatus>,
    battery_level: Option<u8>,
    location: Option<GeoPoint>,
    last_maintenance: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CreateMissionRequest {
    organization_id: Uuid,
    name: String,
    description: Option<String>,
    #[serde(rename = "type")]
    mission_type: Option<MissionType>,
    scheduled_time: DateTime<Utc>,
    recurrence_rule: Option<RecurrenceRule>,
    location: GeoPoint,
    #[serde(default)]
    scheduled_drones: Vec<DroneId>,
}

#[derive(Debug, Default, Deserialize)]
struct MissionQuery {
    organization_id: Option<Uuid>,
    status: Option<MissionStatus>,
    #[serde(rename = "type")]
    mission_type: Option<MissionType>,
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Pagination {
    current_page: u32,
    total_pages: u64,
    total: u64,
}

impl Pagination {
    fn new(page: Page, total: u64) -> Self {
        Self { current_page: page.number, total_pages: total.div_ceil(u64::from(page.size)), total }
    }
}

#[derive(Debug, Serialize)]
struct DroneList {
    drones: Vec<Drone>,
    pagination: Pagination,
}

#[derive(Debug, Serialize)]
struct MissionList {
    missions: Vec<Mission>,
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct UpdateMissionStatusRequest {
    status: MissionStatus,
}

#[derive(Debug, Serialize)]
struct MissionResponse {
    message: String,
    mission: Mission,
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    ok: bool,
    was_scheduled: bool,
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

fn validate_battery(level: Option<u8>) -> Result<(), ApiError> {
    match level {
        Some(level) if level > 100 => {
            Err(ApiError::bad_request("Battery level must be between 0 and 100"))
        }
        _ => Ok(()),
    }
}

fn validate_location(location: Option<&GeoPoint>) -> Result<(), ApiError> {
    match location {
        Some(point) if !point.is_valid() => Err(ApiError::bad_request(
            "Coordinates must be an array of [longitude, latitude]",
        )),
        _ => Ok(()),
    }
}

async fn create_drone(
    State(state): State<AppState>,
    Json(request): Json<CreateDroneRequest>,
) -> Result<(StatusCode, Json<Drone>), ApiError> {
    if request.serial_number.trim().is_empty() || request.model.trim().is_empty() {
        return Err(ApiError::bad_request("serial_number and model are required"));
    }
    validate_battery(request.battery_level)?;
    validate_location(request.current_location.as_ref())?;

    let mut drone = Drone::new(
        OrganizationId(request.organization_id),
        request.serial_number.trim(),
        request.model.trim(),
    );
    if let Some(level) = request.battery_level {
        drone.battery_level = level;
    }
    if let Some(status) = request.status {
        drone.status = status;
    }
    if let Some(location) = request.current_location {
        drone.current_location = location;
    }
    drone.last_maintenance = request.last_maintenance;

    let db = state.store.lock().await;
    match db::insert_drone(&db, &drone) {
        Ok(()) => {}
        Err(err) if err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) => {
            return Err(ApiError::bad_request("Drone with this serial number already exists"));
        }
        Err(err) => return Err(err.into()),
    }
    info!(drone_id = %drone.id, serial = %drone.serial_number, "drone added");
    Ok((StatusCode::CREATED, Json(drone)))
}

async fn list_drones(
    State(state): State<AppState>,
    Query(query): Query<DroneQuery>,
) -> Result<Json<DroneList>, ApiError> {
    let page = resolve_page(query.page, query.limit)?;
    let filter = DroneFilter {
        organization_id: query.organization_id.map(OrganizationId),
        status: query.status,
        min_battery: query.min_battery,
        page: Some(page),
    };
    let db = state.store.lock().await;
    let drones = db::query_drones(&db, &filter)?;
    let total = db::count_drones(&db, &filter)?;
    Ok(Json(DroneList { drones, pagination: Pagination::new(page, total) }))
}

async fn get_drone(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Drone>, ApiError> {
    let db = state.store.lock().await;
    let drone =
        db::fetch_drone(&db, DroneId(id))?.ok_or_else(|| ApiError::not_found("Drone not found"))?;
    Ok(Json(drone))
}

async fn update_drone_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateDroneRequest>,
) -> Result<Json<Drone>, ApiError> {
    validate_battery(request.battery_level)?;
    validate_location(request.location.as_ref())?;

    let db = state.store.lock().await;
    let mut drone =
        db::fetch_drone(&db, DroneId(id))?.ok_or_else(|| ApiError::not_found("Drone not found"))?;
    if let Some(status) = request.status {
        drone.status = status;
    }
    if let Some(level) = request.battery_level {
        drone.battery_level = level;
    }
    if let Some(location) = request.location {
        drone.current_location = location;
    }
    if let Some(at) = request.last_maintenance {
        drone.last_maintenance = Some(at);
    }
    drone.updated_at_ms = now_ms();
    db::update_drone(&db, &drone)?;
    Ok(Json(drone))
}

async fn remove_drone(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Drone>, ApiError> {
    let db = state.store.lock().await;
    let drone =
        db::fetch_drone(&db, DroneId(id))?.ok_or_else(|| ApiError::not_found("Drone not found"))?;
    db::delete_drone(&db, drone.id)?;
    info!(drone_id = %drone.id, "drone removed");
    Ok(Json(drone))
}

async fn create_mission(
    State(state): State<AppState>,
    Json(request): Json<CreateMissionRequest>,
) -> Result<(StatusCode, Json<MissionResponse>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::bad_request("Mission name is required"));
    }
    validate_location(Some(&request.location))?;

    let organization_id = OrganizationId(request.organization_id);
    let name = request.name.trim().to_string();
    let description = request
        .description
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());
    let mut mission = match (request.mission_type.unwrap_or(MissionType::OneTime), request.recurrence_rule) {
        (MissionType::Recurring, Some(rule)) => Mission::recurring(
            organization_id,
            name,
            request.scheduled_time,
            rule,
            request.scheduled_drones,
        ),
        (mission_type, _) => Mission {
            mission_type,
            ..Mission::one_time(organization_id, name, request.scheduled_time, request.scheduled_drones)
        },
    };
    mission.description = description;
    mission.location = Some(request.location);
    // Reject malformed timing before anything is written.
    trigger::for_mission(&mission)?;

    let available = state
        .store
        .find_by_ids_and_status(&mission.scheduled_drones, DroneStatus::Available)
        .await?;
    if available.len() != mission.scheduled_drones.len() {
        return Err(ApiError::bad_request("One or more selected drones are not available"));
    }

    {
        let db = state.store.lock().await;
        db::upsert_mission(&db, &mission)?;
        db::set_drone_status(&db, &mission.scheduled_drones, DroneStatus::Assigned)?;
    }

    if let Err(err) = state.registry.schedule(mission.clone()).await {
        warn!(mission_id = %mission.id, error = %err, "scheduling failed, rolling back mission");
        let db = state.store.lock().await;
        db::set_drone_status(&db, &mission.scheduled_drones, DroneStatus::Available)?;
        db::delete_mission(&db, mission.id)?;
        return Err(err.into());
    }

    Ok((
        StatusCode::CREATED,
        Json(MissionResponse { message: "Mission created successfully".to_string(), mission }),
    ))
}

async fn list_missions(
    State(state): State<AppState>,
    Query(query): Query<MissionQuery>,
) -> Result<Json<MissionList>, ApiError> {
    let page = resolve_page(query.page, query.limit)?;
    let filter = MissionFilter {
        organization_id: query.organization_id.map(OrganizationId),
        status: query.status,
        mission_type: query.mission_type,
        page: Some(page),
    };
    let db = state.store.lock().await;
    let missions = db::query_missions(&db, &filter)?;
    let total = db::count_missions(&db, &filter)?;
    Ok(Json(MissionList { missions, pagination: Pagination::new(page, total) }))
}

async fn get_mission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Mission>, ApiError> {
    let db = state.store.lock().await;
    let mission = db::fetch_mission(&db, MissionId(id))?
        .ok_or_else(|| ApiError::not_found("Mission not found"))?;
    Ok(Json(mission))
}

/// Manual status change. Finishing a mission by hand frees its drones and
/// drops its job for good, so neither the trigger nor a restart brings it back.
///
/// A recurring mission rests in the terminal status of its last occurrence;
/// asking for a terminal status again stops the series.
async fn update_mission_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateMissionStatusRequest>,
) -> Result<Json<MissionResponse>, ApiError> {
    let (mission, stopped_series) = {
        let db = state.store.lock().await;
        let mut mission = db::fetch_mission(&db, MissionId(id))?
            .ok_or_else(|| ApiError::not_found("Mission not found"))?;
        let from = mission.status;
        let moved = mission.transition(request.status);
        let stopped_series = !moved
            && mission.mission_type == MissionType::Recurring
            && from.is_terminal()
            && request.status.is_terminal();
        if !moved && !stopped_series {
            return Err(ApiError::conflict(format!(
                "cannot move mission from {from} to {}",
                request.status
            )));
        }
        if moved {
            db::upsert_mission(&db, &mission)?;
        }
        if mission.status.is_terminal() {
            db::set_drone_status(&db, &mission.scheduled_drones, DroneStatus::Available)?;
            db::set_schedule_active(&db, mission.id, false)?;
        }
        (mission, stopped_series)
    };

    if mission.status.is_terminal() {
        state.registry.cancel(mission.id).await;
    }
    info!(mission_id = %mission.id, status = %mission.status, stopped_series, "mission status updated");
    let message = if stopped_series { "Recurring mission stopped" } else { "Mission status updated" };
    Ok(Json(MissionResponse { message: message.to_string(), mission }))
}

/// Stops the mission's job. The stop is persisted so a restart does not revive it.
async fn cancel_mission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    let id = MissionId(id);
    let known = db::set_schedule_active(&*state.store.lock().await, id, false)?;
    let was_scheduled = state.registry.cancel(id).await;
    if !known && !was_scheduled {
        return Err(ApiError::not_found("Mission not found"));
    }
    Ok(Json(CancelResponse { ok: true, was_scheduled }))
}

async fn list_schedule(State(state): State<AppState>) -> Json<Vec<ScheduledJobView>> {
    Json(state.registry.scheduled().await)
}

async fn events(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let receiver = state.events.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, receiver))
}

async fn stream_events(mut socket: WebSocket, mut receiver: broadcast::Receiver<Envelope>) {
    debug!("event listener connected");
    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Ok(envelope) => {
                    let text = match serde_json::to_string(&envelope) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(error = %err, "failed to encode notification");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event listener lagged, notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("event listener disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use skyfleet_scheduler::{ExecutionEngine, SimulatedExecutor, TokioTimer};
    use std::sync::Arc;

    fn registry_over(store: &SqliteStore, events: &BroadcastSink) -> SchedulingRegistry {
        let engine = ExecutionEngine::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(SimulatedExecutor::default()),
            Arc::new(events.clone()),
        );
        SchedulingRegistry::with_timer(engine, TokioTimer::runtime())
    }

    fn state() -> AppState {
        let conn = Connection::open_in_memory().unwrap();
        db::create_schema(&conn).unwrap();
        let store = SqliteStore::new(conn);
        let events = BroadcastSink::new(16);
        let registry = registry_over(&store, &events);
        AppState { store, registry, events }
    }

    /// A registry rebuilt from the database, as after a process restart.
    async fn restarted(state: &AppState) -> SchedulingRegistry {
        let registry = registry_over(&state.store, &state.events);
        crate::restore_schedules(&state.store, &registry).await.unwrap();
        registry
    }

    async fn add_drone(state: &AppState, serial: &str, status: DroneStatus) -> Drone {
        let drone = Drone::new(OrganizationId::new(), serial, "quad").with_status(status);
        db::insert_drone(&*state.store.lock().await, &drone).unwrap();
        drone
    }

    fn mission_request(drones: Vec<DroneId>) -> CreateMissionRequest {
        CreateMissionRequest {
            organization_id: Uuid::new_v4(),
            name: "survey".to_string(),
            description: Some("  fence line  ".to_string()),
            mission_type: None,
            scheduled_time: Utc::now() + chrono::Duration::hours(3),
            recurrence_rule: None,
            location: GeoPoint::new(-122.41, 37.77),
            scheduled_drones: drones,
        }
    }

    fn recurring_request(drones: Vec<DroneId>) -> CreateMissionRequest {
        CreateMissionRequest {
            mission_type: Some(MissionType::Recurring),
            recurrence_rule: Some(RecurrenceRule { frequency: "daily".to_string(), interval: 1 }),
            ..mission_request(drones)
        }
    }

    fn drone_request(serial: &str) -> CreateDroneRequest {
        CreateDroneRequest {
            organization_id: Uuid::new_v4(),
            serial_number: serial.to_string(),
            model: "quad".to_string(),
            battery_level: Some(80),
            status: None,
            current_location: None,
            last_maintenance: None,
        }
    }

    async fn patch_status(
        state: &AppState,
        id: MissionId,
        status: MissionStatus,
    ) -> Result<Json<MissionResponse>, ApiError> {
        update_mission_status(
            State(state.clone()),
            Path(id.0),
            Json(UpdateMissionStatusRequest { status }),
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn create_mission_assigns_drones_and_registers_job() {
        let state = state();
        let drone = add_drone(&state, "SN-1", DroneStatus::Available).await;

        let (status, Json(body)) =
            create_mission(State(state.clone()), Json(mission_request(vec![drone.id])))
                .await
                .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.mission.description.as_deref(), Some("fence line"));
        assert_eq!(body.mission.location, Some(GeoPoint::new(-122.41, 37.77)));
        assert!(state.registry.is_scheduled(body.mission.id).await);
        let db = state.store.lock().await;
        assert_eq!(db::fetch_drone(&db, drone.id).unwrap().unwrap().status, DroneStatus::Assigned);
        assert!(db::fetch_mission(&db, body.mission.id).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn create_mission_rejects_busy_drones() {
        let state = state();
        let drone = add_drone(&state, "SN-1", DroneStatus::Charging).await;

        let err = create_mission(State(state.clone()), Json(mission_request(vec![drone.id])))
            .await
            .unwrap_err();

        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(state.registry.scheduled().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn create_mission_rejects_bad_recurrence_without_writing() {
        let state = state();
        let drone = add_drone(&state, "SN-1", DroneStatus::Available).await;
        let mut request = mission_request(vec![drone.id]);
        request.mission_type = Some(MissionType::Recurring);
        request.recurrence_rule =
            Some(RecurrenceRule { frequency: "bogus".to_string(), interval: 1 });

        let err = create_mission(State(state.clone()), Json(request)).await.unwrap_err();

        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("Invalid recurrence frequency"));
        let db = state.store.lock().await;
        assert!(db::query_missions(&db, &MissionFilter::default()).unwrap().is_empty());
        assert_eq!(db::fetch_drone(&db, drone.id).unwrap().unwrap().status, DroneStatus::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_abort_releases_drones_and_cancels_job() {
        let state = state();
        let drone = add_drone(&state, "SN-1", DroneStatus::Available).await;
        let (_, Json(created)) =
            create_mission(State(state.clone()), Json(mission_request(vec![drone.id])))
                .await
                .unwrap();
        let id = created.mission.id;

        let Json(updated) = update_mission_status(
            State(state.clone()),
            Path(id.0),
            Json(UpdateMissionStatusRequest { status: MissionStatus::Aborted }),
        )
        .await
        .unwrap();

        assert_eq!(updated.mission.status, MissionStatus::Aborted);
        assert!(!state.registry.is_scheduled(id).await);
        let db = state.store.lock().await;
        assert_eq!(db::fetch_drone(&db, drone.id).unwrap().unwrap().status, DroneStatus::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_status_cannot_move_backwards() {
        let state = state();
        let (_, Json(created)) =
            create_mission(State(state.clone()), Json(mission_request(vec![]))).await.unwrap();
        let id = created.mission.id;

        let Json(done) = patch_status(&state, id, MissionStatus::Completed).await.unwrap();
        assert_eq!(done.mission.status, MissionStatus::Completed);
        let err = patch_status(&state, id, MissionStatus::Scheduled).await.unwrap_err();

        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_mission_is_not_restored_after_restart() {
        let state = state();
        let (_, Json(cancelled)) =
            create_mission(State(state.clone()), Json(mission_request(vec![]))).await.unwrap();
        let (_, Json(pending)) =
            create_mission(State(state.clone()), Json(mission_request(vec![]))).await.unwrap();

        let Json(response) =
            cancel_mission(State(state.clone()), Path(cancelled.mission.id.0)).await.unwrap();
        assert!(response.was_scheduled);

        let registry = restarted(&state).await;
        assert!(!registry.is_scheduled(cancelled.mission.id).await);
        assert!(registry.is_scheduled(pending.mission.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_of_unknown_mission_is_not_found() {
        let state = state();
        let err = cancel_mission(State(state), Path(Uuid::new_v4())).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_recurring_mission_is_not_restored_after_restart() {
        let state = state();
        let (_, Json(created)) =
            create_mission(State(state.clone()), Json(recurring_request(vec![]))).await.unwrap();
        let id = created.mission.id;

        let Json(aborted) = patch_status(&state, id, MissionStatus::Aborted).await.unwrap();
        assert_eq!(aborted.mission.status, MissionStatus::Aborted);

        let registry = restarted(&state).await;
        assert!(!registry.is_scheduled(id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_recurring_mission_can_still_be_stopped() {
        let state = state();
        let drone = add_drone(&state, "SN-1", DroneStatus::Available).await;
        let (_, Json(created)) =
            create_mission(State(state.clone()), Json(recurring_request(vec![drone.id])))
                .await
                .unwrap();
        let id = created.mission.id;

        // The series rests in the status its last occurrence ended with.
        {
            let db = state.store.lock().await;
            let mut mission = db::fetch_mission(&db, id).unwrap().unwrap();
            assert!(mission.transition(MissionStatus::Completed));
            db::upsert_mission(&db, &mission).unwrap();
        }
        assert!(state.registry.is_scheduled(id).await);

        let Json(stopped) = patch_status(&state, id, MissionStatus::Aborted).await.unwrap();
        assert_eq!(stopped.message, "Recurring mission stopped");
        assert_eq!(stopped.mission.status, MissionStatus::Completed);
        assert!(!state.registry.is_scheduled(id).await);
        assert!(!restarted(&state).await.is_scheduled(id).await);
        let db = state.store.lock().await;
        assert_eq!(db::fetch_drone(&db, drone.id).unwrap().unwrap().status, DroneStatus::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_one_time_mission_still_rejects_terminal_status() {
        let state = state();
        let (_, Json(created)) =
            create_mission(State(state.clone()), Json(mission_request(vec![]))).await.unwrap();
        let id = created.mission.id;

        let Json(done) = patch_status(&state, id, MissionStatus::Completed).await.unwrap();
        assert_eq!(done.message, "Mission status updated");
        let err = patch_status(&state, id, MissionStatus::Aborted).await.unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test(start_paused = true)]
    async fn create_mission_rejects_out_of_range_coordinates() {
        let state = state();
        let mut request = mission_request(vec![]);
        request.location = GeoPoint::new(-200.0, 37.77);

        let err = create_mission(State(state.clone()), Json(request)).await.unwrap_err();

        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("Coordinates"));
        assert!(state.registry.scheduled().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missions_list_in_pages() {
        let state = state();
        for _ in 0..3 {
            let (status, _) =
                create_mission(State(state.clone()), Json(mission_request(vec![]))).await.unwrap();
            assert_eq!(status, StatusCode::CREATED);
        }

        let query = MissionQuery { page: Some(2), limit: Some(2), ..MissionQuery::default() };
        let Json(listed) = list_missions(State(state.clone()), Query(query)).await.unwrap();

        assert_eq!(listed.missions.len(), 1);
        assert_eq!(listed.pagination.current_page, 2);
        assert_eq!(listed.pagination.total_pages, 2);
        assert_eq!(listed.pagination.total, 3);
    }

    #[tokio::test]
    async fn page_bounds_are_checked() {
        let state = state();
        for (page, limit) in [(Some(0), None), (None, Some(0)), (None, Some(101))] {
            let query = DroneQuery { page, limit, ..DroneQuery::default() };
            let err = list_drones(State(state.clone()), Query(query)).await.unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
        }

        let Json(empty) =
            list_drones(State(state), Query(DroneQuery::default())).await.unwrap();
        assert!(empty.drones.is_empty());
        assert_eq!(empty.pagination.current_page, 1);
        assert_eq!(empty.pagination.total_pages, 0);
    }

    #[tokio::test]
    async fn drone_location_follows_status_updates() {
        let state = state();
        let (status, Json(drone)) =
            create_drone(State(state.clone()), Json(drone_request("SN-3"))).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(drone.current_location, GeoPoint::default());

        let serviced = Utc::now();
        let Json(moved) = update_drone_status(
            State(state.clone()),
            Path(drone.id.0),
            Json(UpdateDroneRequest {
                status: Some(DroneStatus::Charging),
                battery_level: None,
                location: Some(GeoPoint::new(2.35, 48.85)),
                last_maintenance: Some(serviced),
            }),
        )
        .await
        .unwrap();

        assert_eq!(moved.current_location, GeoPoint::new(2.35, 48.85));
        assert_eq!(moved.status, DroneStatus::Charging);
        let db = state.store.lock().await;
        let stored = db::fetch_drone(&db, drone.id).unwrap().unwrap();
        assert_eq!(stored.current_location, GeoPoint::new(2.35, 48.85));
        assert_eq!(
            stored.last_maintenance.map(|at| at.timestamp_millis()),
            Some(serviced.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn duplicate_serial_is_rejected() {
        let state = state();

        let (status, _) =
            create_drone(State(state.clone()), Json(drone_request("SN-7"))).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        let err = create_drone(State(state.clone()), Json(drone_request("SN-7"))).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn battery_above_hundred_is_rejected() {
        let state = state();
        let request = CreateDroneRequest { battery_level: Some(140), ..drone_request("SN-8") };
        let err = create_drone(State(state), Json(request)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
