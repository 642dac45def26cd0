//! HTTP API
//!
//! JSON routes for the operator dashboard and for external event pollers.
//! Operations answer `{success, message}`; failures carry
//! `{success: false, message, kind}` with a status code chosen from the
//! error kind.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use engravekit_core::{Error, ErrorKind};
use engravekit_pipeline::{EngraverService, ManualPlacement, SubscriptionEvent};
use engravekit_settings::EngravingArea;

type AppState = Arc<EngraverService>;

/// Most recent events returned by `GET /api/events`
const RECENT_EVENTS: usize = 100;

/// Error returned by handlers
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::DuplicateRequest
            | ErrorKind::NoSpaceAvailable
            | ErrorKind::HardwareBusy
            | ErrorKind::HardwareAlarm
            | ErrorKind::EmergencyStopped => StatusCode::CONFLICT,
            ErrorKind::CompileError => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::HardwareTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::HardwareDisconnected => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => {
                tracing::error!("request failed: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "success": false,
            "message": self.0.to_string(),
            "kind": kind,
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn ok(message: impl Into<String>) -> Json<Value> {
    Json(json!({ "success": true, "message": message.into() }))
}

pub fn router(service: Arc<EngraverService>) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/work_area", get(get_work_area).post(update_work_area))
        .route("/api/fonts", get(fonts))
        // Jobs
        .route("/api/queue", get(queue))
        .route("/api/jobs", get(jobs))
        .route("/api/jobs/:id/redo", post(redo))
        .route("/api/test_engrave", post(test_engrave))
        // Board
        .route("/api/placements", get(placements))
        .route("/api/add_placement", post(add_placement))
        .route("/api/clear_placements", post(clear_placements))
        .route("/api/reset_board", post(reset_board))
        // Laser
        .route("/api/laser_command", post(laser_command))
        .route("/api/laser_home", post(laser_home))
        .route("/api/laser_unlock", post(laser_unlock))
        .route("/api/laser_stop", post(laser_stop))
        .route("/api/laser_reconnect", post(laser_reconnect))
        // Event intake
        .route("/api/event_monitor_toggle", post(toggle_event_monitor))
        .route("/api/events", get(recent_events).post(submit_event))
        .with_state(service)
}

async fn status(State(service): State<AppState>) -> Json<Value> {
    Json(json!(service.status()))
}

async fn get_config(State(service): State<AppState>) -> Json<Value> {
    Json(json!(*service.config()))
}

async fn update_config(
    State(service): State<AppState>,
    Json(patch): Json<Value>,
) -> ApiResult<Json<Value>> {
    service.update_config(&patch)?;
    Ok(ok("Configuration updated"))
}

async fn get_work_area(State(service): State<AppState>) -> Json<Value> {
    Json(json!(*service.work_area()))
}

async fn update_work_area(
    State(service): State<AppState>,
    Json(area): Json<EngravingArea>,
) -> ApiResult<Json<Value>> {
    let area = service.update_work_area(area)?;
    Ok(ok(format!(
        "Engraving area set to {}x{}mm",
        area.active_width_mm, area.active_height_mm
    )))
}

async fn fonts(State(service): State<AppState>) -> Json<Value> {
    Json(json!(service.fonts()))
}

async fn queue(State(service): State<AppState>) -> Json<Value> {
    Json(json!({ "queue": service.queue() }))
}

async fn jobs(State(service): State<AppState>) -> Json<Value> {
    Json(json!({ "jobs": service.jobs() }))
}

async fn redo(State(service): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let job = service.redo(&id)?;
    Ok(Json(json!({
        "success": true,
        "message": format!("'{}' queued again", job.name),
        "id": job.id,
    })))
}

#[derive(Debug, Deserialize)]
struct TestEngraveBody {
    #[serde(default)]
    text: String,
}

async fn test_engrave(
    State(service): State<AppState>,
    Json(body): Json<TestEngraveBody>,
) -> ApiResult<Json<Value>> {
    let job = service.test_engrave(&body.text)?;
    Ok(Json(json!({
        "success": true,
        "message": format!("'{}' queued for engraving", job.name),
        "id": job.id,
    })))
}

async fn placements(State(service): State<AppState>) -> Json<Value> {
    Json(json!(service.placements()))
}

async fn add_placement(
    State(service): State<AppState>,
    Json(body): Json<ManualPlacement>,
) -> ApiResult<Json<Value>> {
    let record = service.add_placement(&body)?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Reserved '{}'", record.text),
        "id": record.id,
    })))
}

async fn clear_placements(State(service): State<AppState>) -> ApiResult<Json<Value>> {
    service.clear_placements()?;
    Ok(ok("Placements cleared"))
}

async fn reset_board(State(service): State<AppState>) -> ApiResult<Json<Value>> {
    let backup = service.reset_board()?;
    let message = match &backup {
        Some(path) => format!("Board reset, placements archived to {}", path.display()),
        None => "Board reset".to_string(),
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "backup": backup.map(|p| p.display().to_string()),
    })))
}

#[derive(Debug, Deserialize)]
struct CommandBody {
    #[serde(default)]
    command: String,
}

async fn laser_command(
    State(service): State<AppState>,
    Json(body): Json<CommandBody>,
) -> ApiResult<Json<Value>> {
    if body.command.trim().is_empty() {
        return Err(Error::validation("no command").into());
    }
    let response = service.laser_command(&body.command).await?;
    Ok(Json(json!({ "success": true, "response": response })))
}

async fn laser_home(State(service): State<AppState>) -> ApiResult<Json<Value>> {
    service.home().await?;
    Ok(ok("Homing complete"))
}

async fn laser_unlock(State(service): State<AppState>) -> ApiResult<Json<Value>> {
    service.unlock().await?;
    Ok(ok("Unlocked"))
}

async fn laser_stop(State(service): State<AppState>) -> ApiResult<Json<Value>> {
    let message = service.emergency_stop().await?;
    Ok(ok(message))
}

async fn laser_reconnect(State(service): State<AppState>) -> ApiResult<Json<Value>> {
    let state = service.reconnect().await?;
    Ok(ok(format!("Connected ({})", state)))
}

async fn toggle_event_monitor(State(service): State<AppState>) -> ApiResult<Json<Value>> {
    let running = service.toggle_event_monitor().await?;
    Ok(Json(json!({
        "success": true,
        "message": if running { "Event monitor started" } else { "Event monitor stopped" },
        "running": running,
    })))
}

async fn submit_event(
    State(service): State<AppState>,
    Json(event): Json<SubscriptionEvent>,
) -> ApiResult<Json<Value>> {
    service.submit_event(event)?;
    Ok(ok("Event accepted"))
}

async fn recent_events(State(service): State<AppState>) -> Json<Value> {
    let events: Vec<String> = service
        .recent_events(RECENT_EVENTS)
        .iter()
        .map(|e| e.description())
        .collect();
    Json(json!({ "events": events }))
}
