/**
 * HTTP API - Inspection and configuration surface of the presence kernel
 *
 * ROLE:
 * Read the live pipeline state, edit zones/tracking/timings, and push
 * hardware commands to the sensor.
 *
 * ROUTES:
 * - GET  /health, /system/health
 * - GET  /state, /zones
 * - PUT  /zones/{index}, /tracking, /endpoints/{index}/timing
 * - POST /sensor/mode, /sensor/bluetooth, /sensor/restart,
 *        /sensor/factory-reset, /sensor/range
 *
 * SECURITY:
 * When PRESENCE_API_KEY is set, every route except /health* requires a
 * matching x-api-key header.
 */

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::command::{CommandChannel, CommandError};
use crate::health::{HealthTracker, KernelHealth};
use crate::models::{EndpointTiming, TrackingMode, Zone, MAX_ZONES};
use crate::sensor::RangeLimit;
use crate::state::{ConfigError, PipelineSnapshot, SensorState, Shared};

#[derive(Clone)]
pub struct AppState {
    pub sensor: Shared<SensorState>,
    pub commands: Arc<CommandChannel>,
    pub health_tracker: HealthTracker,
    /// Expected x-api-key value; `None` leaves the API open.
    pub api_key: Option<Arc<str>>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/state", get(get_state))
        .route("/zones", get(get_zones))
        .route("/zones/{index}", put(put_zone))
        .route("/tracking", put(put_tracking))
        .route("/endpoints/{index}/timing", put(put_endpoint_timing))
        .route("/sensor/mode", post(post_sensor_mode))
        .route("/sensor/bluetooth", post(post_bluetooth))
        .route("/sensor/restart", post(post_restart))
        .route("/sensor/factory-reset", post(post_factory_reset))
        .route("/sensor/range", post(post_range))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    if req.uri().path().starts_with("/health") {
        return Ok(next.run(req).await);
    }
    let Some(expected) = app.api_key.as_deref() else {
        return Ok(next.run(req).await);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);
    if !ok {
        tracing::warn!(path = %req.uri().path(), "rejected request without valid api key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

/// Error body shared by all handlers.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "ok": false, "error": self.1 }))).into_response()
    }
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        ApiError(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    }
}

impl From<CommandError> for ApiError {
    fn from(e: CommandError) -> Self {
        let code = match e {
            CommandError::PayloadTooLarge { .. } => StatusCode::BAD_REQUEST,
            CommandError::PauseTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            CommandError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        };
        ApiError(code, e.to_string())
    }
}

fn done() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health())
}

// GET /state
async fn get_state(State(app): State<AppState>) -> Json<PipelineSnapshot> {
    Json(app.sensor.lock().snapshot())
}

// GET /zones
async fn get_zones(State(app): State<AppState>) -> Json<[Zone; MAX_ZONES]> {
    Json(app.sensor.lock().zones())
}

// PUT /zones/{index} (0-based)
async fn put_zone(
    State(app): State<AppState>,
    Path(index): Path<usize>,
    Json(zone): Json<Zone>,
) -> Result<Json<serde_json::Value>, ApiError> {
    app.sensor.lock().set_zone(index, zone)?;
    tracing::info!(index, enabled = zone.enabled, "zone updated");
    Ok(done())
}

#[derive(Debug, Deserialize)]
struct TrackingUpdate {
    enabled: Option<bool>,
    mode: Option<TrackingMode>,
    publish_detail: Option<bool>,
}

// PUT /tracking (partial update)
async fn put_tracking(
    State(app): State<AppState>,
    Json(update): Json<TrackingUpdate>,
) -> Json<crate::models::TrackingPolicy> {
    let mut sensor = app.sensor.lock();
    if let Some(enabled) = update.enabled {
        sensor.set_enabled(enabled);
    }
    if let Some(mode) = update.mode {
        sensor.set_tracking_mode(mode);
    }
    if let Some(publish_detail) = update.publish_detail {
        sensor.set_publish_detail(publish_detail);
    }
    Json(sensor.policy())
}

// PUT /endpoints/{index}/timing
async fn put_endpoint_timing(
    State(app): State<AppState>,
    Path(index): Path<usize>,
    Json(timing): Json<EndpointTiming>,
) -> Result<Json<serde_json::Value>, ApiError> {
    app.sensor.lock().set_endpoint_timing(index, timing)?;
    Ok(done())
}

#[derive(Debug, Deserialize)]
struct ModeRequest {
    mode: TrackingMode,
}

// POST /sensor/mode
async fn post_sensor_mode(
    State(app): State<AppState>,
    Json(req): Json<ModeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    app.commands.set_tracking_mode(req.mode).await?;
    Ok(done())
}

#[derive(Debug, Deserialize)]
struct BluetoothRequest {
    enabled: bool,
}

// POST /sensor/bluetooth
async fn post_bluetooth(
    State(app): State<AppState>,
    Json(req): Json<BluetoothRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    app.commands.set_bluetooth(req.enabled).await?;
    Ok(done())
}

// POST /sensor/restart
async fn post_restart(State(app): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    app.commands.restart().await?;
    Ok(done())
}

// POST /sensor/factory-reset
async fn post_factory_reset(State(app): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    app.commands.factory_reset().await?;
    Ok(done())
}

// POST /sensor/range
async fn post_range(
    State(app): State<AppState>,
    Json(limit): Json<RangeLimit>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let region = limit.region();
    app.commands.set_region(region).await?;
    Ok(Json(json!({ "ok": true, "region": region })))
}
