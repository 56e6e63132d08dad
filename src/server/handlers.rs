use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError};
use std::time::Instant;

use crate::beacon::BeaconSlot;
use crate::device::EnrichedPosition;
use crate::geocode::CacheStats;
use crate::telemetry::{self, Record};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

// ─── /webhook ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct WebhookQuery {
    pub json: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<EnrichedPosition>,
}

impl WebhookResponse {
    fn ignored() -> Self {
        Self {
            status: "ignored",
            event_type: None,
            position: None,
        }
    }
}

/// Traccar event forwarding posts the payload as a JSON body.
pub async fn webhook_post(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let payload: Record = serde_json::from_slice(&body)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid JSON payload: {}", e)))?;
    dispatch(state, payload).await
}

/// Position forwarding may instead send the payload in a `json` query parameter.
pub async fn webhook_get(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WebhookQuery>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let Some(raw) = params.json.filter(|j| !j.trim().is_empty()) else {
        tracing::debug!("GET /webhook with no json parameter");
        return Ok(Json(WebhookResponse::ignored()));
    };
    let payload: Record = serde_json::from_str(&raw)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid json parameter: {}", e)))?;
    dispatch(state, payload).await
}

async fn dispatch(state: Arc<AppState>, payload: Record) -> Result<Json<WebhookResponse>, ApiError> {
    let start = Instant::now();

    let event_type = telemetry::object(&payload, "event")
        .and_then(|e| telemetry::string(e, "type"))
        .map(str::to_string);
    match &event_type {
        Some(t) => tracing::info!("Processing webhook event type: {}", t),
        None => tracing::info!("Processing webhook position update"),
    }

    let Some(device_id) = extract_device_id(&payload) else {
        tracing::debug!("No device ID in webhook payload");
        return Ok(Json(WebhookResponse::ignored()));
    };

    let enricher = state.devices.get(&device_id).cloned().ok_or_else(|| {
        api_error(StatusCode::NOT_FOUND, format!("Device {} is not configured", device_id))
    })?;

    let position = match telemetry::object(&payload, "position").cloned() {
        Some(position) => {
            // Geocoding blocks on the rate limiter; keep it off the async workers.
            let enriched = tokio::task::spawn_blocking(move || {
                let mut enricher = enricher.lock().unwrap_or_else(PoisonError::into_inner);
                enricher.enrich(&position)
            })
            .await
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
            Some(enriched)
        }
        None => None,
    };

    tracing::info!(
        "webhook device={} address={} beacons={} ({:.1}ms)",
        device_id,
        position.as_ref().and_then(|p| p.address.as_deref()).unwrap_or("-"),
        position.as_ref().map_or(0, |p| p.beacons.len()),
        start.elapsed().as_secs_f64() * 1000.0,
    );

    Ok(Json(WebhookResponse {
        status: "ok",
        event_type,
        position,
    }))
}

/// Device id from `event.deviceId`, then top-level `deviceId`, then
/// `position.deviceId`.
pub fn extract_device_id(payload: &Record) -> Option<i64> {
    let from = |record: Option<&Record>| record.and_then(|r| telemetry::integer(r, "deviceId"));

    from(telemetry::object(payload, "event"))
        .or_else(|| from(Some(payload)))
        .or_else(|| from(telemetry::object(payload, "position")))
}

// ─── GET /api/devices ────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub device_id: i64,
    pub geocoding: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
    pub beacon_names: Vec<BeaconName>,
}

#[derive(Serialize)]
pub struct BeaconName {
    pub slot: BeaconSlot,
    pub name: String,
}

pub async fn device_list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DeviceSummary>>, ApiError> {
    let enrichers: Vec<_> = state.devices.values().cloned().collect();

    let mut devices = tokio::task::spawn_blocking(move || {
        enrichers
            .iter()
            .map(|enricher| {
                let enricher = enricher.lock().unwrap_or_else(PoisonError::into_inner);
                let cache = enricher.cache_stats();
                DeviceSummary {
                    device_id: enricher.device_id(),
                    geocoding: cache.is_some(),
                    cache,
                    beacon_names: enricher
                        .router()
                        .names()
                        .into_iter()
                        .map(|(slot, name)| BeaconName { slot, name })
                        .collect(),
                }
            })
            .collect::<Vec<_>>()
    })
    .await
    .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    devices.sort_by_key(|d| d.device_id);
    Ok(Json(devices))
}

// ─── DELETE /api/devices/{id}/cache ──────────────────────────────

pub async fn clear_device_cache(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let enricher = state.devices.get(&device_id).cloned().ok_or_else(|| {
        api_error(StatusCode::NOT_FOUND, format!("Device {} is not configured", device_id))
    })?;

    tokio::task::spawn_blocking(move || {
        enricher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear_cache();
    })
    .await
    .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    tracing::info!("Cleared address cache for device {}", device_id);
    Ok(StatusCode::NO_CONTENT)
}
