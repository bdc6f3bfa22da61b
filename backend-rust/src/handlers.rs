//! HTTP surface for the Drone Ops service.
//!
//! Every response uses the `{status: "success"|"error", ...}` envelope.
//! Role gates follow the viewer<analyst<operator<supervisor<admin ladder;
//! armed-gated endpoints additionally consult the live policy state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::authz::{AuthEngine, Identity, Role};
use crate::error::OpsError;
use crate::geolocate::Observation;
use crate::model::{ActionStatus, ApprovalDecision, IncidentStatus, SessionMode, Severity};
use crate::policy::PolicyState;
use crate::service::DroneOpsService;

// ─── Shared state ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DroneOpsService>,
    pub auth: Arc<AuthEngine>,
}

// Global startup time (for uptime reporting)
static STARTUP_MS: AtomicU64 = AtomicU64::new(0);

pub fn mark_startup() {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    STARTUP_MS.store(now_ms, Ordering::Relaxed);
}

// ─── Error envelope ───────────────────────────────────────────────────────────

pub enum ApiError {
    BadRequest(String),
    Forbidden {
        message: String,
        required_role: Option<Role>,
        current_role: Option<Role>,
        policy: Option<PolicyState>,
    },
    NotFound(String),
    Internal(String),
}

impl From<OpsError> for ApiError {
    fn from(err: OpsError) -> Self {
        match err {
            OpsError::Validation(msg) => Self::BadRequest(msg),
            OpsError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            OpsError::NotArmed => Self::Forbidden {
                message: "Action plane is not armed".to_string(),
                required_role: None,
                current_role: None,
                policy: None,
            },
            OpsError::InsufficientApprovals { approved, required } => {
                Self::BadRequest(format!("Insufficient approvals ({approved}/{required})"))
            }
            OpsError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, body) = match self {
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({"status": "error", "message": message}),
            ),
            Self::Forbidden {
                message,
                required_role,
                current_role,
                policy,
            } => {
                let mut body = json!({"status": "error", "message": message});
                if let Some(required) = required_role {
                    body["required_role"] = json!(required);
                }
                if let Some(current) = current_role {
                    body["current_role"] = json!(current);
                }
                if let Some(policy) = policy {
                    body["policy"] = json!(policy);
                }
                (StatusCode::FORBIDDEN, body)
            }
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                json!({"status": "error", "message": message}),
            ),
            Self::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"status": "error", "message": message}),
            ),
        };
        (code, Json(body)).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

fn require_role(identity: &Identity, required: Role) -> Result<(), ApiError> {
    if identity.has_role(required) {
        return Ok(());
    }
    Err(ApiError::Forbidden {
        message: format!("{} role required", required.as_str()),
        required_role: Some(required),
        current_role: Some(identity.role),
        policy: None,
    })
}

fn require_armed(service: &DroneOpsService) -> Result<(), ApiError> {
    let policy = service.policy_state();
    if policy.armed {
        return Ok(());
    }
    Err(ApiError::Forbidden {
        message: "Action plane is not armed".to_string(),
        required_role: None,
        current_role: None,
        policy: Some(policy),
    })
}

fn clamp_limit(limit: Option<usize>, default: usize, max: usize) -> usize {
    limit.unwrap_or(default).clamp(1, max)
}

fn body_or_empty(body: Option<Json<Value>>) -> Value {
    body.map(|Json(v)| v).unwrap_or_else(|| json!({}))
}

fn optional_object(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| v.is_object()).cloned()
}

fn optional_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn optional_i64(value: Option<&Value>) -> Result<Option<i64>, ApiError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) if n.as_i64().is_some() => Ok(n.as_i64()),
        Some(Value::String(s)) if s.trim().parse::<i64>().is_ok() => {
            Ok(s.trim().parse::<i64>().ok())
        }
        Some(_) => Err(ApiError::BadRequest("id must be an integer".to_string())),
    }
}

fn ok(body: Value) -> Response {
    Json(body).into_response()
}

fn created(body: Value) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

// ─── Router ───────────────────────────────────────────────────────────────────

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/drone-ops/status", get(status))
        .route("/drone-ops/sessions", get(sessions_list))
        .route("/drone-ops/session/start", post(session_start))
        .route("/drone-ops/session/stop", post(session_stop))
        .route("/drone-ops/detections", get(detections_list))
        .route("/drone-ops/stream", get(stream))
        .route("/drone-ops/remote-id/decode", post(remote_id_decode))
        .route("/drone-ops/tracks", get(tracks_list))
        .route("/drone-ops/geolocate/estimate", post(geolocate_estimate))
        .route("/drone-ops/correlations", get(correlations_list))
        .route("/drone-ops/incidents", get(incidents_list).post(incidents_create))
        .route("/drone-ops/incidents/:id", get(incidents_get).put(incidents_update))
        .route("/drone-ops/incidents/:id/artifacts", post(incidents_add_artifact))
        .route("/drone-ops/actions/arm", post(actions_arm))
        .route("/drone-ops/actions/disarm", post(actions_disarm))
        .route("/drone-ops/actions/request", post(actions_request))
        .route("/drone-ops/actions/approve/:id", post(actions_approve))
        .route("/drone-ops/actions/execute/:id", post(actions_execute))
        .route("/drone-ops/actions/requests", get(actions_list))
        .route("/drone-ops/actions/requests/:id", get(actions_get))
        .route("/drone-ops/actions/audit", get(actions_audit))
        .route("/drone-ops/evidence/:incident_id/manifest", post(evidence_manifest_create))
        .route("/drone-ops/evidence/manifests/:id", get(evidence_manifest_get))
        .route("/drone-ops/evidence/:incident_id/manifests", get(evidence_manifest_list))
        .with_state(state)
}

// ─── Health ───────────────────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let startup = STARTUP_MS.load(Ordering::Relaxed);
    let uptime_secs = if startup > 0 { (now_ms - startup) / 1000 } else { 0 };
    let mode = std::env::var("DRONE_OPS_MODE").unwrap_or_else(|_| "local".into());
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": mode,
        "uptimeSecs": uptime_secs,
    }))
}

// ─── Status & sessions ────────────────────────────────────────────────────────

async fn status(State(state): State<AppState>, identity: Identity) -> ApiResult {
    require_role(&identity, Role::Viewer)?;
    Ok(ok(state.service.get_status().await))
}

#[derive(Deserialize)]
struct SessionsQuery {
    limit: Option<usize>,
    active_only: Option<String>,
}

async fn sessions_list(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<SessionsQuery>,
) -> ApiResult {
    require_role(&identity, Role::Viewer)?;
    let limit = clamp_limit(query.limit, 50, 500);
    let active_only = query
        .active_only
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false);
    let sessions = state.service.store().list_sessions(limit, active_only).await;
    Ok(ok(json!({"status": "success", "sessions": sessions})))
}

async fn session_start(
    State(state): State<AppState>,
    identity: Identity,
    body: Option<Json<Value>>,
) -> ApiResult {
    require_role(&identity, Role::Operator)?;
    let data = body_or_empty(body);

    let mode_text = data
        .get("mode")
        .and_then(Value::as_str)
        .unwrap_or("passive");
    let mode = SessionMode::parse(mode_text)
        .ok_or_else(|| ApiError::BadRequest("mode must be passive or active".to_string()))?;

    let session = state
        .service
        .start_session(
            mode,
            optional_string(data.get("label")),
            &identity.username,
            optional_object(data.get("metadata")),
        )
        .await;
    Ok(ok(json!({"status": "success", "session": session})))
}

async fn session_stop(
    State(state): State<AppState>,
    identity: Identity,
    body: Option<Json<Value>>,
) -> ApiResult {
    require_role(&identity, Role::Operator)?;
    let data = body_or_empty(body);

    let session_id = optional_i64(data.get("id"))?;
    let summary = optional_object(data.get("summary"));

    match state
        .service
        .stop_session(&identity.username, session_id, summary)
        .await
    {
        Some(session) => Ok(ok(json!({"status": "success", "session": session}))),
        None => Err(ApiError::NotFound("No active session found".to_string())),
    }
}

// ─── Detections, stream, tracks ───────────────────────────────────────────────

#[derive(Deserialize)]
struct DetectionsQuery {
    session_id: Option<i64>,
    source: Option<String>,
    min_confidence: Option<f64>,
    limit: Option<usize>,
}

async fn detections_list(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<DetectionsQuery>,
) -> ApiResult {
    require_role(&identity, Role::Viewer)?;
    let rows = state
        .service
        .get_detections(
            query.session_id,
            query.source.as_deref(),
            query.min_confidence.unwrap_or(0.0),
            clamp_limit(query.limit, 200, 5000),
        )
        .await;
    Ok(ok(json!({"status": "success", "count": rows.len(), "detections": rows})))
}

async fn stream(State(state): State<AppState>, identity: Identity) -> ApiResult {
    require_role(&identity, Role::Viewer)?;

    let subscription = state.service.subscribe();
    let events = futures::stream::unfold(subscription, |mut subscription| async move {
        let envelope = subscription.next_event(Duration::from_secs(1)).await;
        let event = Event::default()
            .event(envelope.event_type.clone())
            .json_data(&envelope)
            .ok()?;
        Some((Ok::<_, std::convert::Infallible>(event), subscription))
    });

    let headers = [
        (header::CACHE_CONTROL, "no-cache"),
        (HeaderName::from_static("x-accel-buffering"), "no"),
    ];
    Ok((headers, Sse::new(events)).into_response())
}

#[derive(Deserialize)]
struct TracksQuery {
    detection_id: Option<i64>,
    identifier: Option<String>,
    limit: Option<usize>,
}

async fn tracks_list(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<TracksQuery>,
) -> ApiResult {
    require_role(&identity, Role::Viewer)?;
    let rows = state
        .service
        .get_tracks(
            query.detection_id,
            query.identifier.as_deref(),
            clamp_limit(query.limit, 1000, 5000),
        )
        .await;
    Ok(ok(json!({"status": "success", "count": rows.len(), "tracks": rows})))
}

// ─── Remote ID, geolocation, correlations ─────────────────────────────────────

async fn remote_id_decode(
    State(state): State<AppState>,
    identity: Identity,
    body: Option<Json<Value>>,
) -> ApiResult {
    require_role(&identity, Role::Analyst)?;
    let data = body_or_empty(body);
    let payload = data
        .get("payload")
        .filter(|p| !p.is_null())
        .cloned()
        .ok_or_else(|| ApiError::BadRequest("payload is required".to_string()))?;

    let decoded = state.service.decode_remote_id(payload);
    Ok(ok(json!({"status": "success", "decoded": decoded})))
}

async fn geolocate_estimate(
    State(state): State<AppState>,
    identity: Identity,
    body: Option<Json<Value>>,
) -> ApiResult {
    require_role(&identity, Role::Analyst)?;
    let data = body_or_empty(body);

    let raw = match data.get("observations") {
        Some(Value::Array(items)) if items.len() >= 3 => items.clone(),
        _ => {
            return Err(ApiError::BadRequest(
                "at least 3 observations are required".to_string(),
            ))
        }
    };
    let observations: Vec<Observation> = raw
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<_, _>>()
        .map_err(|_| ApiError::BadRequest("observations must include lat and lon".to_string()))?;

    let environment = data
        .get("environment")
        .and_then(Value::as_str)
        .unwrap_or("outdoor");

    let location = state.service.estimate_geolocation(&observations, environment);
    Ok(ok(json!({"status": "success", "location": location})))
}

#[derive(Deserialize)]
struct CorrelationsQuery {
    min_confidence: Option<f64>,
    refresh: Option<String>,
}

async fn correlations_list(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<CorrelationsQuery>,
) -> ApiResult {
    require_role(&identity, Role::Analyst)?;
    let min_confidence = query.min_confidence.unwrap_or(0.6);
    let refresh = query
        .refresh
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(true);

    let rows = if refresh {
        state.service.refresh_correlations(min_confidence).await
    } else {
        state
            .service
            .store()
            .list_correlations(min_confidence, 200)
            .await
    };
    Ok(ok(json!({"status": "success", "count": rows.len(), "correlations": rows})))
}

// ─── Incidents ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct IncidentsQuery {
    status: Option<String>,
    limit: Option<usize>,
}

async fn incidents_list(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<IncidentsQuery>,
) -> ApiResult {
    require_role(&identity, Role::Viewer)?;
    let status = match query.status.as_deref() {
        Some(text) => Some(IncidentStatus::parse(text).ok_or_else(|| {
            ApiError::BadRequest("status must be open, monitoring, contained, or closed".to_string())
        })?),
        None => None,
    };
    let rows = state
        .service
        .store()
        .list_incidents(status, clamp_limit(query.limit, 100, 1000))
        .await;
    Ok(ok(json!({"status": "success", "count": rows.len(), "incidents": rows})))
}

async fn incidents_create(
    State(state): State<AppState>,
    identity: Identity,
    body: Option<Json<Value>>,
) -> ApiResult {
    require_role(&identity, Role::Operator)?;
    let data = body_or_empty(body);

    let title = data
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    if title.is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }

    let severity_text = data
        .get("severity")
        .and_then(Value::as_str)
        .unwrap_or("medium");
    let severity = Severity::parse(severity_text).ok_or_else(|| {
        ApiError::BadRequest("severity must be low, medium, high, or critical".to_string())
    })?;

    let incident = state
        .service
        .create_incident(
            title,
            severity,
            &identity.username,
            optional_string(data.get("summary")),
            optional_object(data.get("metadata")),
        )
        .await?;
    Ok(created(json!({"status": "success", "incident": incident})))
}

async fn incidents_get(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> ApiResult {
    require_role(&identity, Role::Viewer)?;
    match state.service.store().get_incident(id).await {
        Some(incident) => Ok(ok(json!({"status": "success", "incident": incident}))),
        None => Err(ApiError::NotFound("Incident not found".to_string())),
    }
}

async fn incidents_update(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
    body: Option<Json<Value>>,
) -> ApiResult {
    require_role(&identity, Role::Operator)?;
    let data = body_or_empty(body);

    let status = match data.get("status").and_then(Value::as_str) {
        Some(text) => Some(IncidentStatus::parse(text).ok_or_else(|| {
            ApiError::BadRequest("status must be open, monitoring, contained, or closed".to_string())
        })?),
        None => None,
    };
    let severity = match data.get("severity").and_then(Value::as_str) {
        Some(text) => Some(Severity::parse(text).ok_or_else(|| {
            ApiError::BadRequest("severity must be low, medium, high, or critical".to_string())
        })?),
        None => None,
    };

    let incident = state
        .service
        .update_incident(
            id,
            status,
            severity,
            optional_string(data.get("summary")),
            optional_object(data.get("metadata")),
        )
        .await?;
    Ok(ok(json!({"status": "success", "incident": incident})))
}

async fn incidents_add_artifact(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
    body: Option<Json<Value>>,
) -> ApiResult {
    require_role(&identity, Role::Operator)?;
    if state.service.store().get_incident(id).await.is_none() {
        return Err(ApiError::NotFound("Incident not found".to_string()));
    }

    let data = body_or_empty(body);
    let artifact_type = data
        .get("artifact_type")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    let artifact_ref = data
        .get("artifact_ref")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    if artifact_type.is_empty() || artifact_ref.is_empty() {
        return Err(ApiError::BadRequest(
            "artifact_type and artifact_ref are required".to_string(),
        ));
    }

    let artifact = state
        .service
        .add_incident_artifact(
            id,
            artifact_type,
            artifact_ref,
            &identity.username,
            optional_object(data.get("metadata")),
        )
        .await?;
    Ok(created(json!({"status": "success", "artifact": artifact})))
}

// ─── Actions ──────────────────────────────────────────────────────────────────

async fn actions_arm(
    State(state): State<AppState>,
    identity: Identity,
    body: Option<Json<Value>>,
) -> ApiResult {
    require_role(&identity, Role::Operator)?;
    let data = body_or_empty(body);

    let reason = data
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    if reason.is_empty() {
        return Err(ApiError::BadRequest("reason is required".to_string()));
    }

    let incident_id = optional_i64(data.get("incident_id"))
        .ok()
        .flatten()
        .ok_or_else(|| {
            ApiError::BadRequest("incident_id is required and must be an integer".to_string())
        })?;
    if state.service.store().get_incident(incident_id).await.is_none() {
        return Err(ApiError::NotFound("Incident not found".to_string()));
    }

    // Lenient: a missing or non-integer duration falls back to the default
    let duration_seconds = data.get("duration_seconds").and_then(Value::as_i64);

    let policy = state
        .service
        .arm_actions(&identity.username, reason, incident_id, duration_seconds);
    Ok(ok(json!({"status": "success", "policy": policy})))
}

async fn actions_disarm(
    State(state): State<AppState>,
    identity: Identity,
    body: Option<Json<Value>>,
) -> ApiResult {
    require_role(&identity, Role::Operator)?;
    let data = body_or_empty(body);
    let reason = data
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|r| !r.is_empty());

    let policy = state.service.disarm_actions(&identity.username, reason);
    Ok(ok(json!({"status": "success", "policy": policy})))
}

async fn actions_request(
    State(state): State<AppState>,
    identity: Identity,
    body: Option<Json<Value>>,
) -> ApiResult {
    require_role(&identity, Role::Operator)?;
    let data = body_or_empty(body);

    let incident_id = optional_i64(data.get("incident_id"))
        .ok()
        .flatten()
        .ok_or_else(|| ApiError::BadRequest("incident_id is required".to_string()))?;
    if state.service.store().get_incident(incident_id).await.is_none() {
        return Err(ApiError::NotFound("Incident not found".to_string()));
    }

    let action_type = data
        .get("action_type")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    if action_type.is_empty() {
        return Err(ApiError::BadRequest("action_type is required".to_string()));
    }

    let request = state
        .service
        .request_action(
            incident_id,
            action_type,
            &identity.username,
            optional_object(data.get("payload")),
        )
        .await?;
    Ok(created(json!({"status": "success", "request": request})))
}

async fn actions_approve(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
    body: Option<Json<Value>>,
) -> ApiResult {
    require_role(&identity, Role::Supervisor)?;
    let data = body_or_empty(body);

    let decision_text = data
        .get("decision")
        .and_then(Value::as_str)
        .unwrap_or("approved");
    let decision = ApprovalDecision::parse(decision_text).ok_or_else(|| {
        ApiError::BadRequest("decision must be approved or rejected".to_string())
    })?;

    let request = state
        .service
        .approve_action(
            id,
            &identity.username,
            decision,
            optional_string(data.get("notes")),
        )
        .await?;
    Ok(ok(json!({"status": "success", "request": request})))
}

async fn actions_execute(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> ApiResult {
    require_role(&identity, Role::Operator)?;
    require_armed(&state.service)?;

    let request = state.service.execute_action(id, &identity.username).await?;
    Ok(ok(json!({"status": "success", "request": request})))
}

#[derive(Deserialize)]
struct ActionsQuery {
    incident_id: Option<i64>,
    status: Option<String>,
    limit: Option<usize>,
}

async fn actions_list(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<ActionsQuery>,
) -> ApiResult {
    require_role(&identity, Role::Viewer)?;
    let status = match query.status.as_deref() {
        Some(text) => Some(ActionStatus::parse(text).ok_or_else(|| {
            ApiError::BadRequest(
                "status must be pending, approved, rejected, or executed".to_string(),
            )
        })?),
        None => None,
    };
    let rows = state
        .service
        .store()
        .list_action_requests(query.incident_id, status, clamp_limit(query.limit, 100, 1000))
        .await;
    Ok(ok(json!({"status": "success", "count": rows.len(), "requests": rows})))
}

async fn actions_get(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> ApiResult {
    require_role(&identity, Role::Viewer)?;
    match state.service.store().get_action_request(id).await {
        Some(request) => Ok(ok(json!({"status": "success", "request": request}))),
        None => Err(ApiError::NotFound("Action request not found".to_string())),
    }
}

#[derive(Deserialize)]
struct AuditQuery {
    request_id: Option<i64>,
    limit: Option<usize>,
}

async fn actions_audit(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<AuditQuery>,
) -> ApiResult {
    require_role(&identity, Role::Viewer)?;
    let rows = state
        .service
        .store()
        .list_audit_entries(query.request_id, clamp_limit(query.limit, 200, 2000))
        .await;
    Ok(ok(json!({"status": "success", "count": rows.len(), "events": rows})))
}

// ─── Evidence ─────────────────────────────────────────────────────────────────

async fn evidence_manifest_create(
    State(state): State<AppState>,
    identity: Identity,
    Path(incident_id): Path<i64>,
    body: Option<Json<Value>>,
) -> ApiResult {
    require_role(&identity, Role::Analyst)?;
    if state.service.store().get_incident(incident_id).await.is_none() {
        return Err(ApiError::NotFound("Incident not found".to_string()));
    }

    let data = body_or_empty(body);
    let signature = optional_string(data.get("signature"));

    match state
        .service
        .generate_evidence_manifest(incident_id, &identity.username, signature)
        .await
    {
        Some(manifest) => Ok(created(json!({"status": "success", "manifest": manifest}))),
        None => Err(ApiError::Internal("Failed to generate manifest".to_string())),
    }
}

async fn evidence_manifest_get(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> ApiResult {
    require_role(&identity, Role::Viewer)?;
    match state.service.store().get_manifest(id).await {
        Some(manifest) => Ok(ok(json!({"status": "success", "manifest": manifest}))),
        None => Err(ApiError::NotFound("Manifest not found".to_string())),
    }
}

#[derive(Deserialize)]
struct ManifestsQuery {
    limit: Option<usize>,
}

async fn evidence_manifest_list(
    State(state): State<AppState>,
    identity: Identity,
    Path(incident_id): Path<i64>,
    Query(query): Query<ManifestsQuery>,
) -> ApiResult {
    require_role(&identity, Role::Viewer)?;
    let rows = state
        .service
        .store()
        .list_manifests(incident_id, clamp_limit(query.limit, 50, 500))
        .await;
    Ok(ok(json!({"status": "success", "count": rows.len(), "manifests": rows})))
}
