//! Stateful Drone Ops service: ingestion, policy, incidents, actions, and
//! evidence. One instance is shared process-wide behind an `Arc`; every
//! method is safe for concurrent callers. The only locks held inside the
//! service itself are the event-bus subscriber set and the policy state —
//! store calls are never made under either.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::warn;

use crate::correlation::{CoObservationCorrelator, CorrelationProvider, DeviceCache};
use crate::detector::detect_from_event;
use crate::error::{OpsError, OpsResult};
use crate::events::{EventBus, EventSubscription};
use crate::evidence;
use crate::geolocate::{GeoEstimator, LocationEstimate, Observation, WeightedCentroidEstimator};
use crate::model::{
    ActionRequest, ActionStatus, ApprovalDecision, Correlation, Detection, EvidenceManifest,
    Incident, IncidentArtifact, IncidentStatus, Session, SessionMode, Severity, TrackPoint,
};
use crate::policy::{PolicyEngine, PolicyState};
use crate::remote_id::{decode_remote_id_payload, RemoteIdPayload, RemoteIdRecord};
use crate::store::Store;

pub struct DroneOpsService {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    policy: PolicyEngine,
    devices: Arc<DeviceCache>,
    correlator: Arc<dyn CorrelationProvider>,
    estimator: Arc<dyn GeoEstimator>,
}

impl DroneOpsService {
    pub fn new(
        store: Arc<Store>,
        devices: Arc<DeviceCache>,
        correlator: Arc<dyn CorrelationProvider>,
        estimator: Arc<dyn GeoEstimator>,
    ) -> Self {
        Self {
            store,
            bus: Arc::new(EventBus::new()),
            policy: PolicyEngine::new(),
            devices,
            correlator,
            estimator,
        }
    }

    /// Service with the built-in collaborator implementations.
    pub fn with_defaults(store: Arc<Store>) -> Self {
        Self::new(
            store,
            Arc::new(DeviceCache::new()),
            Arc::new(CoObservationCorrelator::default()),
            Arc::new(WeightedCentroidEstimator),
        )
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn devices(&self) -> &Arc<DeviceCache> {
        &self.devices
    }

    // ── Streaming ─────────────────────────────────────────────────────────────

    pub fn subscribe(&self) -> EventSubscription {
        self.bus.subscribe()
    }

    fn emit(&self, event_type: &str, payload: Value) {
        self.bus.emit(event_type, payload);
    }

    // ── Policy / arming ───────────────────────────────────────────────────────

    pub fn policy_state(&self) -> PolicyState {
        self.policy.state()
    }

    pub fn arm_actions(
        &self,
        actor: &str,
        reason: &str,
        incident_id: i64,
        duration_seconds: Option<i64>,
    ) -> PolicyState {
        let state = self.policy.arm(actor, reason, incident_id, duration_seconds);
        self.emit(
            "policy_armed",
            json!({
                "actor": actor,
                "reason": reason,
                "incident_id": incident_id,
                "state": state,
            }),
        );
        state
    }

    pub fn disarm_actions(&self, actor: &str, reason: Option<&str>) -> PolicyState {
        let state = self.policy.disarm();
        self.emit(
            "policy_disarmed",
            json!({"actor": actor, "reason": reason, "state": state}),
        );
        state
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    /// Idempotent start: an already-active session is returned unchanged.
    pub async fn start_session(
        &self,
        mode: SessionMode,
        label: Option<String>,
        operator: &str,
        metadata: Option<Value>,
    ) -> Session {
        if let Some(active) = self.store.get_active_session().await {
            return active;
        }

        let session = self
            .store
            .create_session(mode, label, operator, metadata)
            .await;
        self.emit("session_started", json!({"session": session}));
        session
    }

    pub async fn stop_session(
        &self,
        operator: &str,
        session_id: Option<i64>,
        summary: Option<Value>,
    ) -> Option<Session> {
        let target_id = match session_id {
            Some(id) => id,
            None => self.store.get_active_session().await?.id,
        };

        let summary = match summary {
            Some(s) => s,
            None => {
                let detections = self
                    .store
                    .list_detections(Some(target_id), None, 0.0, 1000)
                    .await
                    .len();
                json!({
                    "operator": operator,
                    "stopped_at": Utc::now(),
                    "detections": detections,
                })
            }
        };

        let session = self.store.stop_session(target_id, Some(summary)).await.ok()?;
        self.emit("session_stopped", json!({"session": session}));
        Some(session)
    }

    pub async fn get_status(&self) -> Value {
        json!({
            "status": "success",
            "active_session": self.store.get_active_session().await,
            "policy": self.policy_state(),
            "counts": {
                "detections": self.store.list_detections(None, None, 0.0, 1000).await.len(),
                "incidents_open": self
                    .store
                    .list_incidents(Some(IncidentStatus::Open), 1000)
                    .await
                    .len(),
                "actions_pending": self
                    .store
                    .list_action_requests(None, Some(ActionStatus::Pending), 1000)
                    .await
                    .len(),
            },
        })
    }

    // ── Ingestion ─────────────────────────────────────────────────────────────

    /// Ingest a cross-mode sensor event and persist any resulting detections.
    /// A single detection's persistence failure is logged and skipped; it
    /// never poisons the remaining detections from the same event.
    pub async fn ingest_event(&self, mode: &str, event: &Value, event_type: Option<&str>) {
        let candidates = detect_from_event(mode, event, event_type);
        if candidates.is_empty() {
            return;
        }

        let session_id = self.store.get_active_session().await.map(|s| s.id);

        for candidate in candidates {
            let detection_id = match self
                .store
                .upsert_detection(
                    session_id,
                    &candidate.source,
                    &candidate.identifier,
                    Some(candidate.classification.clone()),
                    candidate.confidence,
                    candidate.payload.clone(),
                    candidate.remote_id.clone(),
                )
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    warn!("Ingest: skipping detection {}: {e}", candidate.identifier);
                    continue;
                }
            };

            let row = self.store.get_detection(detection_id).await;

            if let (Some(row), Some(track)) = (&row, &candidate.track) {
                if let Err(e) = self.store.add_track(row.id, track).await {
                    warn!("Ingest: track append failed for detection {}: {e}", row.id);
                }
            }

            if let Some(remote_id) = &candidate.remote_id {
                if let (Some(uas_id), Some(operator_id)) =
                    (&remote_id.uas_id, &remote_id.operator_id)
                {
                    let confidence = if remote_id.confidence > 0.0 {
                        remote_id.confidence
                    } else {
                        0.8
                    };
                    self.store
                        .add_correlation(
                            uas_id,
                            operator_id,
                            "remote_id_binding",
                            confidence,
                            json!({
                                "source": candidate.source,
                                "event_type": event_type,
                                "detection_id": row.as_ref().map(|r| r.id),
                            }),
                        )
                        .await;
                }
            }

            if let Some(row) = row {
                self.emit(
                    "detection",
                    json!({
                        "mode": mode,
                        "event_type": event_type,
                        "detection": row,
                    }),
                );
            }
        }
    }

    pub fn decode_remote_id(&self, payload: impl Into<RemoteIdPayload>) -> RemoteIdRecord {
        let decoded = decode_remote_id_payload(payload);
        self.emit("remote_id_decoded", json!({"decoded": decoded}));
        decoded
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub async fn get_detections(
        &self,
        session_id: Option<i64>,
        source: Option<&str>,
        min_confidence: f64,
        limit: usize,
    ) -> Vec<Detection> {
        self.store
            .list_detections(session_id, source, min_confidence, limit)
            .await
    }

    pub async fn get_tracks(
        &self,
        detection_id: Option<i64>,
        identifier: Option<&str>,
        limit: usize,
    ) -> Vec<TrackPoint> {
        self.store.list_tracks(detection_id, identifier, limit).await
    }

    pub fn estimate_geolocation(
        &self,
        observations: &[Observation],
        environment: &str,
    ) -> Option<LocationEstimate> {
        self.estimator.estimate(observations, environment)
    }

    /// Promote WiFi↔BT pairs to drone/operator correlations when one side is
    /// already a known drone detection, then return the deduplicated list.
    pub async fn refresh_correlations(&self, min_confidence: f64) -> Vec<Correlation> {
        let wifi_devices = self.devices.wifi_snapshot().await;
        let bt_devices = self.devices.bt_snapshot().await;

        let pairs = self
            .correlator
            .correlate(&wifi_devices, &bt_devices, min_confidence);

        let known_ids: HashSet<String> = self
            .store
            .list_detections(None, None, 0.5, 1000)
            .await
            .into_iter()
            .map(|d| d.identifier.to_uppercase())
            .collect();

        for pair in pairs {
            let wifi_mac = pair.wifi_mac.to_uppercase();
            let bt_mac = pair.bt_mac.to_uppercase();
            let wifi_known = known_ids.contains(&wifi_mac);
            if wifi_known || known_ids.contains(&bt_mac) {
                let (drone, operator) = if wifi_known {
                    (&wifi_mac, &bt_mac)
                } else {
                    (&bt_mac, &wifi_mac)
                };
                self.store
                    .add_correlation(
                        drone,
                        operator,
                        "wifi_bt_correlation",
                        pair.confidence,
                        pair.evidence.clone(),
                    )
                    .await;
            }
        }

        self.store.list_correlations(min_confidence, 200).await
    }

    // ── Incidents and artifacts ───────────────────────────────────────────────

    pub async fn create_incident(
        &self,
        title: &str,
        severity: Severity,
        opened_by: &str,
        summary: Option<String>,
        metadata: Option<Value>,
    ) -> OpsResult<Incident> {
        let incident = self
            .store
            .create_incident(title, severity, opened_by, summary, metadata)
            .await?;
        self.emit("incident_created", json!({"incident": incident}));
        Ok(incident)
    }

    pub async fn update_incident(
        &self,
        incident_id: i64,
        status: Option<IncidentStatus>,
        severity: Option<Severity>,
        summary: Option<String>,
        metadata: Option<Value>,
    ) -> OpsResult<Incident> {
        let incident = self
            .store
            .update_incident(incident_id, status, severity, summary, metadata)
            .await?;
        self.emit("incident_updated", json!({"incident": incident}));
        Ok(incident)
    }

    pub async fn add_incident_artifact(
        &self,
        incident_id: i64,
        artifact_type: &str,
        artifact_ref: &str,
        added_by: &str,
        metadata: Option<Value>,
    ) -> OpsResult<IncidentArtifact> {
        let artifact = self
            .store
            .add_incident_artifact(incident_id, artifact_type, artifact_ref, added_by, metadata)
            .await?;
        self.emit("incident_artifact_added", json!({"artifact": artifact}));
        Ok(artifact)
    }

    // ── Actions and approvals ─────────────────────────────────────────────────

    pub async fn request_action(
        &self,
        incident_id: i64,
        action_type: &str,
        requested_by: &str,
        payload: Option<Value>,
    ) -> OpsResult<ActionRequest> {
        let request = self
            .store
            .create_action_request(incident_id, action_type, requested_by, payload.clone())
            .await?;
        self.store
            .add_audit_entry(
                request.id,
                "requested",
                requested_by,
                json!({"payload": payload.unwrap_or_else(crate::model::empty_object)}),
            )
            .await;

        let request = self
            .store
            .get_action_request(request.id)
            .await
            .ok_or(OpsError::NotFound("Action request"))?;
        self.emit("action_requested", json!({"request": request}));
        Ok(request)
    }

    /// Record an approval decision. Re-approving by the same approver is a
    /// no-op returning the current request. A rejection sends a pending or
    /// approved request to the terminal `rejected` state.
    pub async fn approve_action(
        &self,
        request_id: i64,
        approver: &str,
        decision: ApprovalDecision,
        notes: Option<String>,
    ) -> OpsResult<ActionRequest> {
        let request = self
            .store
            .get_action_request(request_id)
            .await
            .ok_or(OpsError::NotFound("Action request"))?;

        if request.has_decision_from(approver) {
            return Ok(request);
        }

        self.store
            .add_action_approval(request_id, approver, decision, notes.clone())
            .await?;
        self.store
            .add_audit_entry(
                request_id,
                "approval",
                approver,
                json!({"decision": decision, "notes": notes}),
            )
            .await;

        let request = self
            .store
            .get_action_request(request_id)
            .await
            .ok_or(OpsError::NotFound("Action request"))?;

        if decision == ApprovalDecision::Rejected {
            if matches!(request.status, ActionStatus::Pending | ActionStatus::Approved) {
                self.store
                    .update_action_request_status(request_id, ActionStatus::Rejected, None)
                    .await?;
            }
        } else if request.approved_count >= request.required_approvals
            && !matches!(request.status, ActionStatus::Executed | ActionStatus::Rejected)
        {
            self.store
                .update_action_request_status(request_id, ActionStatus::Approved, None)
                .await?;
        }

        let request = self
            .store
            .get_action_request(request_id)
            .await
            .ok_or(OpsError::NotFound("Action request"))?;
        self.emit("action_approved", json!({"request": request}));
        Ok(request)
    }

    /// Execute an approved action request. Gated on the arming window and the
    /// approval quorum; execution is recorded, effectors are pluggable.
    pub async fn execute_action(&self, request_id: i64, actor: &str) -> OpsResult<ActionRequest> {
        let request = self
            .store
            .get_action_request(request_id)
            .await
            .ok_or(OpsError::NotFound("Action request"))?;

        match request.status {
            ActionStatus::Executed => {
                return Err(OpsError::Validation("Action request already executed".into()))
            }
            ActionStatus::Rejected => {
                return Err(OpsError::Validation("Action request was rejected".into()))
            }
            _ => {}
        }

        if !self.policy_state().armed {
            return Err(OpsError::NotArmed);
        }

        if request.approved_count < request.required_approvals {
            return Err(OpsError::InsufficientApprovals {
                approved: request.approved_count,
                required: request.required_approvals,
            });
        }

        self.store
            .update_action_request_status(request_id, ActionStatus::Executed, Some(actor.to_string()))
            .await?;
        self.store
            .add_audit_entry(
                request_id,
                "executed",
                actor,
                json!({
                    "dispatch": "framework",
                    "note": "Execution recorded. Attach effector handlers per action_type.",
                }),
            )
            .await;

        let request = self
            .store
            .get_action_request(request_id)
            .await
            .ok_or(OpsError::NotFound("Action request"))?;
        self.emit("action_executed", json!({"request": request}));
        Ok(request)
    }

    // ── Evidence manifests ────────────────────────────────────────────────────

    pub async fn generate_evidence_manifest(
        &self,
        incident_id: i64,
        created_by: &str,
        signature: Option<String>,
    ) -> Option<EvidenceManifest> {
        self.generate_evidence_manifest_at(incident_id, created_by, signature, Utc::now())
            .await
    }

    /// Manifest generation against a supplied clock; identical incident and
    /// dependent-row state plus an identical `generated_at` yields a
    /// byte-identical canonical body and digest.
    pub async fn generate_evidence_manifest_at(
        &self,
        incident_id: i64,
        created_by: &str,
        signature: Option<String>,
        generated_at: DateTime<Utc>,
    ) -> Option<EvidenceManifest> {
        let incident = self.store.get_incident(incident_id).await?;

        let action_requests = self
            .store
            .list_action_requests(Some(incident_id), None, 1000)
            .await;
        let mut action_audit = Vec::new();
        for request in &action_requests {
            action_audit.extend(self.store.list_audit_entries(Some(request.id), 500).await);
        }

        let body = json!({
            "generated_at": generated_at,
            "incident": {
                "id": incident.id,
                "title": incident.title,
                "status": incident.status,
                "severity": incident.severity,
                "opened_at": incident.opened_at,
                "closed_at": incident.closed_at,
            },
            "artifact_count": incident.artifacts.len(),
            "action_request_count": action_requests.len(),
            "audit_event_count": action_audit.len(),
            "artifacts": incident.artifacts,
            "action_requests": action_requests,
            "action_audit": action_audit,
        });

        let (manifest, digest) = evidence::seal_manifest(body);

        let stored = self
            .store
            .create_manifest(
                incident_id,
                manifest,
                evidence::HASH_ALGO,
                &digest,
                signature,
                created_by,
            )
            .await;
        self.emit("evidence_manifest_created", json!({"manifest": stored}));
        Some(stored)
    }

    // ── Background maintenance ────────────────────────────────────────────────

    /// Periodic store snapshot flush, spawned from `main`.
    pub async fn run_snapshot_flush(self: Arc<Self>, every: Duration) {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = self.store.save_snapshot().await {
                warn!("Store snapshot flush failed: {e}");
            }
        }
    }
}
