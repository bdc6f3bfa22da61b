//! In-process CRUD store for the Drone Ops tables.
//!
//! One `RwLock` over all tables gives the serialized
//! `get_active_session` + `create_session` semantics the ingestion layer
//! relies on. Identifiers are per-table monotonic integers. The whole store
//! snapshots to a JSON file and restores on boot; a missing or corrupt
//! snapshot falls back to an empty store.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::detector::TrackSeed;
use crate::error::{OpsError, OpsResult};
use crate::model::{
    empty_object, ActionApproval, ActionAuditEntry, ActionRequest, ActionStatus, ApprovalDecision,
    Correlation, Detection, EvidenceManifest, Incident, IncidentArtifact, IncidentStatus,
    Session, SessionMode, Severity, TrackPoint,
};
use crate::remote_id::RemoteIdRecord;

// ─── Tables ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Counters {
    sessions: i64,
    detections: i64,
    tracks: i64,
    correlations: i64,
    incidents: i64,
    artifacts: i64,
    action_requests: i64,
    audit_entries: i64,
    manifests: i64,
}

impl Counters {
    fn next(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreInner {
    counters: Counters,
    #[serde(default)]
    drone_sessions: Vec<Session>,
    #[serde(default)]
    drone_detections: Vec<Detection>,
    #[serde(default)]
    drone_tracks: Vec<TrackPoint>,
    #[serde(default)]
    drone_correlations: Vec<Correlation>,
    #[serde(default)]
    drone_incidents: Vec<Incident>,
    #[serde(default)]
    action_requests: Vec<ActionRequest>,
    #[serde(default)]
    action_audit_log: Vec<ActionAuditEntry>,
    #[serde(default)]
    evidence_manifests: Vec<EvidenceManifest>,
}

pub struct Store {
    inner: RwLock<StoreInner>,
    snapshot_path: Option<PathBuf>,
}

impl Store {
    /// Fresh empty store. `snapshot_path` is where `save_snapshot` writes.
    pub fn new(snapshot_path: Option<PathBuf>) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            snapshot_path,
        }
    }

    /// Restore from the snapshot file if present, otherwise start empty.
    /// Sessions left active by a previous process are stopped: the
    /// single-active-session invariant must hold after a restart.
    pub async fn load(snapshot_path: Option<PathBuf>) -> Self {
        let mut inner = StoreInner::default();

        if let Some(path) = &snapshot_path {
            match fs::read_to_string(path).await {
                Ok(data) => match serde_json::from_str::<StoreInner>(&data) {
                    Ok(mut restored) => {
                        let now = Utc::now();
                        for session in restored
                            .drone_sessions
                            .iter_mut()
                            .filter(|s| s.stopped_at.is_none())
                        {
                            session.stopped_at = Some(now);
                            session.active = false;
                        }
                        info!(
                            "Restored store snapshot ({} sessions, {} detections, {} incidents)",
                            restored.drone_sessions.len(),
                            restored.drone_detections.len(),
                            restored.drone_incidents.len(),
                        );
                        inner = restored;
                    }
                    Err(e) => {
                        warn!("Failed to parse store snapshot {}: {e}, starting empty", path.display());
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    info!("No store snapshot at {}, starting empty", path.display());
                }
                Err(e) => {
                    warn!("Failed to read store snapshot {}: {e}, starting empty", path.display());
                }
            }
        }

        Self {
            inner: RwLock::new(inner),
            snapshot_path,
        }
    }

    /// Write the current tables to the snapshot file, if one is configured.
    pub async fn save_snapshot(&self) -> anyhow::Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let json = {
            let inner = self.inner.read().await;
            serde_json::to_string_pretty(&*inner)?
        };
        fs::write(path, json).await?;
        Ok(())
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    pub async fn create_session(
        &self,
        mode: SessionMode,
        label: Option<String>,
        operator: &str,
        metadata: Option<Value>,
    ) -> Session {
        let mut inner = self.inner.write().await;
        let id = Counters::next(&mut inner.counters.sessions);
        let session = Session {
            id,
            mode,
            label,
            operator: operator.to_string(),
            metadata: metadata.unwrap_or_else(empty_object),
            started_at: Utc::now(),
            stopped_at: None,
            summary: None,
            active: true,
        };
        inner.drone_sessions.push(session.clone());
        session
    }

    pub async fn get_session(&self, id: i64) -> Option<Session> {
        let inner = self.inner.read().await;
        inner.drone_sessions.iter().find(|s| s.id == id).cloned()
    }

    pub async fn get_active_session(&self) -> Option<Session> {
        let inner = self.inner.read().await;
        inner
            .drone_sessions
            .iter()
            .find(|s| s.stopped_at.is_none())
            .cloned()
    }

    pub async fn stop_session(&self, id: i64, summary: Option<Value>) -> OpsResult<Session> {
        let mut inner = self.inner.write().await;
        let session = inner
            .drone_sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(OpsError::NotFound("Session"))?;
        if session.stopped_at.is_none() {
            session.stopped_at = Some(Utc::now());
            session.active = false;
        }
        if summary.is_some() {
            session.summary = summary;
        }
        Ok(session.clone())
    }

    pub async fn list_sessions(&self, limit: usize, active_only: bool) -> Vec<Session> {
        let inner = self.inner.read().await;
        inner
            .drone_sessions
            .iter()
            .rev()
            .filter(|s| !active_only || s.stopped_at.is_none())
            .take(limit)
            .cloned()
            .collect()
    }

    // ── Detections & tracks ───────────────────────────────────────────────────

    /// Upsert keyed on (session_id, source, identifier): refreshes
    /// `last_seen`, widens confidence, and takes the latest evidence payload.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_detection(
        &self,
        session_id: Option<i64>,
        source: &str,
        identifier: &str,
        classification: Option<String>,
        confidence: f64,
        payload: Value,
        remote_id: Option<RemoteIdRecord>,
    ) -> OpsResult<i64> {
        if identifier.trim().is_empty() {
            return Err(OpsError::Validation("identifier is required".into()));
        }

        let mut inner = self.inner.write().await;
        let now = Utc::now();

        if let Some(existing) = inner.drone_detections.iter_mut().find(|d| {
            d.session_id == session_id && d.source == source && d.identifier == identifier
        }) {
            existing.last_seen = now;
            existing.confidence = existing.confidence.max(confidence);
            if classification.is_some() {
                existing.classification = classification;
            }
            existing.payload = payload;
            if remote_id.is_some() {
                existing.remote_id = remote_id;
            }
            return Ok(existing.id);
        }

        let id = Counters::next(&mut inner.counters.detections);
        inner.drone_detections.push(Detection {
            id,
            session_id,
            source: source.to_string(),
            identifier: identifier.to_string(),
            classification,
            confidence,
            payload,
            remote_id,
            first_seen: now,
            last_seen: now,
        });
        Ok(id)
    }

    pub async fn get_detection(&self, id: i64) -> Option<Detection> {
        let inner = self.inner.read().await;
        inner.drone_detections.iter().find(|d| d.id == id).cloned()
    }

    pub async fn list_detections(
        &self,
        session_id: Option<i64>,
        source: Option<&str>,
        min_confidence: f64,
        limit: usize,
    ) -> Vec<Detection> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Detection> = inner
            .drone_detections
            .iter()
            .filter(|d| session_id.is_none() || d.session_id == session_id)
            .filter(|d| source.map(|s| d.source == s).unwrap_or(true))
            .filter(|d| d.confidence >= min_confidence)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        rows.truncate(limit);
        rows
    }

    /// Append-only; the referenced detection must exist.
    pub async fn add_track(&self, detection_id: i64, seed: &TrackSeed) -> OpsResult<TrackPoint> {
        let mut inner = self.inner.write().await;
        if !inner.drone_detections.iter().any(|d| d.id == detection_id) {
            return Err(OpsError::NotFound("Detection"));
        }
        let id = Counters::next(&mut inner.counters.tracks);
        let track = TrackPoint {
            id,
            detection_id,
            lat: seed.lat,
            lon: seed.lon,
            altitude_m: seed.altitude_m,
            speed_mps: seed.speed_mps,
            heading_deg: seed.heading_deg,
            quality: seed.quality,
            source: seed.source.clone(),
            timestamp: Utc::now(),
        };
        inner.drone_tracks.push(track.clone());
        Ok(track)
    }

    pub async fn list_tracks(
        &self,
        detection_id: Option<i64>,
        identifier: Option<&str>,
        limit: usize,
    ) -> Vec<TrackPoint> {
        let inner = self.inner.read().await;
        let identifier_ids: Option<Vec<i64>> = identifier.map(|needle| {
            let needle = needle.to_uppercase();
            inner
                .drone_detections
                .iter()
                .filter(|d| d.identifier.to_uppercase() == needle)
                .map(|d| d.id)
                .collect()
        });
        inner
            .drone_tracks
            .iter()
            .rev()
            .filter(|t| detection_id.map(|id| t.detection_id == id).unwrap_or(true))
            .filter(|t| {
                identifier_ids
                    .as_ref()
                    .map(|ids| ids.contains(&t.detection_id))
                    .unwrap_or(true)
            })
            .take(limit)
            .cloned()
            .collect()
    }

    // ── Correlations ──────────────────────────────────────────────────────────

    pub async fn add_correlation(
        &self,
        drone_identifier: &str,
        operator_identifier: &str,
        method: &str,
        confidence: f64,
        evidence: Value,
    ) -> Correlation {
        let mut inner = self.inner.write().await;
        let id = Counters::next(&mut inner.counters.correlations);
        let correlation = Correlation {
            id,
            drone_identifier: drone_identifier.to_string(),
            operator_identifier: operator_identifier.to_string(),
            method: method.to_string(),
            confidence,
            evidence,
            created_at: Utc::now(),
        };
        inner.drone_correlations.push(correlation.clone());
        correlation
    }

    /// Duplicates are stored but deduplicated here by
    /// (drone, operator, method), keeping the highest confidence.
    pub async fn list_correlations(&self, min_confidence: f64, limit: usize) -> Vec<Correlation> {
        let inner = self.inner.read().await;
        let mut best: Vec<Correlation> = Vec::new();
        for row in inner
            .drone_correlations
            .iter()
            .filter(|c| c.confidence >= min_confidence)
        {
            match best.iter_mut().find(|b| {
                b.drone_identifier == row.drone_identifier
                    && b.operator_identifier == row.operator_identifier
                    && b.method == row.method
            }) {
                Some(existing) => {
                    if row.confidence > existing.confidence {
                        *existing = row.clone();
                    }
                }
                None => best.push(row.clone()),
            }
        }
        best.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        best.truncate(limit);
        best
    }

    // ── Incidents ─────────────────────────────────────────────────────────────

    pub async fn create_incident(
        &self,
        title: &str,
        severity: Severity,
        opened_by: &str,
        summary: Option<String>,
        metadata: Option<Value>,
    ) -> OpsResult<Incident> {
        if title.trim().is_empty() {
            return Err(OpsError::Validation("title is required".into()));
        }
        let mut inner = self.inner.write().await;
        let id = Counters::next(&mut inner.counters.incidents);
        let incident = Incident {
            id,
            title: title.trim().to_string(),
            severity,
            status: IncidentStatus::Open,
            opened_by: opened_by.to_string(),
            opened_at: Utc::now(),
            closed_at: None,
            summary,
            metadata: metadata.unwrap_or_else(empty_object),
            artifacts: Vec::new(),
        };
        inner.drone_incidents.push(incident.clone());
        Ok(incident)
    }

    pub async fn get_incident(&self, id: i64) -> Option<Incident> {
        let inner = self.inner.read().await;
        inner.drone_incidents.iter().find(|i| i.id == id).cloned()
    }

    pub async fn list_incidents(&self, status: Option<IncidentStatus>, limit: usize) -> Vec<Incident> {
        let inner = self.inner.read().await;
        inner
            .drone_incidents
            .iter()
            .rev()
            .filter(|i| status.map(|s| i.status == s).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Unspecified fields stay unchanged. Setting status to closed stamps
    /// `closed_at`; once closed, only metadata merges are accepted.
    pub async fn update_incident(
        &self,
        id: i64,
        status: Option<IncidentStatus>,
        severity: Option<Severity>,
        summary: Option<String>,
        metadata: Option<Value>,
    ) -> OpsResult<Incident> {
        let mut inner = self.inner.write().await;
        let incident = inner
            .drone_incidents
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(OpsError::NotFound("Incident"))?;

        if incident.status == IncidentStatus::Closed
            && (status.is_some_and(|s| s != IncidentStatus::Closed)
                || severity.is_some()
                || summary.is_some())
        {
            return Err(OpsError::Validation(
                "incident is closed; only metadata may change".into(),
            ));
        }

        if let Some(status) = status {
            if status == IncidentStatus::Closed && incident.status != IncidentStatus::Closed {
                incident.closed_at = Some(Utc::now());
            }
            incident.status = status;
        }
        if let Some(severity) = severity {
            incident.severity = severity;
        }
        if summary.is_some() {
            incident.summary = summary;
        }
        if let Some(metadata) = metadata {
            incident.metadata = metadata;
        }
        Ok(incident.clone())
    }

    pub async fn add_incident_artifact(
        &self,
        incident_id: i64,
        artifact_type: &str,
        artifact_ref: &str,
        added_by: &str,
        metadata: Option<Value>,
    ) -> OpsResult<IncidentArtifact> {
        if artifact_type.trim().is_empty() || artifact_ref.trim().is_empty() {
            return Err(OpsError::Validation(
                "artifact_type and artifact_ref are required".into(),
            ));
        }
        let mut inner = self.inner.write().await;
        let id = Counters::next(&mut inner.counters.artifacts);
        let artifact = IncidentArtifact {
            id,
            incident_id,
            artifact_type: artifact_type.trim().to_string(),
            artifact_ref: artifact_ref.trim().to_string(),
            added_by: added_by.to_string(),
            added_at: Utc::now(),
            metadata: metadata.unwrap_or_else(empty_object),
        };
        let incident = inner
            .drone_incidents
            .iter_mut()
            .find(|i| i.id == incident_id)
            .ok_or(OpsError::NotFound("Incident"))?;
        incident.artifacts.push(artifact.clone());
        Ok(artifact)
    }

    // ── Action requests ───────────────────────────────────────────────────────

    pub async fn create_action_request(
        &self,
        incident_id: i64,
        action_type: &str,
        requested_by: &str,
        payload: Option<Value>,
    ) -> OpsResult<ActionRequest> {
        if action_type.trim().is_empty() {
            return Err(OpsError::Validation("action_type is required".into()));
        }
        let mut inner = self.inner.write().await;
        if !inner.drone_incidents.iter().any(|i| i.id == incident_id) {
            return Err(OpsError::NotFound("Incident"));
        }
        let id = Counters::next(&mut inner.counters.action_requests);
        let now = Utc::now();
        let mut request = ActionRequest {
            id,
            incident_id,
            action_type: action_type.trim().to_string(),
            requested_by: requested_by.to_string(),
            payload: payload.unwrap_or_else(empty_object),
            status: ActionStatus::Pending,
            approvals: Vec::new(),
            executed_by: None,
            requested_at: now,
            updated_at: now,
            required_approvals: 0,
            approved_count: 0,
        };
        request.refresh_counts();
        inner.action_requests.push(request.clone());
        Ok(request)
    }

    pub async fn get_action_request(&self, id: i64) -> Option<ActionRequest> {
        let inner = self.inner.read().await;
        inner.action_requests.iter().find(|r| r.id == id).cloned().map(|mut r| {
            r.refresh_counts();
            r
        })
    }

    pub async fn list_action_requests(
        &self,
        incident_id: Option<i64>,
        status: Option<ActionStatus>,
        limit: usize,
    ) -> Vec<ActionRequest> {
        let inner = self.inner.read().await;
        inner
            .action_requests
            .iter()
            .rev()
            .filter(|r| incident_id.map(|id| r.incident_id == id).unwrap_or(true))
            .filter(|r| status.map(|s| r.status == s).unwrap_or(true))
            .take(limit)
            .cloned()
            .map(|mut r| {
                r.refresh_counts();
                r
            })
            .collect()
    }

    /// At most one approval per approver per request (case-insensitive);
    /// a second decision from the same approver is rejected here.
    pub async fn add_action_approval(
        &self,
        request_id: i64,
        approved_by: &str,
        decision: ApprovalDecision,
        notes: Option<String>,
    ) -> OpsResult<()> {
        let mut inner = self.inner.write().await;
        let request = inner
            .action_requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .ok_or(OpsError::NotFound("Action request"))?;
        if request.has_decision_from(approved_by) {
            return Err(OpsError::Validation(format!(
                "{approved_by} already decided on this request"
            )));
        }
        request.approvals.push(ActionApproval {
            approved_by: approved_by.to_string(),
            decision,
            notes,
            decided_at: Utc::now(),
        });
        request.updated_at = Utc::now();
        Ok(())
    }

    pub async fn update_action_request_status(
        &self,
        request_id: i64,
        status: ActionStatus,
        executed_by: Option<String>,
    ) -> OpsResult<()> {
        let mut inner = self.inner.write().await;
        let request = inner
            .action_requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .ok_or(OpsError::NotFound("Action request"))?;
        request.status = status;
        if executed_by.is_some() {
            request.executed_by = executed_by;
        }
        request.updated_at = Utc::now();
        Ok(())
    }

    // ── Audit log ─────────────────────────────────────────────────────────────

    pub async fn add_audit_entry(
        &self,
        request_id: i64,
        event_type: &str,
        actor: &str,
        details: Value,
    ) -> ActionAuditEntry {
        let mut inner = self.inner.write().await;
        let id = Counters::next(&mut inner.counters.audit_entries);
        let entry = ActionAuditEntry {
            id,
            request_id,
            event_type: event_type.to_string(),
            actor: actor.to_string(),
            details,
            created_at: Utc::now(),
        };
        inner.action_audit_log.push(entry.clone());
        entry
    }

    /// Per-request queries come back in chronological order (stable input for
    /// evidence manifests); the global feed is newest-first.
    pub async fn list_audit_entries(
        &self,
        request_id: Option<i64>,
        limit: usize,
    ) -> Vec<ActionAuditEntry> {
        let inner = self.inner.read().await;
        match request_id {
            Some(id) => inner
                .action_audit_log
                .iter()
                .filter(|e| e.request_id == id)
                .take(limit)
                .cloned()
                .collect(),
            None => inner
                .action_audit_log
                .iter()
                .rev()
                .take(limit)
                .cloned()
                .collect(),
        }
    }

    // ── Evidence manifests ────────────────────────────────────────────────────

    pub async fn create_manifest(
        &self,
        incident_id: i64,
        manifest: Value,
        hash_algo: &str,
        digest: &str,
        signature: Option<String>,
        created_by: &str,
    ) -> EvidenceManifest {
        let mut inner = self.inner.write().await;
        let id = Counters::next(&mut inner.counters.manifests);
        let row = EvidenceManifest {
            id,
            incident_id,
            manifest,
            hash_algo: hash_algo.to_string(),
            digest: digest.to_string(),
            signature,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };
        inner.evidence_manifests.push(row.clone());
        row
    }

    pub async fn get_manifest(&self, id: i64) -> Option<EvidenceManifest> {
        let inner = self.inner.read().await;
        inner.evidence_manifests.iter().find(|m| m.id == id).cloned()
    }

    pub async fn list_manifests(&self, incident_id: i64, limit: usize) -> Vec<EvidenceManifest> {
        let inner = self.inner.read().await;
        inner
            .evidence_manifests
            .iter()
            .rev()
            .filter(|m| m.incident_id == incident_id)
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_widens_confidence_and_refreshes_last_seen() {
        let store = Store::new(None);
        let id = store
            .upsert_detection(None, "wifi", "AA:BB:CC:00:11:22", Some("x".into()), 0.9, json!({}), None)
            .await
            .unwrap();
        let again = store
            .upsert_detection(None, "wifi", "AA:BB:CC:00:11:22", Some("y".into()), 0.5, json!({"r": 1}), None)
            .await
            .unwrap();
        assert_eq!(id, again);

        let row = store.get_detection(id).await.unwrap();
        assert_eq!(row.confidence, 0.9);
        assert_eq!(row.classification.as_deref(), Some("y"));
        assert!(row.last_seen >= row.first_seen);
    }

    #[tokio::test]
    async fn distinct_sessions_get_distinct_detections() {
        let store = Store::new(None);
        let a = store
            .upsert_detection(Some(1), "wifi", "AA:BB:CC:00:11:22", None, 0.6, json!({}), None)
            .await
            .unwrap();
        let b = store
            .upsert_detection(Some(2), "wifi", "AA:BB:CC:00:11:22", None, 0.6, json!({}), None)
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn track_requires_existing_detection() {
        let store = Store::new(None);
        let seed = TrackSeed {
            lat: 1.0,
            lon: 2.0,
            altitude_m: None,
            speed_mps: None,
            heading_deg: None,
            quality: None,
            source: "wifi".into(),
        };
        assert!(matches!(
            store.add_track(99, &seed).await,
            Err(OpsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn correlation_queries_dedupe_by_key_with_max_confidence() {
        let store = Store::new(None);
        store
            .add_correlation("D1", "O1", "wifi_bt_correlation", 0.6, json!({}))
            .await;
        store
            .add_correlation("D1", "O1", "wifi_bt_correlation", 0.9, json!({}))
            .await;
        store
            .add_correlation("D1", "O1", "remote_id_binding", 0.7, json!({}))
            .await;

        let rows = store.list_correlations(0.0, 100).await;
        assert_eq!(rows.len(), 2);
        let wifi_bt = rows
            .iter()
            .find(|r| r.method == "wifi_bt_correlation")
            .unwrap();
        assert_eq!(wifi_bt.confidence, 0.9);
    }

    #[tokio::test]
    async fn closed_incident_accepts_only_metadata() {
        let store = Store::new(None);
        let incident = store
            .create_incident("Test", Severity::Medium, "op", None, None)
            .await
            .unwrap();

        let closed = store
            .update_incident(incident.id, Some(IncidentStatus::Closed), None, None, None)
            .await
            .unwrap();
        assert!(closed.closed_at.is_some());

        let err = store
            .update_incident(incident.id, None, Some(Severity::High), None, None)
            .await;
        assert!(matches!(err, Err(OpsError::Validation(_))));

        let ok = store
            .update_incident(incident.id, None, None, None, Some(json!({"note": "kept"})))
            .await
            .unwrap();
        assert_eq!(ok.metadata["note"], "kept");
    }

    #[tokio::test]
    async fn duplicate_approver_is_rejected_case_insensitively() {
        let store = Store::new(None);
        let incident = store
            .create_incident("Gate", Severity::Medium, "op", None, None)
            .await
            .unwrap();
        let request = store
            .create_action_request(incident.id, "wifi_deauth_test", "op", None)
            .await
            .unwrap();

        store
            .add_action_approval(request.id, "Supervisor-A", ApprovalDecision::Approved, None)
            .await
            .unwrap();
        let dup = store
            .add_action_approval(request.id, "supervisor-a", ApprovalDecision::Approved, None)
            .await;
        assert!(matches!(dup, Err(OpsError::Validation(_))));
    }

    #[tokio::test]
    async fn snapshot_restore_stops_active_sessions() {
        let dir = std::env::temp_dir().join(format!("droneops-store-{}", std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("snapshot.json");

        let store = Store::new(Some(path.clone()));
        store
            .create_session(SessionMode::Passive, None, "op1", None)
            .await;
        store.save_snapshot().await.unwrap();

        let restored = Store::load(Some(path.clone())).await;
        assert!(restored.get_active_session().await.is_none());
        assert_eq!(restored.list_sessions(10, false).await.len(), 1);

        let _ = std::fs::remove_file(&path);
    }
}
