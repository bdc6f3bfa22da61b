//! End-to-end service tests: ingestion, the approval workflow state machine,
//! and evidence manifest determinism.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use droneops_backend::correlation::{CorrelatedPair, CorrelationProvider, DeviceCache};
use droneops_backend::error::OpsError;
use droneops_backend::evidence;
use droneops_backend::geolocate::WeightedCentroidEstimator;
use droneops_backend::model::{ActionStatus, ApprovalDecision, SessionMode, Severity};
use droneops_backend::service::DroneOpsService;
use droneops_backend::store::Store;

fn service() -> Arc<DroneOpsService> {
    Arc::new(DroneOpsService::with_defaults(Arc::new(Store::new(None))))
}

async fn incident_id(service: &DroneOpsService, title: &str) -> i64 {
    service
        .create_incident(title, Severity::Medium, "op1", None, None)
        .await
        .unwrap()
        .id
}

// ── Sessions ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn session_start_is_idempotent_while_active() {
    let service = service();

    let first = service
        .start_session(SessionMode::Passive, Some("sweep".into()), "op1", None)
        .await;
    let second = service
        .start_session(SessionMode::Active, None, "op2", None)
        .await;
    assert_eq!(first.id, second.id);
    assert_eq!(second.mode, SessionMode::Passive);

    let stopped = service.stop_session("op1", None, None).await.unwrap();
    assert!(!stopped.active);
    let summary = stopped.summary.unwrap();
    assert_eq!(summary["operator"], "op1");
    assert_eq!(summary["detections"], 0);

    // No active session left to stop
    assert!(service.stop_session("op1", None, None).await.is_none());

    // A new start opens a fresh session
    let third = service
        .start_session(SessionMode::Active, None, "op1", None)
        .await;
    assert_ne!(third.id, first.id);
}

// ── Ingestion ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_persists_detection_and_emits_event() {
    let service = service();
    let session = service
        .start_session(SessionMode::Passive, None, "op1", None)
        .await;

    // Opened after session start, so the first event is the detection itself
    let mut subscription = service.subscribe();

    service
        .ingest_event(
            "wifi",
            &json!({"bssid": "60:60:1F:AA:BB:CC", "ssid": "DJI-OPS-TEST"}),
            Some("network_update"),
        )
        .await;

    let rows = service.get_detections(None, Some("wifi"), 0.5, 100).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].session_id, Some(session.id));
    assert_eq!(rows[0].classification.as_deref(), Some("wifi_drone_signature"));
    assert!(rows[0].confidence >= 0.9);

    let event = subscription.next_event(Duration::from_millis(100)).await;
    assert_eq!(event.event_type, "detection");
    assert_eq!(event.payload["detection"]["identifier"], "60:60:1F:AA:BB:CC");
}

#[tokio::test]
async fn ingest_remote_id_binding_creates_track_and_correlation() {
    let service = service();
    service
        .start_session(SessionMode::Passive, None, "op1", None)
        .await;

    service
        .ingest_event(
            "mesh",
            &json!({
                "uas_id": "UAS-9",
                "operator_id": "OP-3",
                "lat": 35.0,
                "lon": -115.0,
                "altitude": 60,
            }),
            Some("telemetry"),
        )
        .await;

    let detections = service.get_detections(None, None, 0.0, 100).await;
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].identifier, "UAS-9");

    let tracks = service.get_tracks(Some(detections[0].id), None, 100).await;
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].lat, 35.0);

    let correlations = service.store().list_correlations(0.0, 100).await;
    assert_eq!(correlations.len(), 1);
    assert_eq!(correlations[0].method, "remote_id_binding");
    assert_eq!(correlations[0].drone_identifier, "UAS-9");
    assert_eq!(correlations[0].operator_identifier, "OP-3");
}

#[tokio::test]
async fn non_matching_events_yield_no_detections() {
    let service = service();
    service
        .ingest_event("wifi", &json!({"bssid": "AA:BB:CC:DD:EE:FF", "ssid": "HomeNet"}), None)
        .await;
    service.ingest_event("subghz", &json!({"frequency_mhz": 600.0}), None).await;

    assert!(service.get_detections(None, None, 0.0, 100).await.is_empty());
}

// ── Action workflow ───────────────────────────────────────────────────────────

#[tokio::test]
async fn two_approval_gate_blocks_until_armed_and_quorate() {
    let service = service();
    let incident = incident_id(&service, "Action Gate Test").await;

    let request = service
        .request_action(incident, "wifi_deauth_test", "op1", Some(json!({"target": "aa:bb"})))
        .await
        .unwrap();
    assert_eq!(request.status, ActionStatus::Pending);
    assert_eq!(request.required_approvals, 2);

    // Not armed yet
    let err = service.execute_action(request.id, "op1").await.unwrap_err();
    assert!(matches!(err, OpsError::NotArmed));

    service.arm_actions("op1", "controlled test", incident, None);

    // Armed but zero approvals
    let err = service.execute_action(request.id, "op1").await.unwrap_err();
    assert!(matches!(
        err,
        OpsError::InsufficientApprovals { approved: 0, required: 2 }
    ));

    let after_one = service
        .approve_action(request.id, "supervisor-a", ApprovalDecision::Approved, None)
        .await
        .unwrap();
    assert_eq!(after_one.status, ActionStatus::Pending);
    assert_eq!(after_one.approved_count, 1);

    let err = service.execute_action(request.id, "op1").await.unwrap_err();
    assert!(matches!(
        err,
        OpsError::InsufficientApprovals { approved: 1, required: 2 }
    ));

    let after_two = service
        .approve_action(request.id, "supervisor-b", ApprovalDecision::Approved, None)
        .await
        .unwrap();
    assert_eq!(after_two.status, ActionStatus::Approved);

    let executed = service.execute_action(request.id, "op1").await.unwrap();
    assert_eq!(executed.status, ActionStatus::Executed);
    assert_eq!(executed.executed_by.as_deref(), Some("op1"));

    let audit = service.store().list_audit_entries(Some(request.id), 100).await;
    let events: Vec<&str> = audit.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(events, vec!["requested", "approval", "approval", "executed"]);
}

#[tokio::test]
async fn passive_action_executes_after_single_approval() {
    let service = service();
    let incident = incident_id(&service, "Passive Action Test").await;

    let request = service
        .request_action(incident, "passive_spectrum_capture", "op1", None)
        .await
        .unwrap();
    assert_eq!(request.required_approvals, 1);

    service.arm_actions("op1", "passive validation", incident, None);

    let approved = service
        .approve_action(request.id, "supervisor-a", ApprovalDecision::Approved, None)
        .await
        .unwrap();
    assert_eq!(approved.status, ActionStatus::Approved);

    let executed = service.execute_action(request.id, "op1").await.unwrap();
    assert_eq!(executed.status, ActionStatus::Executed);
}

#[tokio::test]
async fn repeat_approver_is_a_noop() {
    let service = service();
    let incident = incident_id(&service, "Dup Approver").await;
    let request = service
        .request_action(incident, "wifi_deauth_test", "op1", None)
        .await
        .unwrap();

    service
        .approve_action(request.id, "Supervisor-A", ApprovalDecision::Approved, None)
        .await
        .unwrap();
    let second = service
        .approve_action(request.id, "supervisor-a", ApprovalDecision::Approved, None)
        .await
        .unwrap();
    assert_eq!(second.approvals.len(), 1);
    assert_eq!(second.approved_count, 1);

    let audit = service.store().list_audit_entries(Some(request.id), 100).await;
    assert_eq!(audit.len(), 2); // requested + one approval
}

#[tokio::test]
async fn executed_requests_cannot_be_replayed() {
    let service = service();
    let incident = incident_id(&service, "Replay").await;
    let request = service
        .request_action(incident, "passive_capture", "op1", None)
        .await
        .unwrap();

    service.arm_actions("op1", "test", incident, None);
    service
        .approve_action(request.id, "supervisor-a", ApprovalDecision::Approved, None)
        .await
        .unwrap();
    service.execute_action(request.id, "op1").await.unwrap();

    let err = service.execute_action(request.id, "op1").await.unwrap_err();
    match err {
        OpsError::Validation(message) => assert!(message.contains("already executed")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn rejection_is_terminal() {
    let service = service();
    let incident = incident_id(&service, "Reject").await;
    let request = service
        .request_action(incident, "wifi_deauth_test", "op1", None)
        .await
        .unwrap();

    let rejected = service
        .approve_action(request.id, "supervisor-a", ApprovalDecision::Rejected, Some("too risky".into()))
        .await
        .unwrap();
    assert_eq!(rejected.status, ActionStatus::Rejected);

    // Later approvals are recorded but cannot resurrect the request
    let still_rejected = service
        .approve_action(request.id, "supervisor-b", ApprovalDecision::Approved, None)
        .await
        .unwrap();
    assert_eq!(still_rejected.status, ActionStatus::Rejected);
    assert_eq!(still_rejected.approvals.len(), 2);

    service.arm_actions("op1", "test", incident, None);
    let err = service.execute_action(request.id, "op1").await.unwrap_err();
    assert!(matches!(err, OpsError::Validation(_)));
}

#[tokio::test]
async fn missing_request_is_not_found() {
    let service = service();
    let err = service.execute_action(999, "op1").await.unwrap_err();
    match err {
        OpsError::NotFound(what) => assert_eq!(what, "Action request"),
        other => panic!("expected not found, got {other:?}"),
    }
}

// ── Evidence manifests ────────────────────────────────────────────────────────

#[tokio::test]
async fn manifest_digest_is_stable_under_a_fixed_clock() {
    let service = service();
    let incident = incident_id(&service, "Evidence").await;
    service
        .add_incident_artifact(incident, "detection", "12345", "op1", None)
        .await
        .unwrap();
    let request = service
        .request_action(incident, "passive_capture", "op1", None)
        .await
        .unwrap();
    service
        .approve_action(request.id, "supervisor-a", ApprovalDecision::Approved, None)
        .await
        .unwrap();

    let generated_at = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
    let first = service
        .generate_evidence_manifest_at(incident, "analyst1", None, generated_at)
        .await
        .unwrap();
    let second = service
        .generate_evidence_manifest_at(incident, "analyst1", None, generated_at)
        .await
        .unwrap();

    assert_eq!(first.digest, second.digest);
    assert_eq!(first.digest.len(), 64);
    assert!(first.digest.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(first.hash_algo, "sha256");
    assert_eq!(first.manifest["integrity"]["digest"], Value::from(first.digest.clone()));
    assert_eq!(first.manifest["artifact_count"], 1);
    assert_eq!(first.manifest["action_request_count"], 1);
    assert_eq!(first.manifest["audit_event_count"], 2);

    // Digest always matches a recompute over the body minus its integrity block
    assert!(evidence::verify_manifest(&first.manifest));
}

#[tokio::test]
async fn manifest_for_missing_incident_is_none() {
    let service = service();
    assert!(service
        .generate_evidence_manifest(404, "analyst1", None)
        .await
        .is_none());
}

// ── Correlation refresh ───────────────────────────────────────────────────────

struct StubCorrelator {
    pairs: Vec<CorrelatedPair>,
}

impl CorrelationProvider for StubCorrelator {
    fn correlate(
        &self,
        _wifi: &HashMap<String, Value>,
        _bt: &HashMap<String, Value>,
        _min_confidence: f64,
    ) -> Vec<CorrelatedPair> {
        self.pairs.clone()
    }
}

#[tokio::test]
async fn refresh_promotes_pairs_touching_known_detections() {
    let store = Arc::new(Store::new(None));
    let stub = StubCorrelator {
        pairs: vec![
            CorrelatedPair {
                wifi_mac: "60:60:1f:aa:bb:cc".into(),
                bt_mac: "11:22:33:44:55:66".into(),
                confidence: 0.8,
                evidence: json!({"dt": 2.0}),
            },
            CorrelatedPair {
                wifi_mac: "de:ad:be:ef:00:01".into(),
                bt_mac: "de:ad:be:ef:00:02".into(),
                confidence: 0.9,
                evidence: json!({}),
            },
        ],
    };
    let service = DroneOpsService::new(
        store,
        Arc::new(DeviceCache::new()),
        Arc::new(stub),
        Arc::new(WeightedCentroidEstimator),
    );

    // Known drone detection on the WiFi side of the first pair only
    service
        .ingest_event(
            "wifi",
            &json!({"bssid": "60:60:1F:AA:BB:CC", "ssid": "DJI-OPS-TEST"}),
            None,
        )
        .await;

    let rows = service.refresh_correlations(0.6).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].method, "wifi_bt_correlation");
    assert_eq!(rows[0].drone_identifier, "60:60:1F:AA:BB:CC");
    assert_eq!(rows[0].operator_identifier, "11:22:33:44:55:66");
}
