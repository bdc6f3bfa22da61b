use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::remote_id::RemoteIdRecord;

/// Empty JSON object, the default for free-form metadata fields.
pub fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

// ─── Sessions ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Passive,
    Active,
}

impl SessionMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "passive" => Some(Self::Passive),
            "active" => Some(Self::Active),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub mode: SessionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub operator: String,
    #[serde(default = "empty_object")]
    pub metadata: Value,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    /// Convenience flag kept in lockstep with `stopped_at`
    pub active: bool,
}

// ─── Detections & Tracks ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
    /// Carrier, e.g. "wifi", "bluetooth", "rf"
    pub source: String,
    /// Normalized identifier (upper-case MAC or composite)
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    pub confidence: f64,
    #[serde(default = "empty_object")]
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteIdRecord>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackPoint {
    pub id: i64,
    pub detection_id: i64,
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

// ─── Correlations ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correlation {
    pub id: i64,
    pub drone_identifier: String,
    pub operator_identifier: String,
    /// e.g. "remote_id_binding", "wifi_bt_correlation"
    pub method: String,
    pub confidence: f64,
    #[serde(default = "empty_object")]
    pub evidence: Value,
    pub created_at: DateTime<Utc>,
}

// ─── Incidents ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    #[default]
    Open,
    Monitoring,
    Contained,
    Closed,
}

impl IncidentStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "monitoring" => Some(Self::Monitoring),
            "contained" => Some(Self::Contained),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub title: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub opened_by: String,
    pub opened_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
    #[serde(default)]
    pub artifacts: Vec<IncidentArtifact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentArtifact {
    pub id: i64,
    pub incident_id: i64,
    pub artifact_type: String,
    pub artifact_ref: String,
    pub added_by: String,
    pub added_at: DateTime<Utc>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

// ─── Action workflow ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Executed,
}

impl ActionStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "executed" => Some(Self::Executed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    #[default]
    Approved,
    Rejected,
}

impl ApprovalDecision {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionApproval {
    pub approved_by: String,
    pub decision: ApprovalDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: i64,
    pub incident_id: i64,
    pub action_type: String,
    pub requested_by: String,
    #[serde(default = "empty_object")]
    pub payload: Value,
    pub status: ActionStatus,
    #[serde(default)]
    pub approvals: Vec<ActionApproval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_by: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Computed fresh from `action_type` on every read
    #[serde(default)]
    pub required_approvals: u32,
    /// Computed fresh from `approvals` on every read
    #[serde(default)]
    pub approved_count: u32,
}

impl ActionRequest {
    /// Recompute the derived counters from stored approvals.
    pub fn refresh_counts(&mut self) {
        self.required_approvals = crate::policy::required_approvals(&self.action_type);
        self.approved_count = self
            .approvals
            .iter()
            .filter(|a| a.decision == ApprovalDecision::Approved)
            .count() as u32;
    }

    /// True if `approver` already recorded a decision (case-insensitive).
    pub fn has_decision_from(&self, approver: &str) -> bool {
        let needle = approver.to_lowercase();
        self.approvals
            .iter()
            .any(|a| a.approved_by.to_lowercase() == needle)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionAuditEntry {
    pub id: i64,
    pub request_id: i64,
    /// e.g. "requested", "approval", "executed"
    pub event_type: String,
    pub actor: String,
    #[serde(default = "empty_object")]
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

// ─── Evidence manifests ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceManifest {
    pub id: i64,
    pub incident_id: i64,
    /// Full manifest document including the `integrity` block
    pub manifest: Value,
    pub hash_algo: String,
    /// 64 hex chars, SHA-256 of the canonical body without `integrity`
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}
