//! Bounded-duration arming policy for the action plane.
//!
//! State lives in memory behind a single lock and expires lazily: the armed
//! flag is recomputed against the wall clock on every read, so no timer task
//! is needed. Arm durations are clamped to [60, 7200] seconds.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const ARM_MIN_SECS: i64 = 60;
pub const ARM_MAX_SECS: i64 = 7200;
pub const ARM_DEFAULT_SECS: i64 = 900;

/// Required approvals for a given action type: passive actions need one,
/// everything else needs two.
pub fn required_approvals(action_type: &str) -> u32 {
    if action_type.trim().to_lowercase().starts_with("passive_") {
        1
    } else {
        2
    }
}

// ─── Policy state ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyState {
    pub armed: bool,
    pub armed_by: Option<String>,
    pub arm_reason: Option<String>,
    pub arm_incident_id: Option<i64>,
    pub armed_until: Option<DateTime<Utc>>,
    pub required_approvals_default: u32,
}

#[derive(Default)]
struct PolicyInner {
    armed_until: Option<DateTime<Utc>>,
    armed_by: Option<String>,
    arm_reason: Option<String>,
    arm_incident_id: Option<i64>,
}

impl PolicyInner {
    /// Snapshot at `now`, lazily clearing an expired window.
    fn state_at(&mut self, now: DateTime<Utc>) -> PolicyState {
        let armed = self.armed_until.map(|until| now < until).unwrap_or(false);
        if !armed {
            self.armed_until = None;
            self.armed_by = None;
            self.arm_reason = None;
            self.arm_incident_id = None;
        }
        PolicyState {
            armed,
            armed_by: self.armed_by.clone(),
            arm_reason: self.arm_reason.clone(),
            arm_incident_id: self.arm_incident_id,
            armed_until: self.armed_until,
            required_approvals_default: 2,
        }
    }
}

// ─── Engine ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct PolicyEngine {
    inner: Mutex<PolicyInner>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the action plane for a bounded duration. A missing or unusable
    /// duration falls back to the default rather than erroring.
    pub fn arm(
        &self,
        actor: &str,
        reason: &str,
        incident_id: i64,
        duration_seconds: Option<i64>,
    ) -> PolicyState {
        let duration = match duration_seconds {
            None | Some(0) => ARM_DEFAULT_SECS,
            Some(d) => d.clamp(ARM_MIN_SECS, ARM_MAX_SECS),
        };

        let now = Utc::now();
        let mut inner = self.inner.lock().expect("policy lock poisoned");
        inner.armed_until = Some(now + Duration::seconds(duration));
        inner.armed_by = Some(actor.to_string());
        inner.arm_reason = Some(reason.to_string());
        inner.arm_incident_id = Some(incident_id);
        inner.state_at(now)
    }

    /// Disarm the action plane, clearing every arming field.
    pub fn disarm(&self) -> PolicyState {
        let mut inner = self.inner.lock().expect("policy lock poisoned");
        inner.armed_until = None;
        inner.armed_by = None;
        inner.arm_reason = None;
        inner.arm_incident_id = None;
        inner.state_at(Utc::now())
    }

    pub fn state(&self) -> PolicyState {
        self.state_at(Utc::now())
    }

    /// Snapshot against a supplied instant. Expiry is purely a read-side
    /// wall-clock check.
    pub fn state_at(&self, now: DateTime<Utc>) -> PolicyState {
        let mut inner = self.inner.lock().expect("policy lock poisoned");
        inner.state_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passive_actions_need_one_approval() {
        assert_eq!(required_approvals("passive_scan"), 1);
        assert_eq!(required_approvals("  Passive_Spectrum_Capture "), 1);
        assert_eq!(required_approvals("wifi_deauth_test"), 2);
        assert_eq!(required_approvals(""), 2);
    }

    #[test]
    fn arm_sets_full_state() {
        let engine = PolicyEngine::new();
        let state = engine.arm("operator-1", "controlled testing", 42, Some(300));
        assert!(state.armed);
        assert_eq!(state.armed_by.as_deref(), Some("operator-1"));
        assert_eq!(state.arm_reason.as_deref(), Some("controlled testing"));
        assert_eq!(state.arm_incident_id, Some(42));
        assert!(state.armed_until.is_some());
    }

    #[test]
    fn disarm_clears_everything() {
        let engine = PolicyEngine::new();
        engine.arm("operator-1", "test", 1, None);
        let state = engine.disarm();
        assert!(!state.armed);
        assert!(state.armed_by.is_none());
        assert!(state.arm_reason.is_none());
        assert!(state.arm_incident_id.is_none());
        assert!(state.armed_until.is_none());
    }

    #[test]
    fn duration_is_clamped() {
        let engine = PolicyEngine::new();
        let state = engine.arm("op", "r", 1, Some(1_000_000));
        let until = state.armed_until.unwrap();
        let secs = (until - Utc::now()).num_seconds();
        assert!(secs <= ARM_MAX_SECS && secs > ARM_MAX_SECS - 5);

        let state = engine.arm("op", "r", 1, Some(5));
        let secs = (state.armed_until.unwrap() - Utc::now()).num_seconds();
        assert!(secs <= ARM_MIN_SECS && secs > ARM_MIN_SECS - 5);
    }

    #[test]
    fn zero_or_missing_duration_uses_default() {
        let engine = PolicyEngine::new();
        let state = engine.arm("op", "r", 1, Some(0));
        let secs = (state.armed_until.unwrap() - Utc::now()).num_seconds();
        assert!(secs <= ARM_DEFAULT_SECS && secs > ARM_DEFAULT_SECS - 5);
    }

    #[test]
    fn window_expires_lazily_on_read() {
        let engine = PolicyEngine::new();
        engine.arm("op", "r", 7, Some(60));

        let now = Utc::now();
        assert!(engine.state_at(now).armed);

        let later = now + Duration::seconds(ARM_MIN_SECS + 5);
        let expired = engine.state_at(later);
        assert!(!expired.armed);
        assert!(expired.armed_by.is_none());
        assert!(expired.armed_until.is_none());

        // Cleared state stays cleared on subsequent current-time reads
        assert!(!engine.state().armed);
    }
}
