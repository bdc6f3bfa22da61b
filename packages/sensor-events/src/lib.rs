//! # sensor-events
//!
//! Shared sensor event envelope for the Drone Ops suite.
//!
//! These types are used by:
//! - `backend-rust`: receiving and parsing sensor events on the UDP feed port
//! - `sensor-simulator`: producing synthetic WiFi/BT/RF/Remote-ID traffic
//!
//! The envelope is deliberately loose: `event` is free-form JSON because real
//! scanner feeds disagree on field names, and the backend's detectors do the
//! normalization. Only `mode` is mandatory.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Mode names ────────────────────────────────────────────────────────────────

/// Canonical mode strings the backend dispatches on. Feeds may send variants
/// (`wifi_scan`, `bluetooth_le`, ...); dispatch is by prefix on the backend.
pub mod modes {
    pub const WIFI: &str = "wifi";
    pub const BLUETOOTH: &str = "bluetooth";
    pub const SUBGHZ: &str = "subghz";
    pub const LISTENING_SCANNER: &str = "listening_scanner";
    pub const WATERFALL: &str = "waterfall";
    pub const LISTENING: &str = "listening";
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// One sensor observation as shipped over the feed wire (JSON datagram).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorEnvelope {
    /// Feed mode, e.g. "wifi", "bluetooth_le", "subghz"
    pub mode: String,
    /// Optional feed-specific event type, e.g. "network_update"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// The raw observation payload
    pub event: Value,
}

impl SensorEnvelope {
    pub fn new(mode: impl Into<String>, event: Value) -> Self {
        Self {
            mode: mode.into(),
            event_type: None,
            event,
        }
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_round_trips() {
        let env = SensorEnvelope::new(modes::WIFI, json!({"bssid": "60:60:1F:AA:BB:CC"}))
            .with_event_type("network_update");
        let wire = serde_json::to_string(&env).unwrap();
        let back: SensorEnvelope = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.mode, "wifi");
        assert_eq!(back.event_type.as_deref(), Some("network_update"));
        assert_eq!(back.event["bssid"], "60:60:1F:AA:BB:CC");
    }

    #[test]
    fn event_type_omitted_when_absent() {
        let env = SensorEnvelope::new(modes::SUBGHZ, json!({"frequency_mhz": 433.92}));
        let wire = serde_json::to_string(&env).unwrap();
        assert!(!wire.contains("event_type"));
    }
}
