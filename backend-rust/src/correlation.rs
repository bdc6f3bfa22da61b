//! WiFi↔BT correlation inputs.
//!
//! The application-wide device caches the original ambient globals provided
//! become an explicit [`DeviceCache`] capability, and the external
//! correlation library is a [`CorrelationProvider`] seam. Snapshots are
//! point-in-time; nothing is assumed stable across calls.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

// ─── Device cache ─────────────────────────────────────────────────────────────

/// Latest observation per device, keyed by MAC. Values are the raw scanner
/// records (free-form JSON).
#[derive(Default)]
pub struct DeviceCache {
    wifi_networks: RwLock<HashMap<String, Value>>,
    wifi_clients: RwLock<HashMap<String, Value>>,
    bt_devices: RwLock<HashMap<String, Value>>,
}

impl DeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_wifi_network(&self, mac: &str, record: Value) {
        self.wifi_networks
            .write()
            .await
            .insert(mac.to_uppercase(), record);
    }

    pub async fn record_wifi_client(&self, mac: &str, record: Value) {
        self.wifi_clients
            .write()
            .await
            .insert(mac.to_uppercase(), record);
    }

    pub async fn record_bt_device(&self, mac: &str, record: Value) {
        self.bt_devices
            .write()
            .await
            .insert(mac.to_uppercase(), record);
    }

    /// Networks ∪ clients, clients winning on key collisions.
    pub async fn wifi_snapshot(&self) -> HashMap<String, Value> {
        let mut devices = self.wifi_networks.read().await.clone();
        for (mac, record) in self.wifi_clients.read().await.iter() {
            devices.insert(mac.clone(), record.clone());
        }
        devices
    }

    pub async fn bt_snapshot(&self) -> HashMap<String, Value> {
        self.bt_devices.read().await.clone()
    }
}

// ─── Provider seam ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatedPair {
    pub wifi_mac: String,
    pub bt_mac: String,
    pub confidence: f64,
    pub evidence: Value,
}

/// Candidate WiFi↔BT pair source. The production implementation lives in the
/// external correlation library; tests inject fixed pair lists.
pub trait CorrelationProvider: Send + Sync {
    fn correlate(
        &self,
        wifi_devices: &HashMap<String, Value>,
        bt_devices: &HashMap<String, Value>,
        min_confidence: f64,
    ) -> Vec<CorrelatedPair>;
}

/// Built-in fallback provider: pairs devices observed within a shared time
/// window, nudged by RSSI proximity. Good enough to wire the binary
/// end-to-end; not a substitute for the real correlation engine.
pub struct CoObservationCorrelator {
    pub window_secs: f64,
}

impl Default for CoObservationCorrelator {
    fn default() -> Self {
        Self { window_secs: 30.0 }
    }
}

fn field_f64(record: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match record.get(*key) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::String(s)) => return s.trim().parse().ok(),
            _ => continue,
        }
    }
    None
}

impl CorrelationProvider for CoObservationCorrelator {
    fn correlate(
        &self,
        wifi_devices: &HashMap<String, Value>,
        bt_devices: &HashMap<String, Value>,
        min_confidence: f64,
    ) -> Vec<CorrelatedPair> {
        let mut pairs = Vec::new();

        for (wifi_mac, wifi) in wifi_devices {
            let wifi_seen = field_f64(wifi, &["last_seen", "timestamp"]);
            let wifi_rssi = field_f64(wifi, &["rssi", "signal", "signal_dbm"]);

            for (bt_mac, bt) in bt_devices {
                let bt_seen = field_f64(bt, &["last_seen", "timestamp"]);
                let bt_rssi = field_f64(bt, &["rssi", "signal", "signal_dbm"]);

                let dt = match (wifi_seen, bt_seen) {
                    (Some(w), Some(b)) => (w - b).abs(),
                    _ => continue,
                };
                if dt > self.window_secs {
                    continue;
                }

                let mut confidence = 0.6 + 0.2 * (1.0 - dt / self.window_secs);
                let rssi_delta = match (wifi_rssi, bt_rssi) {
                    (Some(w), Some(b)) => Some((w - b).abs()),
                    _ => None,
                };
                if let Some(delta) = rssi_delta {
                    if delta <= 10.0 {
                        confidence += 0.1;
                    }
                }
                let confidence = confidence.min(1.0);
                if confidence < min_confidence {
                    continue;
                }

                pairs.push(CorrelatedPair {
                    wifi_mac: wifi_mac.clone(),
                    bt_mac: bt_mac.clone(),
                    confidence,
                    evidence: json!({
                        "wifi_mac": wifi_mac,
                        "bt_mac": bt_mac,
                        "co_observation_dt_secs": dt,
                        "rssi_delta": rssi_delta,
                    }),
                });
            }
        }

        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wifi_snapshot_merges_clients_over_networks() {
        let cache = DeviceCache::new();
        cache
            .record_wifi_network("aa:bb:cc:00:11:22", json!({"kind": "network"}))
            .await;
        cache
            .record_wifi_client("AA:BB:CC:00:11:22", json!({"kind": "client"}))
            .await;

        let snapshot = cache.wifi_snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["AA:BB:CC:00:11:22"]["kind"], "client");
    }

    #[test]
    fn co_observation_pairs_within_window() {
        let correlator = CoObservationCorrelator::default();
        let wifi = HashMap::from([(
            "AA:AA:AA:AA:AA:AA".to_string(),
            json!({"last_seen": 1000.0, "rssi": -44}),
        )]);
        let bt = HashMap::from([
            (
                "BB:BB:BB:BB:BB:BB".to_string(),
                json!({"last_seen": 1004.0, "rssi": -48}),
            ),
            (
                "CC:CC:CC:CC:CC:CC".to_string(),
                json!({"last_seen": 2000.0, "rssi": -48}),
            ),
        ]);

        let pairs = correlator.correlate(&wifi, &bt, 0.6);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].bt_mac, "BB:BB:BB:BB:BB:BB");
        assert!(pairs[0].confidence > 0.7);
    }
}
